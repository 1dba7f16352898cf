pub mod channel;
pub mod git;
pub mod health;
pub mod requests;
