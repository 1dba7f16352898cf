pub mod channel;
pub mod git_proxy;
pub mod git_sessions;
pub mod requests;
