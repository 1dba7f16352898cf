pub mod auth;
pub mod channel;

pub use auth::AuthCaller;
pub use channel::ChannelAuth;
