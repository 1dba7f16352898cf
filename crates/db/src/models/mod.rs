//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` DTOs for the write paths that feed it

pub mod api_key;
pub mod approval;
pub mod audit_event;
pub mod credential;
pub mod git_session;
pub mod proxy_request;
pub mod rule;
pub mod status;
pub mod user;
