//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument. State transitions are
//! compare-and-set updates keyed on the current status so concurrent
//! writers cannot double-fire a lifecycle step.

pub mod api_key_repo;
pub mod audit_repo;
pub mod credential_repo;
pub mod git_session_repo;
pub mod request_repo;
pub mod rule_repo;
pub mod user_repo;

pub use api_key_repo::ApiKeyRepo;
pub use audit_repo::AuditRepo;
pub use credential_repo::CredentialRepo;
pub use git_session_repo::GitSessionRepo;
pub use request_repo::RequestRepo;
pub use rule_repo::RuleRepo;
pub use user_repo::UserRepo;
