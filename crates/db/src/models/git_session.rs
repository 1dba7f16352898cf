//! Git proxy session models and DTOs.

use drawbridge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `git_sessions` table.
///
/// A session scopes one approved Git operation against one repository.
/// The per-session secret is minted at creation: its hash gates the wire
/// proxy, and the ciphertext is decrypted exactly once for the remote
/// reveal. The plaintext itself is never stored.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GitSession {
    pub id: DbId,
    pub user_id: DbId,
    pub api_key_id: DbId,
    pub key_label_snapshot: String,
    pub caller_address: Option<String>,
    pub provider: String,
    pub operation: String,
    pub repo_host: String,
    pub repo_path: String,
    pub repo_url: String,
    pub status_id: i16,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    #[serde(skip_serializing)]
    pub secret_ciphertext: String,
    pub allow_default_branch_push: bool,
    pub default_branch_ref: Option<String>,
    pub consent_hint: Option<String>,
    pub approval_deadline: Timestamp,
    pub remote_revealed_at: Option<Timestamp>,
    pub prompt_message_ref: Option<String>,
    pub error_code: Option<String>,
    pub last_activity_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl GitSession {
    /// Push sessions get the write endpoint and the push-safety gate;
    /// everything else is read-only.
    pub fn is_push(&self) -> bool {
        self.operation == "push"
    }
}

/// DTO for an agent opening a Git session. The provider is resolved from
/// the repository host, never named by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGitSession {
    /// One of `clone`, `fetch`, `pull`, `push`.
    pub operation: String,
    pub repo: String,
    pub consent_hint: Option<String>,
}

/// Fully validated insert payload, built by the session engine after the
/// repository URL has been parsed and the session secret minted.
#[derive(Debug)]
pub struct NewGitSession<'a> {
    pub user_id: DbId,
    pub api_key_id: DbId,
    pub key_label_snapshot: &'a str,
    pub caller_address: Option<&'a str>,
    pub provider: &'a str,
    pub operation: &'a str,
    pub repo_host: &'a str,
    pub repo_path: &'a str,
    pub repo_url: &'a str,
    pub secret_hash: &'a str,
    pub secret_ciphertext: &'a str,
    pub consent_hint: Option<&'a str>,
    pub approval_deadline: Timestamp,
}
