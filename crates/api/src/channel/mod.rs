//! Out-of-band decision channel.
//!
//! Approval prompts and notices are delivered to the account owner over
//! a channel the agent cannot reach (a chat webhook in production, the
//! server log in development). Delivery is best effort: a failed prompt
//! never fails the create call, since the owner can always poll and
//! decide through the channel surface directly.

mod webhook;

pub use webhook::WebhookChannel;

use async_trait::async_trait;
use drawbridge_core::error::CoreError;
use drawbridge_db::DbId;
use serde::Serialize;

/// What kind of subject a prompt concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Request,
    GitSession,
}

/// An interactive approval prompt for the account owner.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalPrompt {
    /// Channel identity of the account owner.
    pub recipient: String,
    pub kind: PromptKind,
    pub subject_id: DbId,
    pub title: String,
    /// Human-readable summary lines describing exactly what was captured.
    pub lines: Vec<String>,
}

/// Delivers prompts and notices to account owners.
#[async_trait]
pub trait DecisionChannel: Send + Sync {
    /// Deliver an approval prompt for a proxied request. Returns the
    /// channel's message reference when it has one.
    async fn prompt_request(&self, prompt: &ApprovalPrompt)
        -> Result<Option<String>, CoreError>;

    /// Deliver an approval prompt for a Git session.
    async fn prompt_session(&self, prompt: &ApprovalPrompt)
        -> Result<Option<String>, CoreError>;

    /// Deliver a notification that requires no decision.
    async fn notify(&self, recipient: &str, text: &str) -> Result<(), CoreError>;
}

/// Channel that writes prompts to the server log.
///
/// Used when no webhook is configured. Decisions then come in through
/// the channel management surface only.
pub struct LogChannel;

#[async_trait]
impl DecisionChannel for LogChannel {
    async fn prompt_request(
        &self,
        prompt: &ApprovalPrompt,
    ) -> Result<Option<String>, CoreError> {
        tracing::info!(
            recipient = %prompt.recipient,
            subject_id = prompt.subject_id,
            title = %prompt.title,
            lines = ?prompt.lines,
            "Approval prompt (request)"
        );
        Ok(None)
    }

    async fn prompt_session(
        &self,
        prompt: &ApprovalPrompt,
    ) -> Result<Option<String>, CoreError> {
        tracing::info!(
            recipient = %prompt.recipient,
            subject_id = prompt.subject_id,
            title = %prompt.title,
            lines = ?prompt.lines,
            "Approval prompt (git session)"
        );
        Ok(None)
    }

    async fn notify(&self, recipient: &str, text: &str) -> Result<(), CoreError> {
        tracing::info!(recipient = %recipient, text = %text, "Channel notice");
        Ok(())
    }
}
