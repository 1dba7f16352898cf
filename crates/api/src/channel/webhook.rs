use async_trait::async_trait;
use drawbridge_core::error::CoreError;
use drawbridge_core::secrets::compute_channel_hmac;
use serde_json::json;

use super::{ApprovalPrompt, DecisionChannel};

/// Channel backed by an HTTPS webhook (a chat bot backend).
///
/// Every delivery is a signed JSON POST. The receiver verifies the
/// `x-channel-signature` header with the shared signing secret before
/// rendering anything to the owner.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
    secret: String,
}

impl WebhookChannel {
    pub fn new(url: String, secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            secret,
        }
    }

    async fn deliver(&self, payload: serde_json::Value) -> Result<Option<String>, CoreError> {
        let body = payload.to_string();
        let signature = format!("sha256={}", compute_channel_hmac(&self.secret, &body));

        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .header("x-channel-signature", signature)
            .body(body)
            .send()
            .await
            .map_err(|err| CoreError::Internal(format!("channel delivery failed: {err}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Internal(format!(
                "channel delivery returned status {}",
                response.status()
            )));
        }

        // The receiver may answer with the posted message's reference so
        // decisions can be correlated back to the prompt.
        let message_ref = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("message_ref").and_then(|r| r.as_str()).map(String::from));
        Ok(message_ref)
    }
}

#[async_trait]
impl DecisionChannel for WebhookChannel {
    async fn prompt_request(
        &self,
        prompt: &ApprovalPrompt,
    ) -> Result<Option<String>, CoreError> {
        self.deliver(json!({
            "type": "approval_prompt",
            "kind": prompt.kind,
            "recipient": prompt.recipient,
            "subject_id": prompt.subject_id,
            "title": prompt.title,
            "lines": prompt.lines,
        }))
        .await
    }

    async fn prompt_session(
        &self,
        prompt: &ApprovalPrompt,
    ) -> Result<Option<String>, CoreError> {
        self.prompt_request(prompt).await
    }

    async fn notify(&self, recipient: &str, text: &str) -> Result<(), CoreError> {
        self.deliver(json!({
            "type": "notice",
            "recipient": recipient,
            "text": text,
        }))
        .await
        .map(|_| ())
    }
}
