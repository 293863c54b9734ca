pub mod whatsapp;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub id: String,
    pub label: String,
}

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_message(&self, channel_id: &str, to: &str, body: &str) -> anyhow::Result<()>;

    /// Sends an interactive button prompt. Returns false when the provider
    /// could not deliver the interactive payload, so callers can fall back
    /// to a plain-text prompt.
    async fn send_choice_prompt(
        &self,
        channel_id: &str,
        to: &str,
        body: &str,
        choices: &[Choice],
    ) -> anyhow::Result<bool>;
}
