use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::{Choice, MessagingProvider};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0";

pub struct WhatsAppProvider {
    access_token: String,
    client: reqwest::Client,
}

impl WhatsAppProvider {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MessagingProvider for WhatsAppProvider {
    async fn send_message(&self, channel_id: &str, to: &str, body: &str) -> anyhow::Result<()> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": body },
        });

        self.client
            .post(format!("{GRAPH_API_BASE}/{channel_id}/messages"))
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .context("failed to send WhatsApp message")?
            .error_for_status()
            .context("WhatsApp API returned error")?;

        Ok(())
    }

    async fn send_choice_prompt(
        &self,
        channel_id: &str,
        to: &str,
        body: &str,
        choices: &[Choice],
    ) -> anyhow::Result<bool> {
        let buttons: Vec<_> = choices
            .iter()
            .map(|c| {
                json!({
                    "type": "reply",
                    "reply": { "id": c.id, "title": c.label },
                })
            })
            .collect();

        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "interactive",
            "interactive": {
                "type": "button",
                "body": { "text": body },
                "action": { "buttons": buttons },
            },
        });

        let response = self
            .client
            .post(format!("{GRAPH_API_BASE}/{channel_id}/messages"))
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .context("failed to send WhatsApp button prompt")?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "interactive prompt rejected, caller should fall back to text");
            return Ok(false);
        }
        Ok(true)
    }
}
