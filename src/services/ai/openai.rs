use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::{parse_booking_response, IntentProvider};
use crate::models::BookingParse;

const SYSTEM_PROMPT: &str = "You extract booking info from a WhatsApp message for an auto service shop.\n\
Return ONLY JSON. No markdown.\n\
If the user is asking to book/come/appointment/reserve, intent='booking', else intent='other'.\n\
service_key must be one of: car_servicing, car_wash, polish, or null if unknown.\n\
start_local must be 'YYYY-MM-DD HH:MM' in 24h time, or null if missing/unclear.\n\
confidence is 0 to 1.";

/// Intent extraction against any OpenAI-compatible chat-completions API.
pub struct OpenAiProvider {
    api_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        Self {
            api_url,
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IntentProvider for OpenAiProvider {
    async fn parse_booking(&self, text: &str, today: &str) -> anyhow::Result<BookingParse> {
        let system = format!("{SYSTEM_PROMPT}\nToday is {today}. Timezone is the business timezone.");
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": format!("Message: {text}")},
            ],
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to reach NLU endpoint")?
            .error_for_status()
            .context("NLU endpoint returned error")?
            .json::<serde_json::Value>()
            .await
            .context("failed to decode NLU response")?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("");

        Ok(parse_booking_response(content))
    }
}
