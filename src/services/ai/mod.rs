pub mod openai;

use async_trait::async_trait;

use crate::models::BookingParse;

#[async_trait]
pub trait IntentProvider: Send + Sync {
    /// Extracts booking intent, service and start time from one inbound
    /// message. `today` is the business-local date, "YYYY-MM-DD".
    async fn parse_booking(&self, text: &str, today: &str) -> anyhow::Result<BookingParse>;
}

pub(crate) fn parse_booking_response(response: &str) -> BookingParse {
    // Try direct parse first
    if let Ok(parsed) = serde_json::from_str::<BookingParse>(response) {
        return parsed;
    }

    // Strip markdown code fences
    let cleaned = response
        .trim()
        .strip_prefix("```json")
        .or_else(|| response.trim().strip_prefix("```"))
        .unwrap_or(response.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(parsed) = serde_json::from_str::<BookingParse>(cleaned) {
        return parsed;
    }

    // Try to find a JSON object in the response
    if let Some(start) = cleaned.find('{') {
        if let Some(end) = cleaned.rfind('}') {
            if let Ok(parsed) = serde_json::from_str::<BookingParse>(&cleaned[start..=end]) {
                return parsed;
            }
        }
    }

    // Malformed output never fabricates a booking
    tracing::warn!("failed to parse NLU response as booking JSON, treating as non-booking");
    BookingParse::not_booking()
}
