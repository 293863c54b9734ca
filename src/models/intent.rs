use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingIntent {
    Booking,
    Other,
}

/// Structured result of the external NLU pass over one inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingParse {
    pub intent: BookingIntent,
    pub service_key: Option<String>,
    /// "YYYY-MM-DD HH:MM" in the business timezone, if the message named one.
    pub start_local: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

impl BookingParse {
    pub fn not_booking() -> Self {
        Self {
            intent: BookingIntent::Other,
            service_key: None,
            start_local: None,
            confidence: 0.0,
        }
    }
}
