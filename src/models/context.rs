use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Short-TTL partial booking intent collected across turns. Fields left
/// unset by one message survive the next upsert (merge, not overwrite).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingContext {
    pub customer_id: String,
    pub updated_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub pending_service_key: Option<String>,
    pub pending_service_label: Option<String>,
    pub pending_start_local: Option<String>,
}
