use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Customer-facing proposed slot, backed by exactly one hold. At most one
/// `proposed` draft exists per customer at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: i64,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub channel_id: String,
    pub customer_id: String,
    pub service_key: String,
    pub service_label: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub hold_id: i64,
    pub status: DraftStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Proposed,
    Confirmed,
    Cancelled,
    Expired,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Proposed => "proposed",
            DraftStatus::Confirmed => "confirmed",
            DraftStatus::Cancelled => "cancelled",
            DraftStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "proposed" => DraftStatus::Proposed,
            "confirmed" => DraftStatus::Confirmed,
            "cancelled" => DraftStatus::Cancelled,
            _ => DraftStatus::Expired,
        }
    }
}
