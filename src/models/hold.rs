use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Temporary exclusive claim on a `[start_at, end_at)` window, backing an
/// in-flight proposal. Released and expired are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hold {
    pub id: i64,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub customer_id: String,
    pub service_key: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub request_id: Option<i64>,
    pub status: HoldStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HoldStatus {
    Active,
    Released,
    Expired,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldStatus::Active => "active",
            HoldStatus::Released => "released",
            HoldStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => HoldStatus::Active,
            "released" => HoldStatus::Released,
            _ => HoldStatus::Expired,
        }
    }
}
