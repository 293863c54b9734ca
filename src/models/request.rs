use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Durable booking request awaiting (or past) admin decision. `public_ref`
/// is the only identifier shown outside the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: i64,
    pub public_ref: String,
    pub created_at: NaiveDateTime,
    pub channel_id: String,
    pub customer_id: String,
    pub service_key: String,
    pub service_label: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub status: RequestStatus,
    pub admin_actor: Option<String>,
    pub decided_at: Option<NaiveDateTime>,
    pub admin_note: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Expired => "expired",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "approved" => Some(RequestStatus::Approved),
            "rejected" => Some(RequestStatus::Rejected),
            "expired" => Some(RequestStatus::Expired),
            "cancelled" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }
}
