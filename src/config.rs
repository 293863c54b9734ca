use std::env;

use chrono::Weekday;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub admin_numbers: Vec<String>,
    pub whatsapp_verify_token: String,
    pub whatsapp_access_token: String,
    pub whatsapp_phone_number_id: String,
    pub whatsapp_app_secret: String,
    pub llm_api_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    /// Offset of the business timezone from UTC, in minutes.
    pub tz_offset_minutes: i64,
    pub hold_minutes: i64,
    pub context_minutes: i64,
    pub open_hour: u32,
    pub close_hour: u32,
    pub closed_weekday: Weekday,
    pub alt_step_minutes: i64,
    pub alt_horizon_days: i64,
    pub alt_max_suggestions: usize,
    /// When set, pending requests older than this are expired by the reaper.
    /// Unset means pending requests wait for the admin indefinitely.
    pub request_expire_minutes: Option<i64>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "slotbook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            admin_numbers: env::var("ADMIN_NUMBERS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            whatsapp_verify_token: env::var("WHATSAPP_VERIFY_TOKEN").unwrap_or_default(),
            whatsapp_access_token: env::var("WHATSAPP_ACCESS_TOKEN").unwrap_or_default(),
            whatsapp_phone_number_id: env::var("WHATSAPP_PHONE_NUMBER_ID").unwrap_or_default(),
            whatsapp_app_secret: env::var("WHATSAPP_APP_SECRET").unwrap_or_default(),
            llm_api_url: env::var("LLM_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            tz_offset_minutes: env_i64("TZ_OFFSET_MINUTES", 480),
            hold_minutes: env_i64("BOOKING_HOLD_MINUTES", 10),
            context_minutes: env_i64("BOOKING_CONTEXT_MINUTES", 30),
            open_hour: env::var("BUSINESS_OPEN_HOUR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9),
            close_hour: env::var("BUSINESS_CLOSE_HOUR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(18),
            closed_weekday: env::var("BUSINESS_CLOSED_WEEKDAY")
                .ok()
                .and_then(|v| parse_weekday(&v))
                .unwrap_or(Weekday::Sun),
            alt_step_minutes: env_i64("ALT_SLOT_STEP_MINUTES", 30),
            alt_horizon_days: env_i64("ALT_SLOT_HORIZON_DAYS", 7),
            alt_max_suggestions: env::var("ALT_SLOT_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            request_expire_minutes: env::var("REQUEST_EXPIRE_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.trim().to_lowercase().as_str() {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}
