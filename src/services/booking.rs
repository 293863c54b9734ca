use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};

use crate::db::queries;
use crate::models::service::catalog_summary;
use crate::models::{find_service, BookingIntent, Draft, DraftStatus, Service};
use crate::services::clock;
use crate::services::messaging::Choice;
use crate::services::scheduling::{self, BusinessHours};
use crate::state::AppState;

/// NLU parses below this confidence never start a booking flow.
const MIN_CONFIDENCE: f32 = 0.55;

const CONFIRM_TOKENS: &[&str] = &["confirm", "yes", "ok", "1", "confirm_booking"];
const CANCEL_TOKENS: &[&str] = &["cancel", "no", "2", "cancel_booking"];

const START_LOCAL_FMT: &str = "%Y-%m-%d %H:%M";

pub struct BookingReply {
    pub text: String,
    /// When present, the transport should offer these as buttons; on
    /// delivery failure the caller falls back to a plain-text prompt.
    pub choices: Option<Vec<Choice>>,
    /// One-line summary for the admin channel, set only when a new request
    /// was created.
    pub admin_notice: Option<String>,
}

impl BookingReply {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choices: None,
            admin_notice: None,
        }
    }

    fn with_choices(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choices: Some(confirm_cancel_choices()),
            admin_notice: None,
        }
    }
}

fn confirm_cancel_choices() -> Vec<Choice> {
    vec![
        Choice {
            id: "confirm_booking".to_string(),
            label: "Confirm".to_string(),
        },
        Choice {
            id: "cancel_booking".to_string(),
            label: "Cancel".to_string(),
        },
    ]
}

pub fn is_confirm_token(text: &str) -> bool {
    CONFIRM_TOKENS.contains(&text.trim().to_lowercase().as_str())
}

pub fn is_cancel_token(text: &str) -> bool {
    CANCEL_TOKENS.contains(&text.trim().to_lowercase().as_str())
}

fn parse_start_local(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), START_LOCAL_FMT).ok()
}

/// Drives one inbound customer message through the reservation state
/// machine. Returns None when the message is not booking-related and no
/// booking conversation was in flight; the caller hands it back to
/// general chat.
pub async fn handle_message(
    state: &Arc<AppState>,
    channel_id: &str,
    customer_id: &str,
    text: &str,
) -> anyhow::Result<Option<BookingReply>> {
    let now = clock::now_local(state.config.tz_offset_minutes);

    // Reap first so every read below sees only truly-live holds and drafts.
    let active_draft = {
        let db = state.db.lock().unwrap();
        queries::expire_stale_holds(&db, &now)?;
        queries::expire_old_drafts(&db, &now)?;
        if let Some(max_age) = state.config.request_expire_minutes {
            queries::expire_stale_requests(&db, &now, max_age)?;
        }
        queries::get_active_draft(&db, customer_id, &now)?
    };

    let confirming = is_confirm_token(text);
    let cancelling = is_cancel_token(text);

    if let Some(draft) = active_draft {
        if confirming {
            return Ok(Some(confirm_draft(state, &draft, &now)?));
        }
        if cancelling {
            let db = state.db.lock().unwrap();
            queries::mark_draft(&db, customer_id, draft.id, DraftStatus::Cancelled)?;
            queries::release_hold(&db, draft.hold_id)?;
            queries::clear_booking_context(&db, customer_id)?;
            tracing::info!(customer = %customer_id, draft = draft.id, "draft cancelled by customer");
            return Ok(Some(BookingReply::plain(
                "No problem — I've dropped that proposal. Tell me if you'd like another time.",
            )));
        }
        // Anything else restates the standing proposal; no new hold.
        return Ok(Some(BookingReply::with_choices(format!(
            "You already have a proposed slot: {} for {}. Confirm it, or cancel to pick another time.",
            scheduling::format_window(&draft.start_at, &draft.end_at),
            draft.service_label,
        ))));
    }

    // A confirm/cancel with nothing to act on means the offer lapsed.
    if confirming || cancelling {
        return Ok(Some(BookingReply::plain(
            "That offer is no longer available. Tell me a service and a date & time and I'll check again.",
        )));
    }

    let today = now.format("%Y-%m-%d").to_string();
    let parsed = state.nlu.parse_booking(text, &today).await?;

    let context = {
        let db = state.db.lock().unwrap();
        queries::get_booking_context(&db, customer_id, &now)?
    };

    let is_booking = parsed.intent == BookingIntent::Booking && parsed.confidence >= MIN_CONFIDENCE;
    if !is_booking && context.is_none() {
        return Ok(None);
    }

    // Merge the fresh parse with remembered context; either source wins
    // when it has a value. A service key outside the catalog reads as
    // unknown rather than an error.
    let service_key = parsed
        .service_key
        .filter(|k| find_service(k).is_some())
        .or_else(|| context.as_ref().and_then(|c| c.pending_service_key.clone()));
    let start_local = parsed
        .start_local
        .or_else(|| context.as_ref().and_then(|c| c.pending_start_local.clone()));

    let service = service_key.as_deref().and_then(find_service);

    let Some(service) = service else {
        let db = state.db.lock().unwrap();
        queries::upsert_booking_context(
            &db,
            customer_id,
            None,
            None,
            start_local.as_deref(),
            state.config.context_minutes,
            &now,
        )?;
        return Ok(Some(BookingReply::plain(format!(
            "Sure — what service do you need ({})? And what date & time?",
            catalog_summary(),
        ))));
    };

    let Some(start_local) = start_local else {
        let db = state.db.lock().unwrap();
        queries::upsert_booking_context(
            &db,
            customer_id,
            Some(service.key),
            Some(service.label),
            None,
            state.config.context_minutes,
            &now,
        )?;
        return Ok(Some(BookingReply::plain(format!(
            "Okay — what date and time would you like for {}?",
            service.label,
        ))));
    };

    let Some(start) = parse_start_local(&start_local) else {
        let db = state.db.lock().unwrap();
        queries::upsert_booking_context(
            &db,
            customer_id,
            Some(service.key),
            Some(service.label),
            None,
            state.config.context_minutes,
            &now,
        )?;
        queries::clear_context_start(&db, customer_id)?;
        return Ok(Some(BookingReply::plain(format!(
            "Sorry, I couldn't read that date and time. Could you give it like {}?",
            (now + Duration::days(1)).format("%Y-%m-%d 14:00"),
        ))));
    };

    propose_slot(state, channel_id, customer_id, service, &start, &now)
}

/// Business-hours gate, availability check, then hold + draft created in
/// one guarded sequence. Holding the connection lock across check and
/// insert is what makes check-and-hold atomic under concurrent workers.
fn propose_slot(
    state: &Arc<AppState>,
    channel_id: &str,
    customer_id: &str,
    service: &'static Service,
    start: &NaiveDateTime,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<BookingReply>> {
    let hours = BusinessHours::from_config(&state.config);
    let end = *start + Duration::minutes(service.duration_minutes);

    if let Err(e) = scheduling::validate_business_hours(start, service.duration_minutes, &hours) {
        let db = state.db.lock().unwrap();
        queries::upsert_booking_context(
            &db,
            customer_id,
            Some(service.key),
            Some(service.label),
            None,
            state.config.context_minutes,
            now,
        )?;
        queries::clear_context_start(&db, customer_id)?;
        return Ok(Some(BookingReply::plain(e.to_string())));
    }

    let db = state.db.lock().unwrap();

    if !queries::is_window_available(&db, start, &end, None, now)? {
        let alternatives = scheduling::find_alternative_slots(
            &db,
            start,
            service.duration_minutes,
            &hours,
            state.config.alt_step_minutes,
            state.config.alt_horizon_days,
            state.config.alt_max_suggestions,
            now,
        )?;

        // The remembered time is stale now; keep the service.
        queries::upsert_booking_context(
            &db,
            customer_id,
            Some(service.key),
            Some(service.label),
            None,
            state.config.context_minutes,
            now,
        )?;
        queries::clear_context_start(&db, customer_id)?;

        let text = if alternatives.is_empty() {
            "That slot is not available. Can you suggest another time?".to_string()
        } else {
            let listed = alternatives
                .iter()
                .map(|alt| {
                    let alt_end = *alt + Duration::minutes(service.duration_minutes);
                    format!("- {}", scheduling::format_window(alt, &alt_end))
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "That slot is not available. The nearest open slots for {} are:\n{}\nReply with a date and time that works.",
                service.label, listed,
            )
        };
        return Ok(Some(BookingReply::plain(text)));
    }

    let hold_id = queries::create_hold(
        &db,
        customer_id,
        service.key,
        start,
        &end,
        state.config.hold_minutes,
        now,
    )?;
    queries::create_draft(
        &db,
        channel_id,
        customer_id,
        service.key,
        service.label,
        start,
        &end,
        hold_id,
        state.config.hold_minutes,
        now,
    )?;
    queries::clear_booking_context(&db, customer_id)?;

    tracing::info!(
        customer = %customer_id,
        service = service.key,
        window = %scheduling::format_window(start, &end),
        "slot proposed"
    );

    Ok(Some(BookingReply::with_choices(format!(
        "Slot looks available: {} for {}. Shall I send it to the admin for approval?",
        scheduling::format_window(start, &end),
        service.label,
    ))))
}

/// Customer accepted the proposal: claim the draft, re-validate against
/// everyone else's holds and approved bookings (ignoring our own hold),
/// then turn the draft into a pending request.
fn confirm_draft(
    state: &Arc<AppState>,
    draft: &Draft,
    now: &NaiveDateTime,
) -> anyhow::Result<BookingReply> {
    let db = state.db.lock().unwrap();

    // The draft snapshot was read under an earlier lock acquisition. A
    // redelivered confirm or a racing cancel may have moved it out of
    // `proposed` since, so claim it first; only one claim wins, and
    // only the winner gets to create a request.
    if !queries::mark_draft(&db, &draft.customer_id, draft.id, DraftStatus::Confirmed)? {
        tracing::info!(customer = %draft.customer_id, draft = draft.id, "confirm lost the claim");
        return Ok(BookingReply::plain(
            "That offer is no longer available. Tell me a service and a date & time and I'll check again.",
        ));
    }

    if !queries::is_window_available(&db, &draft.start_at, &draft.end_at, Some(draft.hold_id), now)?
    {
        queries::expire_draft(&db, draft.id)?;
        queries::release_hold(&db, draft.hold_id)?;
        tracing::info!(customer = %draft.customer_id, draft = draft.id, "window lost before confirmation");
        return Ok(BookingReply::plain(
            "Sorry — that slot was just taken. Can you suggest another time?",
        ));
    }

    let (request_id, public_ref) = queries::create_request(
        &db,
        &draft.channel_id,
        &draft.customer_id,
        &draft.service_key,
        &draft.service_label,
        &draft.start_at,
        &draft.end_at,
        now,
    )?;
    queries::link_hold_to_request(&db, draft.hold_id, request_id)?;
    queries::clear_booking_context(&db, &draft.customer_id)?;

    let window = scheduling::format_window(&draft.start_at, &draft.end_at);
    tracing::info!(
        customer = %draft.customer_id,
        request = request_id,
        public_ref = %public_ref,
        "booking request created"
    );

    Ok(BookingReply {
        text: format!(
            "Got it — your request is in: {} for {}. Pending admin confirmation — I'll update you shortly. (Ref #{})",
            window, draft.service_label, public_ref,
        ),
        choices: None,
        admin_notice: Some(format!(
            "New booking request #{}: {}, {} — from {}",
            public_ref, draft.service_label, window, draft.customer_id,
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_tokens() {
        assert!(is_confirm_token("confirm"));
        assert!(is_confirm_token("  YES "));
        assert!(is_confirm_token("confirm_booking"));
        assert!(!is_confirm_token("confirmation bias"));
    }

    #[test]
    fn test_cancel_tokens() {
        assert!(is_cancel_token("cancel"));
        assert!(is_cancel_token("No"));
        assert!(is_cancel_token("cancel_booking"));
        assert!(!is_cancel_token("cancel my other plans maybe"));
    }

    #[test]
    fn test_parse_start_local() {
        assert!(parse_start_local("2030-09-03 14:00").is_some());
        assert!(parse_start_local(" 2030-09-03 14:00 ").is_some());
        assert!(parse_start_local("tomorrow at 2").is_none());
        assert!(parse_start_local("2030-09-03").is_none());
    }
}
