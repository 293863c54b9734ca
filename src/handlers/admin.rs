use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BookingRequest, RequestStatus};
use crate::services::{clock, scheduling};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

fn admin_actor(headers: &HeaderMap) -> String {
    headers
        .get("x-admin-actor")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("admin")
        .to_string()
}

#[derive(Serialize)]
pub struct RequestResponse {
    id: i64,
    public_ref: String,
    customer_id: String,
    service_key: String,
    service_label: String,
    start_at: String,
    end_at: String,
    status: String,
    created_at: String,
    admin_actor: Option<String>,
    decided_at: Option<String>,
    admin_note: Option<String>,
}

impl From<BookingRequest> for RequestResponse {
    fn from(r: BookingRequest) -> Self {
        Self {
            id: r.id,
            public_ref: r.public_ref,
            customer_id: r.customer_id,
            service_key: r.service_key,
            service_label: r.service_label,
            start_at: queries::fmt_ts(&r.start_at),
            end_at: queries::fmt_ts(&r.end_at),
            status: r.status.as_str().to_string(),
            created_at: queries::fmt_ts(&r.created_at),
            admin_actor: r.admin_actor,
            decided_at: r.decided_at.as_ref().map(queries::fmt_ts),
            admin_note: r.admin_note,
        }
    }
}

// GET /api/bookings/pending
pub async fn get_pending(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<RequestResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let requests = {
        let db = state.db.lock().unwrap();
        queries::list_pending_requests(&db, 50)?
    };

    Ok(Json(requests.into_iter().map(Into::into).collect()))
}

// GET /api/bookings/requests
#[derive(Deserialize)]
pub struct RequestsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_requests(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RequestsQuery>,
) -> Result<Json<Vec<RequestResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let status = match query.status.as_deref() {
        Some(s) => Some(
            RequestStatus::parse(s)
                .ok_or_else(|| AppError::Validation(format!("unknown status '{s}'")))?,
        ),
        None => None,
    };

    let requests = {
        let db = state.db.lock().unwrap();
        queries::list_requests(&db, status, query.limit.unwrap_or(50))?
    };

    Ok(Json(requests.into_iter().map(Into::into).collect()))
}

#[derive(Deserialize, Default)]
pub struct DecisionBody {
    pub admin_note: Option<String>,
}

// POST /api/bookings/:reference/approve
pub async fn approve_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(reference): Path<String>,
    body: Option<Json<DecisionBody>>,
) -> Result<Json<serde_json::Value>, AppError> {
    decide(state, headers, reference, body, RequestStatus::Approved).await
}

// POST /api/bookings/:reference/reject
pub async fn reject_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(reference): Path<String>,
    body: Option<Json<DecisionBody>>,
) -> Result<Json<serde_json::Value>, AppError> {
    decide(state, headers, reference, body, RequestStatus::Rejected).await
}

/// Shared approve/reject path. The status guard in the decide query makes
/// a repeated decision a 409, so the customer is notified exactly once.
async fn decide(
    state: Arc<AppState>,
    headers: HeaderMap,
    reference: String,
    body: Option<Json<DecisionBody>>,
    decision: RequestStatus,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let actor = admin_actor(&headers);
    let note = body.as_ref().and_then(|b| b.admin_note.clone());
    let now = clock::now_local(state.config.tz_offset_minutes);

    let request = {
        let db = state.db.lock().unwrap();
        let id = queries::resolve_request_id(&db, &reference)?
            .ok_or_else(|| AppError::NotFound(format!("no booking request '{reference}'")))?;

        let updated = queries::decide_request(&db, id, &actor, decision, note.as_deref(), &now)?;
        if !updated {
            return Err(AppError::Conflict("request is not pending".to_string()));
        }

        if let Some(hold_id) = queries::find_hold_by_request(&db, id)? {
            queries::release_hold(&db, hold_id)?;
        }

        queries::get_request(&db, id)?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("request vanished after decide")))?
    };

    tracing::info!(
        public_ref = %request.public_ref,
        actor = %actor,
        decision = decision.as_str(),
        "booking request decided"
    );

    // admin_note stays internal; the customer only sees the decision
    let window = scheduling::format_window(&request.start_at, &request.end_at);
    let text = match decision {
        RequestStatus::Approved => format!(
            "Confirmed ✅\n{}\n{}\nRef #{}",
            request.service_label, window, request.public_ref,
        ),
        _ => format!(
            "Sorry — we couldn't take that slot ❌\n{}\n{}\nReply with another date & time and I'll check again. (Ref #{})",
            request.service_label, window, request.public_ref,
        ),
    };
    if let Err(e) = state
        .messaging
        .send_message(&request.channel_id, &request.customer_id, &text)
        .await
    {
        tracing::error!(error = %e, "failed to notify customer of decision");
    }

    Ok(Json(serde_json::json!({
        "ok": true,
        "ref": request.public_ref,
        "status": decision.as_str(),
    })))
}

// POST /api/bookings/:reference/cancel
pub async fn cancel_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(reference): Path<String>,
    body: Option<Json<DecisionBody>>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let actor = admin_actor(&headers);
    let note = body.as_ref().and_then(|b| b.admin_note.clone());
    let now = clock::now_local(state.config.tz_offset_minutes);

    let request = {
        let db = state.db.lock().unwrap();
        let id = queries::resolve_request_id(&db, &reference)?
            .ok_or_else(|| AppError::NotFound(format!("no booking request '{reference}'")))?;

        let updated = queries::cancel_request(&db, id, &actor, note.as_deref(), &now)?;
        if !updated {
            return Err(AppError::Conflict("request is not approved".to_string()));
        }

        queries::get_request(&db, id)?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("request vanished after cancel")))?
    };

    tracing::info!(public_ref = %request.public_ref, actor = %actor, "approved booking cancelled");

    let window = scheduling::format_window(&request.start_at, &request.end_at);
    let text = format!(
        "Booking cancelled ❌\n{}\n{}\nRef #{}\nReply with a new date & time if you'd like to rebook.",
        request.service_label, window, request.public_ref,
    );
    if let Err(e) = state
        .messaging
        .send_message(&request.channel_id, &request.customer_id, &text)
        .await
    {
        tracing::error!(error = %e, "failed to notify customer of cancellation");
    }

    Ok(Json(serde_json::json!({
        "ok": true,
        "ref": request.public_ref,
        "status": "cancelled",
    })))
}
