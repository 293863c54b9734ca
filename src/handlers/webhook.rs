use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::services::booking;
use crate::state::AppState;

const FALLBACK_REPLY: &str = "Sorry, I'm having trouble right now. Please try again in a moment.";

// ── Meta webhook payload ──

#[derive(Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Deserialize)]
pub struct Change {
    pub value: ChangeValue,
}

#[derive(Deserialize)]
pub struct ChangeValue {
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

#[derive(Deserialize)]
pub struct Metadata {
    pub phone_number_id: String,
}

#[derive(Deserialize)]
pub struct InboundMessage {
    pub from: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<TextBody>,
    pub interactive: Option<Interactive>,
}

#[derive(Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Deserialize)]
pub struct Interactive {
    pub button_reply: Option<ButtonReply>,
}

#[derive(Deserialize)]
pub struct ButtonReply {
    pub id: String,
}

// ── Verification handshake ──

// GET /webhook: Meta sends hub.mode/hub.verify_token/hub.challenge and
// expects the raw challenge echoed back on match.
pub async fn verify_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mode = params.get("hub.mode").map(String::as_str).unwrap_or("");
    let token = params
        .get("hub.verify_token")
        .map(String::as_str)
        .unwrap_or("");
    let challenge = params
        .get("hub.challenge")
        .map(String::as_str)
        .unwrap_or("");

    if mode == "subscribe" && token == state.config.whatsapp_verify_token {
        return (StatusCode::OK, challenge.to_string()).into_response();
    }

    tracing::warn!("webhook verification failed");
    (StatusCode::FORBIDDEN, "verification failed").into_response()
}

fn verify_meta_signature(app_secret: &str, signature: &str, body: &[u8]) -> bool {
    let Some(hex_sig) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let mut mac = match Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    let expected: String = mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();

    expected == hex_sig.to_lowercase()
}

// ── Inbound messages ──

// POST /webhook: the signature covers the raw body, so this handler
// takes Bytes and parses JSON itself.
pub async fn inbound_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Signature check is skipped when no app secret is configured (dev mode)
    if !state.config.whatsapp_app_secret.is_empty() {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !verify_meta_signature(&state.config.whatsapp_app_secret, signature, &body) {
            tracing::warn!("invalid X-Hub-Signature-256");
            return (StatusCode::FORBIDDEN, "invalid signature").into_response();
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable webhook payload");
            // Meta retries on non-2xx; a bad payload will never get better
            return ok_response();
        }
    };

    for entry in payload.entry {
        for change in entry.changes {
            let channel_id = change
                .value
                .metadata
                .as_ref()
                .map(|m| m.phone_number_id.clone())
                .unwrap_or_else(|| state.config.whatsapp_phone_number_id.clone());

            for message in change.value.messages {
                process_inbound(&state, &channel_id, message).await;
            }
        }
    }

    ok_response()
}

async fn process_inbound(state: &Arc<AppState>, channel_id: &str, message: InboundMessage) {
    let from = message.from.clone();

    let text = match message.kind.as_str() {
        "text" => message.text.map(|t| t.body),
        "interactive" => message
            .interactive
            .and_then(|i| i.button_reply)
            .map(|b| b.id),
        _ => None,
    };

    let Some(text) = text else {
        tracing::info!(from = %from, kind = %message.kind, "unsupported message type");
        let reply = "I can only read text messages right now. Please type your request.";
        if let Err(e) = state.messaging.send_message(channel_id, &from, reply).await {
            tracing::error!(error = %e, "failed to send unsupported-type reply");
        }
        return;
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        return;
    }

    tracing::info!(from = %from, body = %text, "incoming WhatsApp message");

    match booking::handle_message(state, channel_id, &from, &text).await {
        Ok(Some(reply)) => {
            deliver_reply(state, channel_id, &from, &reply).await;
            if let Some(notice) = &reply.admin_notice {
                notify_admins(state, channel_id, notice).await;
            }
        }
        Ok(None) => {
            // Not booking-related and no conversation in flight
            let help = format!(
                "Hi! I can help you book {}. Just tell me the service and a date & time.",
                crate::models::service::catalog_summary(),
            );
            if let Err(e) = state.messaging.send_message(channel_id, &from, &help).await {
                tracing::error!(error = %e, "failed to send help reply");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, from = %from, "booking flow failed");
            let _ = state
                .messaging
                .send_message(channel_id, &from, FALLBACK_REPLY)
                .await;
        }
    }
}

async fn deliver_reply(
    state: &Arc<AppState>,
    channel_id: &str,
    to: &str,
    reply: &booking::BookingReply,
) {
    if let Some(choices) = &reply.choices {
        match state
            .messaging
            .send_choice_prompt(channel_id, to, &reply.text, choices)
            .await
        {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => tracing::error!(error = %e, "failed to send button prompt"),
        }
        // Fall back to plain text with explicit instructions
        let text = format!("{}\nReply CONFIRM or CANCEL.", reply.text);
        if let Err(e) = state.messaging.send_message(channel_id, to, &text).await {
            tracing::error!(error = %e, "failed to send fallback reply");
        }
        return;
    }

    if let Err(e) = state
        .messaging
        .send_message(channel_id, to, &reply.text)
        .await
    {
        tracing::error!(error = %e, "failed to send reply");
    }
}

async fn notify_admins(state: &Arc<AppState>, channel_id: &str, message: &str) {
    if state.config.admin_numbers.is_empty() {
        tracing::warn!("no admin numbers configured, skipping notification");
        return;
    }
    for number in &state.config.admin_numbers {
        if let Err(e) = state.messaging.send_message(channel_id, number, message).await {
            tracing::error!(error = %e, admin = %number, "failed to notify admin");
        }
    }
}

fn ok_response() -> Response {
    Json(serde_json::json!({ "status": "received" })).into_response()
}
