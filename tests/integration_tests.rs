use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use chrono::{NaiveDateTime, Weekday};
use tower::ServiceExt;

use slotbook::config::AppConfig;
use slotbook::db::{self, queries};
use slotbook::models::{BookingIntent, BookingParse, RequestStatus};
use slotbook::services::ai::IntentProvider;
use slotbook::services::booking;
use slotbook::services::messaging::{Choice, MessagingProvider};
use slotbook::state::AppState;

// ── Mock Providers ──

/// Deterministic NLU: service from keywords, start time after "at ",
/// low confidence when the message hedges with "maybe".
struct MockNlu;

#[async_trait]
impl IntentProvider for MockNlu {
    async fn parse_booking(&self, text: &str, _today: &str) -> anyhow::Result<BookingParse> {
        let lower = text.to_lowercase();

        let service_key = if lower.contains("wash") {
            Some("car_wash".to_string())
        } else if lower.contains("servicing") {
            Some("car_servicing".to_string())
        } else if lower.contains("polish") {
            Some("polish".to_string())
        } else {
            None
        };

        let start_local = text.split("at ").nth(1).map(|s| s.trim().to_string());

        if service_key.is_none() && start_local.is_none() && !lower.contains("book") {
            return Ok(BookingParse::not_booking());
        }

        Ok(BookingParse {
            intent: BookingIntent::Booking,
            service_key,
            start_local,
            confidence: if lower.contains("maybe") { 0.3 } else { 0.9 },
        })
    }
}

struct MockMessaging {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    interactive_ok: bool,
}

#[async_trait]
impl MessagingProvider for MockMessaging {
    async fn send_message(&self, _channel_id: &str, to: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }

    async fn send_choice_prompt(
        &self,
        _channel_id: &str,
        to: &str,
        body: &str,
        _choices: &[Choice],
    ) -> anyhow::Result<bool> {
        if !self.interactive_ok {
            return Ok(false);
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(true)
    }
}

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        admin_numbers: vec!["15559999999".to_string()],
        whatsapp_verify_token: "test-verify".to_string(),
        whatsapp_access_token: String::new(),
        whatsapp_phone_number_id: "777".to_string(),
        whatsapp_app_secret: String::new(), // empty = skip signature validation
        llm_api_url: String::new(),
        llm_api_key: String::new(),
        llm_model: "test".to_string(),
        tz_offset_minutes: 0,
        hold_minutes: 10,
        context_minutes: 30,
        open_hour: 9,
        close_hour: 18,
        closed_weekday: Weekday::Sun,
        alt_step_minutes: 30,
        alt_horizon_days: 7,
        alt_max_suggestions: 3,
        request_expire_minutes: None,
    }
}

fn test_state() -> (Arc<AppState>, Arc<Mutex<Vec<(String, String)>>>) {
    test_state_with(test_config(), true)
}

fn test_state_with(
    config: AppConfig,
    interactive_ok: bool,
) -> (Arc<AppState>, Arc<Mutex<Vec<(String, String)>>>) {
    let conn = db::init_db(":memory:").unwrap();
    let sent = Arc::new(Mutex::new(vec![]));
    let messaging = MockMessaging {
        sent: Arc::clone(&sent),
        interactive_ok,
    };
    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config,
        nlu: Box::new(MockNlu),
        messaging: Box::new(messaging),
    });
    (state, sent)
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(slotbook::handlers::health::health))
        .route(
            "/webhook",
            get(slotbook::handlers::webhook::verify_webhook)
                .post(slotbook::handlers::webhook::inbound_webhook),
        )
        .route(
            "/api/bookings/pending",
            get(slotbook::handlers::admin::get_pending),
        )
        .route(
            "/api/bookings/requests",
            get(slotbook::handlers::admin::get_requests),
        )
        .route(
            "/api/bookings/:reference/approve",
            post(slotbook::handlers::admin::approve_request),
        )
        .route(
            "/api/bookings/:reference/reject",
            post(slotbook::handlers::admin::reject_request),
        )
        .route(
            "/api/bookings/:reference/cancel",
            post(slotbook::handlers::admin::cancel_request),
        )
        .with_state(state)
}

const CUSTOMER: &str = "15550001111";

fn webhook_text(text: &str) -> Request<Body> {
    let payload = serde_json::json!({
        "entry": [{
            "changes": [{
                "value": {
                    "metadata": { "phone_number_id": "777" },
                    "messages": [{
                        "from": CUSTOMER,
                        "type": "text",
                        "text": { "body": text },
                    }]
                }
            }]
        }]
    });
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn webhook_button(button_id: &str) -> Request<Body> {
    let payload = serde_json::json!({
        "entry": [{
            "changes": [{
                "value": {
                    "metadata": { "phone_number_id": "777" },
                    "messages": [{
                        "from": CUSTOMER,
                        "type": "interactive",
                        "interactive": { "button_reply": { "id": button_id, "title": "x" } },
                    }]
                }
            }]
        }]
    });
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", "Bearer test-token")
        .body(Body::empty())
        .unwrap()
}

fn admin_post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", "Bearer test-token")
        .body(Body::empty())
        .unwrap()
}

async fn body_json(res: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn last_customer_message(sent: &Arc<Mutex<Vec<(String, String)>>>) -> String {
    sent.lock()
        .unwrap()
        .iter()
        .rev()
        .find(|(to, _)| to == CUSTOMER)
        .map(|(_, body)| body.clone())
        .expect("no message sent to customer")
}

// ── Webhook verification ──

#[tokio::test]
async fn test_webhook_verify_handshake() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=test-verify&hub.challenge=12345")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"12345");
}

#[tokio::test]
async fn test_webhook_verify_rejects_wrong_token() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=12345")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let mut config = test_config();
    config.whatsapp_app_secret = "topsecret".to_string();
    let (state, _) = test_state_with(config, true);
    let app = test_app(state);

    let res = app.oneshot(webhook_text("book car wash")).await.unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_health() {
    let (state, _) = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

// ── Booking conversation ──

#[tokio::test]
async fn test_full_booking_flow_to_approval() {
    let (state, sent) = test_state();

    // Customer asks for a slot
    let res = test_app(state.clone())
        .oneshot(webhook_text("book car wash at 2030-09-03 10:00"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let proposal = last_customer_message(&sent);
    assert!(proposal.contains("Slot looks available"), "{proposal}");
    assert!(proposal.contains("Car wash"), "{proposal}");

    // Customer confirms, request goes to the admin
    test_app(state.clone())
        .oneshot(webhook_text("confirm"))
        .await
        .unwrap();
    let ack = last_customer_message(&sent);
    assert!(ack.contains("Pending admin confirmation"), "{ack}");
    assert!(ack.contains("Ref #"), "{ack}");

    let admin_msgs: Vec<String> = sent
        .lock()
        .unwrap()
        .iter()
        .filter(|(to, _)| to == "15559999999")
        .map(|(_, body)| body.clone())
        .collect();
    assert_eq!(admin_msgs.len(), 1);
    assert!(admin_msgs[0].contains("New booking request"), "{}", admin_msgs[0]);

    // Admin sees exactly one pending request
    let res = test_app(state.clone())
        .oneshot(admin_get("/api/bookings/pending"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let pending = body_json(res).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
    let public_ref = pending[0]["public_ref"].as_str().unwrap().to_string();
    assert_eq!(public_ref.len(), 8);

    // Approve it
    let res = test_app(state.clone())
        .oneshot(admin_post(&format!("/api/bookings/{public_ref}/approve")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let confirmation = last_customer_message(&sent);
    assert!(confirmation.contains("Confirmed ✅"), "{confirmation}");
    assert!(confirmation.contains(&public_ref), "{confirmation}");

    // Second approve is a conflict and sends nothing more
    let res = test_app(state.clone())
        .oneshot(admin_post(&format!("/api/bookings/{public_ref}/approve")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let confirmed_count = sent
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, body)| body.contains("Confirmed ✅"))
        .count();
    assert_eq!(confirmed_count, 1);
}

#[tokio::test]
async fn test_missing_time_remembered_across_messages() {
    let (state, sent) = test_state();

    test_app(state.clone())
        .oneshot(webhook_text("I'd like to book a car wash"))
        .await
        .unwrap();
    let ask = last_customer_message(&sent);
    assert!(ask.contains("what date and time"), "{ask}");

    // Follow-up carries only the time; the service comes from context
    test_app(state.clone())
        .oneshot(webhook_text("at 2030-09-04 10:00"))
        .await
        .unwrap();
    let proposal = last_customer_message(&sent);
    assert!(proposal.contains("Slot looks available"), "{proposal}");
    assert!(proposal.contains("Car wash"), "{proposal}");
}

#[tokio::test]
async fn test_missing_service_asks_for_it() {
    let (state, sent) = test_state();

    test_app(state.clone())
        .oneshot(webhook_text("book something at 2030-09-04 10:00"))
        .await
        .unwrap();
    let ask = last_customer_message(&sent);
    assert!(ask.contains("what service"), "{ask}");
    assert!(ask.contains("car wash"), "{ask}");
}

#[tokio::test]
async fn test_conflicting_slot_offers_alternatives() {
    let (state, sent) = test_state();

    // Seed an approved booking occupying 10:00-11:00
    {
        let db = state.db.lock().unwrap();
        let now = ts("2030-09-01 08:00:00");
        let (id, _) = queries::create_request(
            &db,
            "777",
            "15552223333",
            "car_wash",
            "Car wash",
            &ts("2030-09-03 10:00:00"),
            &ts("2030-09-03 11:00:00"),
            &now,
        )
        .unwrap();
        queries::decide_request(&db, id, "admin", RequestStatus::Approved, None, &now).unwrap();
    }

    test_app(state.clone())
        .oneshot(webhook_text("book car wash at 2030-09-03 10:00"))
        .await
        .unwrap();
    let reply = last_customer_message(&sent);
    assert!(reply.contains("not available"), "{reply}");
    assert!(reply.contains("11:00"), "{reply}");
}

#[tokio::test]
async fn test_closed_day_is_rejected() {
    let (state, sent) = test_state();

    // 2030-09-08 is a Sunday
    test_app(state.clone())
        .oneshot(webhook_text("book car wash at 2030-09-08 10:00"))
        .await
        .unwrap();
    let reply = last_customer_message(&sent);
    assert!(reply.contains("closed on Sundays"), "{reply}");
}

#[tokio::test]
async fn test_stale_confirm_without_draft() {
    let (state, sent) = test_state();

    test_app(state.clone())
        .oneshot(webhook_text("confirm"))
        .await
        .unwrap();
    let reply = last_customer_message(&sent);
    assert!(reply.contains("no longer available"), "{reply}");
}

#[tokio::test]
async fn test_cancel_drops_proposal() {
    let (state, sent) = test_state();

    test_app(state.clone())
        .oneshot(webhook_text("book car wash at 2030-09-03 10:00"))
        .await
        .unwrap();
    test_app(state.clone())
        .oneshot(webhook_text("cancel"))
        .await
        .unwrap();
    let reply = last_customer_message(&sent);
    assert!(reply.contains("dropped that proposal"), "{reply}");

    // Nothing reached the admin and nothing is pending
    let res = test_app(state.clone())
        .oneshot(admin_get("/api/bookings/pending"))
        .await
        .unwrap();
    let pending = body_json(res).await;
    assert!(pending.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_confirm_after_slot_taken_is_rejected() {
    let (state, sent) = test_state();

    test_app(state.clone())
        .oneshot(webhook_text("book car wash at 2030-09-03 10:00"))
        .await
        .unwrap();

    // Someone else's overlapping booking got approved meanwhile
    {
        let db = state.db.lock().unwrap();
        let now = ts("2030-09-01 08:00:00");
        let (id, _) = queries::create_request(
            &db,
            "777",
            "15552223333",
            "car_wash",
            "Car wash",
            &ts("2030-09-03 10:00:00"),
            &ts("2030-09-03 11:00:00"),
            &now,
        )
        .unwrap();
        queries::decide_request(&db, id, "admin", RequestStatus::Approved, None, &now).unwrap();
    }

    test_app(state.clone())
        .oneshot(webhook_text("confirm"))
        .await
        .unwrap();
    let reply = last_customer_message(&sent);
    assert!(reply.contains("just taken"), "{reply}");

    // No request was created for this customer and the draft is gone
    let db = state.db.lock().unwrap();
    let requests = queries::list_requests(&db, None, 50).unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests.iter().all(|r| r.customer_id != CUSTOMER));
    assert!(queries::get_active_draft(&db, CUSTOMER, &ts("2030-09-01 08:00:00"))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_racing_confirms_create_single_request() {
    for _ in 0..25 {
        let (state, _sent) = test_state();

        test_app(state.clone())
            .oneshot(webhook_text("book car wash at 2030-09-03 10:00"))
            .await
            .unwrap();

        // Webhook redelivery: two confirmations land at once
        let spawn_confirm = |state: Arc<AppState>| {
            tokio::spawn(async move {
                booking::handle_message(&state, "777", CUSTOMER, "confirm")
                    .await
                    .unwrap()
                    .expect("confirm always gets a reply")
            })
        };
        let a = spawn_confirm(state.clone());
        let b = spawn_confirm(state.clone());
        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());

        let with_notice = [&ra, &rb]
            .iter()
            .filter(|r| r.admin_notice.is_some())
            .count();
        assert_eq!(with_notice, 1, "exactly one confirm may reach the admin");

        let db = state.db.lock().unwrap();
        let requests = queries::list_requests(&db, None, 50).unwrap();
        assert_eq!(requests.len(), 1, "double confirm must create one request");
    }
}

#[tokio::test]
async fn test_button_reply_confirms_draft() {
    let (state, sent) = test_state();

    test_app(state.clone())
        .oneshot(webhook_text("book car wash at 2030-09-03 10:00"))
        .await
        .unwrap();
    test_app(state.clone())
        .oneshot(webhook_button("confirm_booking"))
        .await
        .unwrap();
    let ack = last_customer_message(&sent);
    assert!(ack.contains("Pending admin confirmation"), "{ack}");
}

#[tokio::test]
async fn test_low_confidence_falls_back_to_help() {
    let (state, sent) = test_state();

    test_app(state.clone())
        .oneshot(webhook_text("maybe a wash sometime, not sure"))
        .await
        .unwrap();
    let reply = last_customer_message(&sent);
    assert!(reply.contains("I can help you book"), "{reply}");
}

#[tokio::test]
async fn test_interactive_fallback_appends_instructions() {
    let (state, sent) = test_state_with(test_config(), false);

    test_app(state.clone())
        .oneshot(webhook_text("book car wash at 2030-09-03 10:00"))
        .await
        .unwrap();
    let reply = last_customer_message(&sent);
    assert!(reply.contains("Reply CONFIRM or CANCEL."), "{reply}");
}

// ── Admin API ──

#[tokio::test]
async fn test_admin_requires_auth() {
    let (state, _) = test_state();

    let res = test_app(state)
        .oneshot(
            Request::builder()
                .uri("/api/bookings/pending")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_reference_is_404() {
    let (state, _) = test_state();

    let res = test_app(state)
        .oneshot(admin_post("/api/bookings/zzzzzzzz/approve"))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_requests_filter_rejects_unknown_status() {
    let (state, _) = test_state();

    let res = test_app(state)
        .oneshot(admin_get("/api/bookings/requests?status=bogus"))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_reject_notifies_customer() {
    let (state, sent) = test_state();

    let public_ref = {
        let db = state.db.lock().unwrap();
        let (_, public_ref) = queries::create_request(
            &db,
            "777",
            CUSTOMER,
            "car_wash",
            "Car wash",
            &ts("2030-09-03 10:00:00"),
            &ts("2030-09-03 11:00:00"),
            &ts("2030-09-01 08:00:00"),
        )
        .unwrap();
        public_ref
    };

    let res = test_app(state.clone())
        .oneshot(admin_post(&format!("/api/bookings/{public_ref}/reject")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let msg = last_customer_message(&sent);
    assert!(msg.contains("couldn't take that slot"), "{msg}");
    assert!(msg.contains(&public_ref), "{msg}");
}

#[tokio::test]
async fn test_cancel_requires_approved_request() {
    let (state, sent) = test_state();

    let public_ref = {
        let db = state.db.lock().unwrap();
        let (_, public_ref) = queries::create_request(
            &db,
            "777",
            CUSTOMER,
            "car_wash",
            "Car wash",
            &ts("2030-09-03 10:00:00"),
            &ts("2030-09-03 11:00:00"),
            &ts("2030-09-01 08:00:00"),
        )
        .unwrap();
        public_ref
    };

    // Still pending: cancel is a conflict
    let res = test_app(state.clone())
        .oneshot(admin_post(&format!("/api/bookings/{public_ref}/cancel")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Approve, then cancel succeeds and the customer hears about it
    let res = test_app(state.clone())
        .oneshot(admin_post(&format!("/api/bookings/{public_ref}/approve")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = test_app(state.clone())
        .oneshot(admin_post(&format!("/api/bookings/{public_ref}/cancel")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let msg = last_customer_message(&sent);
    assert!(msg.contains("Booking cancelled ❌"), "{msg}");
}

#[tokio::test]
async fn test_requests_listing_filters_by_status() {
    let (state, _) = test_state();

    {
        let db = state.db.lock().unwrap();
        let now = ts("2030-09-01 08:00:00");
        let (id, _) = queries::create_request(
            &db,
            "777",
            CUSTOMER,
            "car_wash",
            "Car wash",
            &ts("2030-09-03 10:00:00"),
            &ts("2030-09-03 11:00:00"),
            &now,
        )
        .unwrap();
        queries::decide_request(&db, id, "admin", RequestStatus::Approved, None, &now).unwrap();
        queries::create_request(
            &db,
            "777",
            CUSTOMER,
            "polish",
            "Polishing",
            &ts("2030-09-04 09:00:00"),
            &ts("2030-09-04 13:00:00"),
            &now,
        )
        .unwrap();
    }

    let res = test_app(state.clone())
        .oneshot(admin_get("/api/bookings/requests?status=approved"))
        .await
        .unwrap();
    let approved = body_json(res).await;
    assert_eq!(approved.as_array().unwrap().len(), 1);
    assert_eq!(approved[0]["service_key"], "car_wash");

    let res = test_app(state.clone())
        .oneshot(admin_get("/api/bookings/requests"))
        .await
        .unwrap();
    let all = body_json(res).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}
