// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook HTTP surface built on axum.
//!
//! Inbound chat events (WAHA) and payment notifications (Asaas-style)
//! land here. Both endpoints acknowledge immediately and process in a
//! spawned task; processing failures are logged, never returned to the
//! remote caller, which would otherwise retry and duplicate work.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use caramelo_core::traits::ChatGateway;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::memory::CustomerMemory;
use crate::payments::{PaymentEvent, PaymentLedger};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub agent_name: String,
    pub session: String,
    pub webhook_path: String,
    pub payments_enabled: bool,
    pub memory: CustomerMemory,
    pub ledger: PaymentLedger,
    pub gateway: Arc<dyn ChatGateway>,
    pub started_at: Instant,
    pub messages_processed: Arc<AtomicU64>,
}

/// Inbound WAHA webhook envelope.
#[derive(Debug, Deserialize)]
pub struct ChatWebhookBody {
    pub event: String,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub payload: Option<ChatMessagePayload>,
}

/// The message payload of a WAHA `message` event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    #[serde(default)]
    pub id: Option<String>,
    pub from: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub body: Option<String>,
}

/// Inbound payment provider webhook envelope.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhookBody {
    pub event: String,
    #[serde(default)]
    pub payment: Option<PaymentEventPayload>,
}

/// The payment object of a provider notification.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEventPayload {
    pub id: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub billing_type: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub invoice_url: Option<String>,
}

/// Build the webhook router.
pub fn build_router(state: AppState) -> Router {
    let webhook_path = state.webhook_path.clone();
    Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_health))
        .route("/stats", get(get_stats))
        .route(&webhook_path, post(post_chat_webhook))
        .route("/webhook/payments", post(post_payment_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": state.agent_name,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "stats": "/stats",
            "chat_webhook": state.webhook_path,
            "payment_webhook": "/webhook/payments",
        },
    }))
}

async fn get_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "messages_processed": state.messages_processed.load(Ordering::Relaxed),
    }))
}

/// Operational counters plus the payment-ledger rollup. Ledger reads
/// degrade to empty values when the payments schema is unavailable, so
/// this always answers 200.
async fn get_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let payments = match state.ledger.analytics_rollup().await {
        Ok(rollup) => {
            let pending = match state.ledger.list_pending().await {
                Ok(rows) => rows.len(),
                Err(e) => {
                    error!(error = %e, "failed to list pending payments for stats");
                    0
                }
            };
            serde_json::json!({
                "enabled": state.payments_enabled,
                "pending": pending,
                "rollup": rollup,
            })
        }
        Err(e) => {
            error!(error = %e, "failed to compute payment rollup for stats");
            serde_json::Value::Null
        }
    };

    Json(serde_json::json!({
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "messages_processed": state.messages_processed.load(Ordering::Relaxed),
        "payments": payments,
    }))
}

/// Acknowledge the chat event, then process it off the request path.
async fn post_chat_webhook(
    State(state): State<AppState>,
    Json(body): Json<ChatWebhookBody>,
) -> StatusCode {
    tokio::spawn(async move {
        process_chat_event(state, body).await;
    });
    StatusCode::OK
}

/// Acknowledge the payment notification, then reconcile it off the
/// request path.
async fn post_payment_webhook(
    State(state): State<AppState>,
    Json(body): Json<PaymentWebhookBody>,
) -> StatusCode {
    tokio::spawn(async move {
        process_payment_event(state, body).await;
    });
    StatusCode::OK
}

pub(crate) async fn process_chat_event(state: AppState, body: ChatWebhookBody) {
    if body.event != "message" {
        debug!(event = %body.event, "ignoring non-message chat event");
        return;
    }
    if let Some(ref session) = body.session {
        if session != &state.session {
            debug!(session = %session, "ignoring event for foreign session");
            return;
        }
    }
    let Some(payload) = body.payload else {
        warn!("message event with no payload");
        return;
    };
    let Some(content) = payload.body else {
        debug!(from = %payload.from, "message event with no text body, skipping");
        return;
    };

    match state
        .memory
        .ingest_chat_message(&payload.from, payload.id, &content, payload.from_me)
        .await
    {
        Ok(()) => {
            state.messages_processed.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            error!(chat_id = %payload.from, error = %e, "failed to ingest chat message");
        }
    }
}

pub(crate) async fn process_payment_event(state: AppState, body: PaymentWebhookBody) {
    if !state.payments_enabled {
        info!(event = %body.event, "payments disabled, notification dropped");
        return;
    }
    let Some(payment) = body.payment else {
        warn!(event = %body.event, "payment event with no payment object");
        return;
    };

    let chat_id = payment.external_reference.clone();
    let event = PaymentEvent {
        event: body.event,
        payment_id: payment.id,
        external_reference: payment.external_reference,
        value: payment.value,
        billing_type: payment.billing_type,
        description: payment.description,
        invoice_url: payment.invoice_url,
    };

    match state.ledger.reconcile(event).await {
        Ok(Some(confirmation)) => {
            // reconcile only returns a message when the reference is present.
            if let Some(chat_id) = chat_id {
                if let Err(e) = state.gateway.send_message(&chat_id, &confirmation).await {
                    error!(chat_id = %chat_id, error = %e, "failed to send payment confirmation");
                }
            }
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "payment reconciliation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use caramelo_core::CarameloError;
    use caramelo_core::types::ConversationStage;
    use caramelo_storage::Database;
    use std::sync::Mutex;
    use tempfile::tempdir;

    use crate::opportunities::OpportunityTracker;

    struct MockGateway {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl MockGateway {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatGateway for MockGateway {
        async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), CarameloError> {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn session_status(&self) -> Result<String, CarameloError> {
            Ok("WORKING".to_string())
        }
    }

    async fn test_state(payments_enabled: bool) -> (tempfile::TempDir, AppState, Arc<MockGateway>) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        let gateway = MockGateway::new();
        let tracker = OpportunityTracker::new(db.clone());
        let state = AppState {
            agent_name: "caramelo".to_string(),
            session: "default".to_string(),
            webhook_path: "/webhook".to_string(),
            payments_enabled,
            memory: CustomerMemory::new(db.clone()),
            ledger: PaymentLedger::new(db, "asaas".to_string(), tracker),
            gateway: gateway.clone(),
            started_at: Instant::now(),
            messages_processed: Arc::new(AtomicU64::new(0)),
        };
        (dir, state, gateway)
    }

    fn chat_body(json: serde_json::Value) -> ChatWebhookBody {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn chat_webhook_body_parses_waha_shape() {
        let body = chat_body(serde_json::json!({
            "event": "message",
            "session": "default",
            "payload": {
                "id": "wamid.abc",
                "from": "5511999990000@c.us",
                "fromMe": false,
                "body": "oi, voces tem racao golden?"
            }
        }));
        assert_eq!(body.event, "message");
        let payload = body.payload.unwrap();
        assert_eq!(payload.from, "5511999990000@c.us");
        assert!(!payload.from_me);
    }

    #[test]
    fn payment_webhook_body_parses_camel_case() {
        let body: PaymentWebhookBody = serde_json::from_value(serde_json::json!({
            "event": "PAYMENT_CONFIRMED",
            "payment": {
                "id": "pay_1",
                "value": 80.0,
                "billingType": "PIX",
                "externalReference": "5511999990000@c.us",
                "invoiceUrl": "https://example.test/inv"
            }
        }))
        .unwrap();
        let payment = body.payment.unwrap();
        assert_eq!(payment.external_reference.as_deref(), Some("5511999990000@c.us"));
        assert_eq!(payment.billing_type.as_deref(), Some("PIX"));
    }

    #[tokio::test]
    async fn chat_event_updates_memory_and_counter() {
        let (_dir, state, _gateway) = test_state(false).await;

        process_chat_event(
            state.clone(),
            chat_body(serde_json::json!({
                "event": "message",
                "session": "default",
                "payload": {"from": "c1", "fromMe": false, "body": "oi"}
            })),
        )
        .await;

        assert_eq!(state.messages_processed.load(Ordering::Relaxed), 1);
        let profile = state.memory.profile("c1").await.unwrap().unwrap();
        assert_eq!(profile.total_messages, 1);
    }

    #[tokio::test]
    async fn foreign_session_events_are_skipped() {
        let (_dir, state, _gateway) = test_state(false).await;

        process_chat_event(
            state.clone(),
            chat_body(serde_json::json!({
                "event": "message",
                "session": "other",
                "payload": {"from": "c1", "fromMe": false, "body": "oi"}
            })),
        )
        .await;

        assert_eq!(state.messages_processed.load(Ordering::Relaxed), 0);
        assert!(state.memory.profile("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_message_events_are_skipped() {
        let (_dir, state, _gateway) = test_state(false).await;

        process_chat_event(
            state.clone(),
            chat_body(serde_json::json!({"event": "session.status", "session": "default"})),
        )
        .await;

        assert_eq!(state.messages_processed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn payment_confirmation_flows_to_customer() {
        let (_dir, state, gateway) = test_state(true).await;

        let body: PaymentWebhookBody = serde_json::from_value(serde_json::json!({
            "event": "PAYMENT_CONFIRMED",
            "payment": {
                "id": "pay_1",
                "value": 80.0,
                "billingType": "PIX",
                "externalReference": "c1",
                "description": "banho e tosa"
            }
        }))
        .unwrap();
        process_payment_event(state.clone(), body).await;

        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "c1");
        assert!(sent[0].1.contains("Pagamento confirmado"));

        let profile = state.memory.profile("c1").await.unwrap().unwrap();
        assert_eq!(profile.conversation_stage, ConversationStage::Converted);
    }

    #[tokio::test]
    async fn stats_reports_payment_rollup() {
        let (_dir, state, _gateway) = test_state(true).await;

        let body: PaymentWebhookBody = serde_json::from_value(serde_json::json!({
            "event": "PAYMENT_CONFIRMED",
            "payment": {
                "id": "pay_1",
                "value": 80.0,
                "billingType": "PIX",
                "externalReference": "c1"
            }
        }))
        .unwrap();
        process_payment_event(state.clone(), body).await;

        let Json(stats) = get_stats(State(state)).await;
        assert_eq!(stats["payments"]["enabled"], true);
        assert_eq!(stats["payments"]["pending"], 0);
        assert_eq!(stats["payments"]["rollup"]["confirmed_payments"], 1);
        assert_eq!(stats["payments"]["rollup"]["total_revenue"], 80.0);
    }

    #[tokio::test]
    async fn payments_disabled_drops_notification() {
        let (_dir, state, gateway) = test_state(false).await;

        let body: PaymentWebhookBody = serde_json::from_value(serde_json::json!({
            "event": "PAYMENT_CONFIRMED",
            "payment": {"id": "pay_1", "value": 80.0, "externalReference": "c1"}
        }))
        .unwrap();
        process_payment_event(state.clone(), body).await;

        assert!(gateway.sent().is_empty());
        assert!(state.ledger.find_by_id("pay_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn confirmation_without_reference_is_not_sent() {
        let (_dir, state, gateway) = test_state(true).await;

        let body: PaymentWebhookBody = serde_json::from_value(serde_json::json!({
            "event": "PAYMENT_CONFIRMED",
            "payment": {"id": "pay_1", "value": 80.0}
        }))
        .unwrap();
        process_payment_event(state.clone(), body).await;

        assert!(gateway.sent().is_empty());
    }
}
