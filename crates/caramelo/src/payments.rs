// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment Reconciliation Ledger.
//!
//! Applies provider webhook events to the payment ledger and, on a
//! confirmation, promotes the customer to `converted`, closes their open
//! opportunities, and produces the confirmation text for the caller to
//! deliver. The event's external reference is the chat id; an event
//! without one cannot be routed back to a conversation.

use caramelo_core::CarameloError;
use caramelo_core::types::{
    ConversationStage, NewPayment, Payment, PaymentAnalytics, PaymentAnalyticsRollup,
    PaymentStatus, ProfilePatch,
};
use caramelo_storage::{Database, queries};
use tracing::{debug, info, warn};

use crate::opportunities::OpportunityTracker;

/// A provider payment notification, normalized from the webhook body.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    /// Provider event name, e.g. `PAYMENT_CONFIRMED`.
    pub event: String,
    /// Provider-assigned payment id.
    pub payment_id: String,
    /// The chat id this payment belongs to, carried as the provider's
    /// external reference.
    pub external_reference: Option<String>,
    pub value: f64,
    pub billing_type: Option<String>,
    pub description: Option<String>,
    pub invoice_url: Option<String>,
}

#[derive(Clone)]
pub struct PaymentLedger {
    db: Database,
    provider: String,
    tracker: OpportunityTracker,
}

impl PaymentLedger {
    pub fn new(db: Database, provider: String, tracker: OpportunityTracker) -> Self {
        Self {
            db,
            provider,
            tracker,
        }
    }

    /// Record a payment intent in the ledger.
    pub async fn record(&self, payment: NewPayment) -> Result<Option<Payment>, CarameloError> {
        queries::payments::record(&self.db, payment).await
    }

    /// Move a payment to a new status by provider id.
    pub async fn update_status(
        &self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<Option<Payment>, CarameloError> {
        queries::payments::update_status(&self.db, payment_id, status).await
    }

    #[allow(dead_code)]
    pub async fn find_by_id(&self, payment_id: &str) -> Result<Option<Payment>, CarameloError> {
        queries::payments::find_by_id(&self.db, payment_id).await
    }

    #[allow(dead_code)]
    pub async fn list_by_customer(&self, chat_id: &str) -> Result<Vec<Payment>, CarameloError> {
        queries::payments::list_by_customer(&self.db, chat_id).await
    }

    pub async fn list_pending(&self) -> Result<Vec<Payment>, CarameloError> {
        queries::payments::list_pending(&self.db).await
    }

    /// Per-customer analytics over the `payment_analytics` view.
    #[allow(dead_code)]
    pub async fn analytics(&self, chat_id: &str) -> Result<Option<PaymentAnalytics>, CarameloError> {
        queries::payments::analytics(&self.db, chat_id).await
    }

    pub async fn analytics_rollup(&self) -> Result<PaymentAnalyticsRollup, CarameloError> {
        queries::payments::analytics_rollup(&self.db).await
    }

    /// Apply a provider event to the ledger. Returns the confirmation
    /// text to send to the customer when the event is a confirmation that
    /// can be routed to a chat; `None` otherwise.
    pub async fn reconcile(&self, event: PaymentEvent) -> Result<Option<String>, CarameloError> {
        let Some(status) = map_event_status(&event.event) else {
            debug!(event = %event.event, payment_id = %event.payment_id, "ignoring payment event");
            return Ok(None);
        };

        // Update the existing row, or create one from the event when the
        // payment was initiated outside this process.
        let stored = match self.update_status(&event.payment_id, status).await? {
            Some(payment) => Some(payment),
            None => match &event.external_reference {
                Some(chat_id) => {
                    self.record(NewPayment {
                        chat_id: chat_id.clone(),
                        payment_id: event.payment_id.clone(),
                        provider: self.provider.clone(),
                        amount: event.value,
                        original_amount: None,
                        discount_amount: None,
                        status,
                        method: event
                            .billing_type
                            .as_deref()
                            .unwrap_or("unknown")
                            .to_lowercase(),
                        description: event.description.clone(),
                        payment_url: event.invoice_url.clone(),
                    })
                    .await?
                }
                None => {
                    warn!(
                        payment_id = %event.payment_id,
                        "payment event for unknown payment with no external reference"
                    );
                    None
                }
            },
        };

        if status != PaymentStatus::Confirmed {
            info!(payment_id = %event.payment_id, status = %status, "payment reconciled");
            return Ok(None);
        }

        let Some(chat_id) = event.external_reference else {
            warn!(
                payment_id = %event.payment_id,
                "confirmed payment has no external reference, customer not notified"
            );
            return Ok(None);
        };

        let amount = stored.as_ref().map(|p| p.amount).unwrap_or(event.value);
        let description = stored
            .as_ref()
            .and_then(|p| p.description.clone())
            .or(event.description);

        queries::profiles::record_purchase(
            &self.db,
            &chat_id,
            description.as_deref().unwrap_or("compra"),
            amount,
            None,
        )
        .await?;
        queries::profiles::update(
            &self.db,
            &chat_id,
            ProfilePatch {
                conversation_stage: Some(ConversationStage::Converted),
                ..Default::default()
            },
        )
        .await?;
        let closed = self.tracker.mark_converted(&chat_id).await?;
        info!(
            chat_id = %chat_id,
            payment_id = %event.payment_id,
            amount,
            opportunities_closed = closed,
            "payment confirmed, customer converted"
        );

        Ok(Some(render_confirmation(amount, description.as_deref())))
    }
}

/// Map a provider event name to a ledger status. Unknown events are
/// ignored by the caller.
fn map_event_status(event: &str) -> Option<PaymentStatus> {
    match event {
        "PAYMENT_CONFIRMED" | "PAYMENT_RECEIVED" => Some(PaymentStatus::Confirmed),
        "PAYMENT_OVERDUE" | "PAYMENT_CHARGEBACK" => Some(PaymentStatus::Failed),
        "PAYMENT_DELETED" | "PAYMENT_REFUNDED" => Some(PaymentStatus::Cancelled),
        _ => None,
    }
}

/// Customer-facing confirmation text (Portuguese).
fn render_confirmation(amount: f64, description: Option<&str>) -> String {
    match description {
        Some(desc) => format!(
            "Pagamento confirmado! Recebemos R$ {amount:.2} referente a {desc}. \
             Obrigado pela preferencia!"
        ),
        None => format!(
            "Pagamento confirmado! Recebemos R$ {amount:.2}. Obrigado pela preferencia!"
        ),
    }
}
