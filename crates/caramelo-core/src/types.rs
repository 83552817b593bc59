// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model for the customer-memory core.
//!
//! All timestamps are UTC RFC 3339 text with millisecond precision
//! (`2026-01-01T00:00:00.000Z`). The format is uniform across Rust and SQL
//! so string comparison orders chronologically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Timestamp format shared with the SQL side
/// (`strftime('%Y-%m-%dT%H:%M:%fZ', 'now')`).
pub const ISO_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current time in the canonical storage format.
pub fn now_iso() -> String {
    iso_millis(Utc::now())
}

/// Format a timestamp in the canonical storage format.
pub fn iso_millis(t: DateTime<Utc>) -> String {
    t.format(ISO_MILLIS).to_string()
}

/// Format a timestamp at whole-second precision. Used for appointment
/// times, which are matched by equality.
pub fn iso_seconds(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Coarse funnel position of a customer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationStage {
    #[default]
    New,
    Engaged,
    Negotiating,
    Converted,
    Abandoned,
}

/// Categorical measure of a customer's responsiveness.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    #[default]
    Low,
    Medium,
    High,
}

/// Who authored a conversation message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Payment lifecycle status. Transitions are not enforced by the store;
/// leaving a settled status is logged but accepted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Confirmed,
    Failed,
    Cancelled,
}

/// One customer's behavioral profile, composed from the base row plus its
/// bounded and append-only sub-collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub chat_id: String,
    pub display_name: Option<String>,
    pub pet_name: Option<String>,
    pub pet_breed: Option<String>,
    pub pet_size: Option<String>,
    pub pet_species: Option<String>,
    pub first_contact_at: String,
    pub last_message_at: String,
    pub last_follow_up_at: Option<String>,
    /// Rolling average over the retained response-time samples.
    pub avg_response_time_ms: f64,
    /// Last 10 response-time samples, newest first.
    pub response_times_ms: Vec<i64>,
    pub engagement_score: f64,
    pub engagement_level: EngagementLevel,
    pub conversation_stage: ConversationStage,
    pub purchase_intent: f64,
    pub last_sentiment: Option<String>,
    pub total_messages: i64,
    pub total_conversations: i64,
    pub notes: String,
    /// Open-ended key/value preferences, replaced wholesale on update.
    pub preferences: serde_json::Value,
    /// Deduplicated interests, most recently mentioned first.
    pub interests: Vec<String>,
    /// Unresolved objections, newest first.
    pub objections: Vec<String>,
    /// Purchase ledger, newest first.
    pub purchases: Vec<Purchase>,
}

/// Explicit partial update for a profile. Only present fields are written;
/// an all-`None` patch is a no-op. This is the allow-list boundary --
/// callers cannot reach columns that have no field here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub pet_name: Option<String>,
    pub pet_breed: Option<String>,
    pub pet_size: Option<String>,
    pub pet_species: Option<String>,
    pub last_message_at: Option<String>,
    pub last_follow_up_at: Option<String>,
    pub avg_response_time_ms: Option<f64>,
    pub engagement_score: Option<f64>,
    pub engagement_level: Option<EngagementLevel>,
    pub conversation_stage: Option<ConversationStage>,
    pub purchase_intent: Option<f64>,
    pub last_sentiment: Option<String>,
    pub total_messages: Option<i64>,
    pub total_conversations: Option<i64>,
    pub notes: Option<String>,
    /// Replaces the whole serialized preferences map (no deep merge).
    pub preferences: Option<serde_json::Value>,
}

impl ProfilePatch {
    /// True when no recognized field is present.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.pet_name.is_none()
            && self.pet_breed.is_none()
            && self.pet_size.is_none()
            && self.pet_species.is_none()
            && self.last_message_at.is_none()
            && self.last_follow_up_at.is_none()
            && self.avg_response_time_ms.is_none()
            && self.engagement_score.is_none()
            && self.engagement_level.is_none()
            && self.conversation_stage.is_none()
            && self.purchase_intent.is_none()
            && self.last_sentiment.is_none()
            && self.total_messages.is_none()
            && self.total_conversations.is_none()
            && self.notes.is_none()
            && self.preferences.is_none()
    }
}

/// A message to append to a chat's bounded conversation history.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: String,
    pub role: MessageRole,
    pub content: String,
    pub sentiment: Option<String>,
    pub engagement_delta: Option<f64>,
    /// Originating network message id, when the channel provides one.
    pub message_id: Option<String>,
}

/// A stored conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: i64,
    pub chat_id: String,
    pub role: MessageRole,
    pub content: String,
    pub sentiment: Option<String>,
    pub engagement_delta: Option<f64>,
    pub message_id: Option<String>,
    pub created_at: String,
}

/// One entry in a customer's purchase ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub service: String,
    pub value: f64,
    pub pet_name: Option<String>,
    pub purchased_at: String,
}

/// Context snapshot captured when a follow-up is scheduled. The profile may
/// move on before the follow-up fires; this is what the message was written
/// against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FollowUpContext {
    pub last_topic: Option<String>,
    pub last_stage: ConversationStage,
}

/// A future-dated re-engagement intent to persist.
#[derive(Debug, Clone)]
pub struct FollowUpRequest {
    pub chat_id: String,
    /// Canonical-format timestamp at which the item becomes due.
    pub scheduled_for: String,
    pub reason: String,
    pub message: String,
    pub attempt: i64,
    pub context: FollowUpContext,
}

/// A stored follow-up, pending or executed. Executed items are retained as
/// an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledFollowUp {
    pub id: i64,
    pub chat_id: String,
    pub scheduled_for: String,
    pub reason: String,
    pub message: String,
    pub attempt: i64,
    pub context: FollowUpContext,
    pub executed: bool,
    pub executed_at: Option<String>,
}

/// Audit record of a follow-up sent through the immediate (non-scheduled)
/// path. External policy reads this log to detect abandonment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImmediateFollowUp {
    pub id: i64,
    pub chat_id: String,
    pub level: i64,
    pub message: String,
    pub attempt: i64,
    pub executed_at: String,
}

/// A scored sales signal to append for a chat.
#[derive(Debug, Clone)]
pub struct OpportunityRequest {
    pub chat_id: String,
    pub score: f64,
    pub reason: String,
    pub suggested_action: String,
    pub urgency_level: i64,
    pub close_message: Option<String>,
}

/// A stored conversion opportunity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOpportunity {
    pub id: i64,
    pub chat_id: String,
    pub score: f64,
    pub reason: String,
    pub suggested_action: String,
    pub urgency_level: i64,
    pub close_message: Option<String>,
    pub converted: bool,
}

/// An appointment reminder to persist.
#[derive(Debug, Clone)]
pub struct ReminderRequest {
    pub chat_id: String,
    pub service: String,
    /// Whole-second precision; reminders are matched by
    /// (chat id, appointment time) equality.
    pub appointment_time: String,
    pub reminder_time: String,
    pub lead_minutes: i64,
    pub pet_name: Option<String>,
    pub owner_name: Option<String>,
}

/// A stored appointment reminder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentReminder {
    pub id: i64,
    pub chat_id: String,
    pub service: String,
    pub appointment_time: String,
    pub reminder_time: String,
    pub lead_minutes: i64,
    pub pet_name: Option<String>,
    pub owner_name: Option<String>,
    pub sent: bool,
    pub sent_at: Option<String>,
}

/// A payment intent to record in the ledger.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub chat_id: String,
    /// Provider-assigned payment id, unique across the ledger.
    pub payment_id: String,
    pub provider: String,
    pub amount: f64,
    /// Defaults to `amount` when not supplied.
    pub original_amount: Option<f64>,
    /// Defaults to 0 when not supplied.
    pub discount_amount: Option<f64>,
    pub status: PaymentStatus,
    pub method: String,
    pub description: Option<String>,
    pub payment_url: Option<String>,
}

/// A stored payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub chat_id: String,
    pub payment_id: String,
    pub provider: String,
    pub amount: f64,
    pub original_amount: f64,
    pub discount_amount: f64,
    pub status: PaymentStatus,
    pub method: String,
    pub description: Option<String>,
    pub payment_url: Option<String>,
    pub created_at: String,
    /// Set if and only if the current status is `confirmed`.
    pub confirmed_at: Option<String>,
}

/// Per-customer rollup from the `payment_analytics` view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAnalytics {
    pub chat_id: String,
    pub total_payments: i64,
    pub confirmed_payments: i64,
    pub total_revenue: f64,
    pub total_discounts_given: f64,
    pub avg_ticket: f64,
}

/// Cross-customer rollup computed over the `payment_analytics` view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAnalyticsRollup {
    pub total_customers: i64,
    pub total_payments: i64,
    pub confirmed_payments: i64,
    pub total_revenue: f64,
    pub total_discounts_given: f64,
    pub avg_ticket: f64,
}
