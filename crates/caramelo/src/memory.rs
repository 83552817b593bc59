// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Customer Profile Manager.
//!
//! Owns the per-conversation behavioral memory: lazily-created profiles,
//! bounded response-time samples and conversation history, interests,
//! objections, and the purchase ledger. All state lives in the store;
//! the component itself is a stateless facade over a cloned [`Database`]
//! handle.

use caramelo_core::CarameloError;
use caramelo_core::types::{
    ConversationMessage, CustomerProfile, MessageRole, NewMessage, ProfilePatch, now_iso,
};
use caramelo_storage::{Database, queries};
use chrono::DateTime;
use tracing::{debug, warn};

/// Samples above this are treated as a new conversation, not a response.
const MAX_RESPONSE_SAMPLE_MS: i64 = 60 * 60 * 1000;

/// Silence longer than this starts a new conversation for counting.
const NEW_CONVERSATION_GAP_MS: i64 = 6 * 60 * 60 * 1000;

/// Per-conversation customer memory.
#[derive(Clone)]
pub struct CustomerMemory {
    db: Database,
}

impl CustomerMemory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The chat's profile, created with defaults when absent.
    ///
    /// Part of the agent-facing surface; the webhook ingestion path
    /// creates profiles lazily on its own.
    #[allow(dead_code)]
    pub async fn get_or_create(&self, chat_id: &str) -> Result<CustomerProfile, CarameloError> {
        queries::profiles::get_or_create(&self.db, chat_id).await
    }

    /// The chat's profile, or `None` for an unknown chat.
    pub async fn profile(&self, chat_id: &str) -> Result<Option<CustomerProfile>, CarameloError> {
        queries::profiles::fetch(&self.db, chat_id).await
    }

    /// Apply an explicit partial update to the profile.
    #[allow(dead_code)]
    pub async fn update(&self, chat_id: &str, patch: ProfilePatch) -> Result<(), CarameloError> {
        queries::profiles::update(&self.db, chat_id, patch).await
    }

    /// Record a response-time sample; returns the new rolling average.
    pub async fn record_response_time(
        &self,
        chat_id: &str,
        duration_ms: i64,
    ) -> Result<f64, CarameloError> {
        queries::profiles::record_response_time(&self.db, chat_id, duration_ms).await
    }

    /// Append a message to the chat's bounded history.
    pub async fn record_message(&self, message: NewMessage) -> Result<(), CarameloError> {
        queries::history::record_message(&self.db, message).await
    }

    /// The chat's retained history, oldest first.
    #[allow(dead_code)]
    pub async fn recent_messages(
        &self,
        chat_id: &str,
        limit: i64,
    ) -> Result<Vec<ConversationMessage>, CarameloError> {
        queries::history::recent_messages(&self.db, chat_id, limit).await
    }

    #[allow(dead_code)]
    pub async fn add_interest(&self, chat_id: &str, interest: &str) -> Result<(), CarameloError> {
        queries::profiles::add_interest(&self.db, chat_id, interest).await
    }

    #[allow(dead_code)]
    pub async fn add_objection(&self, chat_id: &str, objection: &str) -> Result<(), CarameloError> {
        queries::profiles::add_objection(&self.db, chat_id, objection).await
    }

    #[allow(dead_code)]
    pub async fn record_purchase(
        &self,
        chat_id: &str,
        service: &str,
        value: f64,
        pet_name: Option<String>,
    ) -> Result<(), CarameloError> {
        queries::profiles::record_purchase(&self.db, chat_id, service, value, pet_name).await
    }

    #[allow(dead_code)]
    pub async fn mark_abandoned(&self, chat_id: &str) -> Result<(), CarameloError> {
        queries::profiles::mark_abandoned(&self.db, chat_id).await
    }

    /// Consume one inbound or outbound chat message: lazy profile
    /// creation, response-time sampling against the previous
    /// `last_message_at`, bounded history append, and counter/temporal
    /// updates.
    pub async fn ingest_chat_message(
        &self,
        chat_id: &str,
        message_id: Option<String>,
        content: &str,
        from_me: bool,
    ) -> Result<(), CarameloError> {
        let now = now_iso();
        let previous = self.profile(chat_id).await?;

        let mut new_conversation = true;
        if let Some(ref profile) = previous {
            match elapsed_ms(&profile.last_message_at, &now) {
                Some(elapsed) => {
                    new_conversation = elapsed > NEW_CONVERSATION_GAP_MS;
                    if !from_me && elapsed <= MAX_RESPONSE_SAMPLE_MS {
                        let avg = self.record_response_time(chat_id, elapsed).await?;
                        debug!(chat_id, elapsed_ms = elapsed, avg_ms = avg, "response sampled");
                    }
                }
                None => {
                    warn!(
                        chat_id,
                        last_message_at = %profile.last_message_at,
                        "unparseable last_message_at, skipping response sample"
                    );
                }
            }
        }

        let role = if from_me {
            MessageRole::Assistant
        } else {
            MessageRole::User
        };
        self.record_message(NewMessage {
            chat_id: chat_id.to_string(),
            role,
            content: content.to_string(),
            sentiment: None,
            engagement_delta: None,
            message_id,
        })
        .await?;

        // Counters are incremented in SQL so concurrent ingests for the
        // same chat cannot lose an update to a stale read.
        queries::profiles::record_activity(&self.db, chat_id, &now, new_conversation).await
    }
}

/// Milliseconds between two canonical-format timestamps, `None` when
/// either side does not parse. Negative deltas clamp to zero.
fn elapsed_ms(earlier: &str, later: &str) -> Option<i64> {
    let earlier = DateTime::parse_from_rfc3339(earlier).ok()?;
    let later = DateTime::parse_from_rfc3339(later).ok()?;
    Some((later - earlier).num_milliseconds().max(0))
}
