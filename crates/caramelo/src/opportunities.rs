// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion Opportunity Tracker.
//!
//! Records scored sales signals against a chat and surfaces the
//! strongest open ones for the agent to act on.

use caramelo_core::CarameloError;
use caramelo_core::types::{ConversionOpportunity, OpportunityRequest};
use caramelo_storage::{Database, queries};
use tracing::info;

#[derive(Clone)]
pub struct OpportunityTracker {
    db: Database,
}

impl OpportunityTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a scored opportunity.
    ///
    /// Part of the agent-facing surface; this process only closes
    /// opportunities when payments confirm.
    #[allow(dead_code)]
    pub async fn record(&self, request: OpportunityRequest) -> Result<i64, CarameloError> {
        let chat_id = request.chat_id.clone();
        let score = request.score;
        let id = queries::opportunities::record(&self.db, request).await?;
        info!(chat_id = %chat_id, score, "conversion opportunity recorded");
        Ok(id)
    }

    /// The chat's strongest open opportunities (top three by score, then
    /// urgency).
    #[allow(dead_code)]
    pub async fn active(&self, chat_id: &str) -> Result<Vec<ConversionOpportunity>, CarameloError> {
        queries::opportunities::active(&self.db, chat_id).await
    }

    /// Close every open opportunity for a chat that converted.
    pub async fn mark_converted(&self, chat_id: &str) -> Result<usize, CarameloError> {
        queries::opportunities::mark_converted(&self.db, chat_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn record_then_active_round_trips() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        let tracker = OpportunityTracker::new(db);

        tracker
            .record(OpportunityRequest {
                chat_id: "c1".to_string(),
                score: 0.85,
                reason: "asked for pix key".to_string(),
                suggested_action: "send payment link".to_string(),
                urgency_level: 4,
                close_message: Some("posso gerar o pix?".to_string()),
            })
            .await
            .unwrap();

        let active = tracker.active("c1").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].urgency_level, 4);

        tracker.mark_converted("c1").await.unwrap();
        assert!(tracker.active("c1").await.unwrap().is_empty());
    }
}
