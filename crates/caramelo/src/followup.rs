// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Follow-Up Scheduler.
//!
//! Persists future-dated re-engagement intents and drives the two
//! dispatch loops: the follow-up poll and the appointment-reminder
//! sweep. Each due item is sent through the gateway and marked
//! executed/sent immediately, so a crash between items never replays
//! the ones already delivered.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use caramelo_core::CarameloError;
use caramelo_core::traits::ChatGateway;
use caramelo_core::types::{
    AppointmentReminder, FollowUpRequest, ImmediateFollowUp, ProfilePatch, ReminderRequest,
    ScheduledFollowUp, now_iso,
};
use caramelo_storage::{Database, queries};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct FollowUpScheduler {
    db: Database,
    gateway: Arc<dyn ChatGateway>,
    max_unanswered: i64,
}

impl FollowUpScheduler {
    pub fn new(db: Database, gateway: Arc<dyn ChatGateway>, max_unanswered: i64) -> Self {
        Self {
            db,
            gateway,
            max_unanswered,
        }
    }

    /// Persist a follow-up intent.
    ///
    /// Part of the agent-facing surface; the dispatch loops only consume
    /// what has been scheduled.
    #[allow(dead_code)]
    pub async fn schedule(&self, request: FollowUpRequest) -> Result<i64, CarameloError> {
        let chat_id = request.chat_id.clone();
        let scheduled_for = request.scheduled_for.clone();
        let id = queries::followups::schedule(&self.db, request).await?;
        debug!(chat_id = %chat_id, scheduled_for = %scheduled_for, "follow-up scheduled");
        Ok(id)
    }

    /// Pending follow-ups due at `now`, oldest first.
    pub async fn due_items(&self, now: &str) -> Result<Vec<ScheduledFollowUp>, CarameloError> {
        queries::followups::due_items(&self.db, now).await
    }

    /// Collapse the chat's whole pending backlog as executed.
    pub async fn mark_executed(&self, chat_id: &str) -> Result<usize, CarameloError> {
        queries::followups::mark_executed(&self.db, chat_id).await
    }

    /// Audit a follow-up sent outside the scheduled path.
    #[allow(dead_code)]
    pub async fn log_immediate(
        &self,
        chat_id: &str,
        level: i64,
        message: &str,
        attempt: i64,
    ) -> Result<(), CarameloError> {
        queries::followups::log_immediate(&self.db, chat_id, level, message, attempt).await
    }

    /// The chat's immediate-followup audit entries, newest first.
    #[allow(dead_code)]
    pub async fn immediate_history(
        &self,
        chat_id: &str,
        limit: i64,
    ) -> Result<Vec<ImmediateFollowUp>, CarameloError> {
        queries::followups::immediate_history(&self.db, chat_id, limit).await
    }

    /// Persist an appointment reminder.
    #[allow(dead_code)]
    pub async fn save_reminder(
        &self,
        request: ReminderRequest,
    ) -> Result<Option<i64>, CarameloError> {
        queries::reminders::save(&self.db, request).await
    }

    /// Drop unsent reminders for a cancelled appointment.
    #[allow(dead_code)]
    pub async fn cancel_reminders(
        &self,
        chat_id: &str,
        appointment_time: &str,
    ) -> Result<usize, CarameloError> {
        queries::reminders::cancel_for_appointment(&self.db, chat_id, appointment_time).await
    }

    /// One follow-up tick: send each due item and mark its chat executed
    /// immediately. A gateway failure leaves the item pending for the
    /// next tick. Returns the number delivered.
    ///
    /// Marking collapses the chat's whole pending backlog, so a chat with
    /// several due rows in the same snapshot gets exactly one message.
    pub async fn dispatch_due(&self) -> Result<usize, CarameloError> {
        let now = now_iso();
        let due = self.due_items(&now).await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!(count = due.len(), "follow-ups due");

        let mut delivered = 0;
        let mut collapsed_chats: HashSet<String> = HashSet::new();
        for item in due {
            if collapsed_chats.contains(&item.chat_id) {
                continue;
            }
            if let Err(e) = self.gateway.send_message(&item.chat_id, &item.message).await {
                warn!(
                    chat_id = %item.chat_id,
                    followup_id = item.id,
                    error = %e,
                    "follow-up send failed, leaving pending"
                );
                continue;
            }

            // Mark before moving on so a crash cannot resend this chat.
            self.mark_executed(&item.chat_id).await?;
            collapsed_chats.insert(item.chat_id.clone());
            queries::profiles::update(
                &self.db,
                &item.chat_id,
                ProfilePatch {
                    last_follow_up_at: Some(now_iso()),
                    ..Default::default()
                },
            )
            .await?;
            delivered += 1;

            if item.attempt >= self.max_unanswered {
                info!(
                    chat_id = %item.chat_id,
                    attempt = item.attempt,
                    "unanswered follow-up limit reached, marking abandoned"
                );
                queries::profiles::mark_abandoned(&self.db, &item.chat_id).await?;
            }
        }
        Ok(delivered)
    }

    /// One reminder sweep: send each due appointment reminder and mark
    /// it sent immediately. Returns the number delivered.
    pub async fn sweep_reminders(&self) -> Result<usize, CarameloError> {
        let now = now_iso();
        let due = queries::reminders::due(&self.db, &now).await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!(count = due.len(), "appointment reminders due");

        let mut delivered = 0;
        for reminder in due {
            let text = render_reminder(&reminder);
            if let Err(e) = self.gateway.send_message(&reminder.chat_id, &text).await {
                warn!(
                    chat_id = %reminder.chat_id,
                    reminder_id = reminder.id,
                    error = %e,
                    "reminder send failed, leaving unsent"
                );
                continue;
            }
            queries::reminders::mark_sent(&self.db, reminder.id).await?;
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Follow-up poll loop. Runs until the token is cancelled.
    pub async fn run_followup_loop(self, poll_interval: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(poll_interval);
        // Skip the first immediate tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.dispatch_due().await {
                        Ok(0) => {}
                        Ok(sent) => info!(sent, "follow-ups dispatched"),
                        Err(e) => warn!(error = %e, "follow-up dispatch failed (non-fatal)"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("follow-up loop shutting down");
                    break;
                }
            }
        }
    }

    /// Reminder sweep loop. Runs until the token is cancelled.
    pub async fn run_reminder_loop(self, poll_interval: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(poll_interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep_reminders().await {
                        Ok(0) => {}
                        Ok(sent) => info!(sent, "appointment reminders sent"),
                        Err(e) => warn!(error = %e, "reminder sweep failed (non-fatal)"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("reminder loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Customer-facing reminder text (Portuguese, like the rest of the shop's
/// messaging).
fn render_reminder(reminder: &AppointmentReminder) -> String {
    let greeting = match &reminder.owner_name {
        Some(owner) => format!("Oi, {owner}!"),
        None => "Oi!".to_string(),
    };
    let subject = match &reminder.pet_name {
        Some(pet) => format!("{} do {pet}", reminder.service),
        None => reminder.service.clone(),
    };
    format!(
        "{greeting} Passando para lembrar: {subject} agendado para {}. Ate ja!",
        reminder.appointment_time
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use caramelo_core::types::{ConversationStage, FollowUpContext};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Gateway stub capturing sent messages; optionally fails every send.
    struct MockGateway {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl MockGateway {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatGateway for MockGateway {
        async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), CarameloError> {
            if self.fail {
                return Err(CarameloError::Gateway {
                    message: "mock send failure".to_string(),
                    source: None,
                });
            }
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

    async fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        (dir, db)
    }

    fn past_followup(chat_id: &str, attempt: i64) -> FollowUpRequest {
        FollowUpRequest {
            chat_id: chat_id.to_string(),
            scheduled_for: "2020-01-01T00:00:00.000Z".to_string(),
            reason: "no reply".to_string(),
            message: "oi, ainda pensando na racao?".to_string(),
            attempt,
            context: FollowUpContext::default(),
        }
    }

    #[tokio::test]
    async fn dispatch_sends_and_collapses_pending() {
        let (_dir, db) = test_db().await;
        let gateway = MockGateway::new();
        let scheduler = FollowUpScheduler::new(db.clone(), gateway.clone(), 5);

        scheduler.schedule(past_followup("c1", 1)).await.unwrap();
        scheduler.schedule(past_followup("c1", 2)).await.unwrap();

        let delivered = scheduler.dispatch_due().await.unwrap();
        // Both were due, but the first delivery collapses the backlog.
        assert_eq!(delivered, 1);
        assert_eq!(gateway.sent().len(), 1);
        assert!(scheduler.due_items(&now_iso()).await.unwrap().is_empty());

        let profile = queries::profiles::fetch(&db, "c1").await.unwrap().unwrap();
        assert!(profile.last_follow_up_at.is_some());
    }

    #[tokio::test]
    async fn dispatch_collapses_per_chat_not_globally() {
        let (_dir, db) = test_db().await;
        let gateway = MockGateway::new();
        let scheduler = FollowUpScheduler::new(db, gateway.clone(), 5);

        scheduler.schedule(past_followup("c1", 1)).await.unwrap();
        scheduler.schedule(past_followup("c1", 2)).await.unwrap();
        scheduler.schedule(past_followup("c2", 1)).await.unwrap();

        let delivered = scheduler.dispatch_due().await.unwrap();
        assert_eq!(delivered, 2);

        let sent = gateway.sent();
        let mut chats: Vec<&str> = sent.iter().map(|(chat, _)| chat.as_str()).collect();
        chats.sort_unstable();
        assert_eq!(chats, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn failed_send_leaves_item_pending() {
        let (_dir, db) = test_db().await;
        let scheduler = FollowUpScheduler::new(db, MockGateway::failing(), 5);

        scheduler.schedule(past_followup("c1", 1)).await.unwrap();

        let delivered = scheduler.dispatch_due().await.unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(scheduler.due_items(&now_iso()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unanswered_limit_marks_abandoned() {
        let (_dir, db) = test_db().await;
        let scheduler = FollowUpScheduler::new(db.clone(), MockGateway::new(), 3);

        scheduler.schedule(past_followup("c1", 3)).await.unwrap();
        scheduler.dispatch_due().await.unwrap();

        let profile = queries::profiles::fetch(&db, "c1").await.unwrap().unwrap();
        assert_eq!(profile.conversation_stage, ConversationStage::Abandoned);
    }

    #[tokio::test]
    async fn reminder_sweep_sends_and_marks() {
        let (_dir, db) = test_db().await;
        let gateway = MockGateway::new();
        let scheduler = FollowUpScheduler::new(db, gateway.clone(), 5);

        scheduler
            .save_reminder(ReminderRequest {
                chat_id: "c1".to_string(),
                service: "banho e tosa".to_string(),
                appointment_time: "2020-01-02T14:00:00Z".to_string(),
                reminder_time: "2020-01-02T13:00:00.000Z".to_string(),
                lead_minutes: 60,
                pet_name: Some("Thor".to_string()),
                owner_name: Some("Ana".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(scheduler.sweep_reminders().await.unwrap(), 1);
        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Ana"));
        assert!(sent[0].1.contains("banho e tosa do Thor"));

        // Second sweep finds nothing.
        assert_eq!(scheduler.sweep_reminders().await.unwrap(), 0);
    }
}
