// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled follow-up queries: persist re-engagement intents, surface
//! due items for the dispatch loop, and collapse pending items once a
//! chat has been followed up.
//!
//! The immediate-followup audit log is capability-gated: when its table
//! is missing the operations degrade to no-ops with a warning.

use rusqlite::params;
use tracing::warn;

use caramelo_core::CarameloError;
use caramelo_core::types::{
    ConversationStage, FollowUpContext, FollowUpRequest, ImmediateFollowUp, ScheduledFollowUp,
    now_iso,
};

use crate::database::{Database, map_tr_err};
use crate::queries::parse_enum;

/// Persist a future-dated follow-up intent.
pub async fn schedule(db: &Database, request: FollowUpRequest) -> Result<i64, CarameloError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO scheduled_followups
                     (chat_id, scheduled_for, reason, message, attempt, last_topic, last_stage)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    request.chat_id,
                    request.scheduled_for,
                    request.reason,
                    request.message,
                    request.attempt,
                    request.context.last_topic,
                    request.context.last_stage.to_string(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Pending follow-ups whose scheduled time has passed, oldest first.
pub async fn due_items(
    db: &Database,
    now: &str,
) -> Result<Vec<ScheduledFollowUp>, CarameloError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, scheduled_for, reason, message, attempt,
                        last_topic, last_stage, executed, executed_at
                 FROM scheduled_followups
                 WHERE executed = 0 AND scheduled_for <= ?1
                 ORDER BY scheduled_for ASC",
            )?;
            let rows = stmt
                .query_map(params![now], map_followup_row)?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Pending (not yet executed) follow-ups for one chat, soonest first.
pub async fn pending_for(
    db: &Database,
    chat_id: &str,
) -> Result<Vec<ScheduledFollowUp>, CarameloError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, scheduled_for, reason, message, attempt,
                        last_topic, last_stage, executed, executed_at
                 FROM scheduled_followups
                 WHERE chat_id = ?1 AND executed = 0
                 ORDER BY scheduled_for ASC",
            )?;
            let rows = stmt
                .query_map(params![chat_id], map_followup_row)?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark every pending follow-up for the chat as executed.
///
/// Sending one follow-up satisfies the chat's whole pending backlog; the
/// rows are retained as an audit trail. Returns the number collapsed.
pub async fn mark_executed(db: &Database, chat_id: &str) -> Result<usize, CarameloError> {
    let chat_id = chat_id.to_string();
    let executed_at = now_iso();
    db.connection()
        .call(move |conn| {
            let collapsed = conn.execute(
                "UPDATE scheduled_followups SET executed = 1, executed_at = ?1
                 WHERE chat_id = ?2 AND executed = 0",
                params![executed_at, chat_id],
            )?;
            Ok(collapsed)
        })
        .await
        .map_err(map_tr_err)
}

/// Append to the immediate-followup audit log. No-op with a warning when
/// the optional table is unavailable.
pub async fn log_immediate(
    db: &Database,
    chat_id: &str,
    level: i64,
    message: &str,
    attempt: i64,
) -> Result<(), CarameloError> {
    if !db.capabilities().immediate_followups {
        warn!(chat_id, "immediate_followups table unavailable, audit entry dropped");
        return Ok(());
    }
    let chat_id = chat_id.to_string();
    let message = message.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO immediate_followups (chat_id, level, message, attempt)
                 VALUES (?1, ?2, ?3, ?4)",
                params![chat_id, level, message, attempt],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The chat's immediate-followup audit entries, newest first. Empty when
/// the optional table is unavailable.
pub async fn immediate_history(
    db: &Database,
    chat_id: &str,
    limit: i64,
) -> Result<Vec<ImmediateFollowUp>, CarameloError> {
    if !db.capabilities().immediate_followups {
        warn!(chat_id, "immediate_followups table unavailable, returning empty history");
        return Ok(Vec::new());
    }
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, level, message, attempt, executed_at
                 FROM immediate_followups
                 WHERE chat_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![chat_id, limit], |row| {
                    Ok(ImmediateFollowUp {
                        id: row.get(0)?,
                        chat_id: row.get(1)?,
                        level: row.get(2)?,
                        message: row.get(3)?,
                        attempt: row.get(4)?,
                        executed_at: row.get(5)?,
                    })
                })?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

fn map_followup_row(row: &rusqlite::Row<'_>) -> Result<ScheduledFollowUp, rusqlite::Error> {
    let stage: String = row.get(7)?;
    Ok(ScheduledFollowUp {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        scheduled_for: row.get(2)?,
        reason: row.get(3)?,
        message: row.get(4)?,
        attempt: row.get(5)?,
        context: FollowUpContext {
            last_topic: row.get(6)?,
            last_stage: parse_enum::<ConversationStage>(7, stage)?,
        },
        executed: row.get::<_, i64>(8)? != 0,
        executed_at: row.get(9)?,
    })
}
