// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion opportunity queries: append scored sales signals, surface
//! the strongest open ones, and close them out on conversion.

use rusqlite::params;

use caramelo_core::CarameloError;
use caramelo_core::types::{ConversionOpportunity, OpportunityRequest};

use crate::database::{Database, map_tr_err};
use crate::queries::profiles::ensure_profile;

/// How many open opportunities `active` surfaces per chat.
const ACTIVE_LIMIT: i64 = 3;

/// Append a scored opportunity for the chat. Duplicates are allowed;
/// each detection is its own signal.
pub async fn record(db: &Database, request: OpportunityRequest) -> Result<i64, CarameloError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            ensure_profile(&tx, &request.chat_id)?;
            tx.execute(
                "INSERT INTO conversion_opportunities
                     (chat_id, score, reason, suggested_action, urgency_level, close_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    request.chat_id,
                    request.score,
                    request.reason,
                    request.suggested_action,
                    request.urgency_level,
                    request.close_message,
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })
        .await
        .map_err(map_tr_err)
}

/// The chat's strongest open opportunities: unconverted only, ordered by
/// score then urgency descending, capped at three.
pub async fn active(
    db: &Database,
    chat_id: &str,
) -> Result<Vec<ConversionOpportunity>, CarameloError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, score, reason, suggested_action, urgency_level,
                        close_message, converted
                 FROM conversion_opportunities
                 WHERE chat_id = ?1 AND converted = 0
                 ORDER BY score DESC, urgency_level DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![chat_id, ACTIVE_LIMIT], |row| {
                    Ok(ConversionOpportunity {
                        id: row.get(0)?,
                        chat_id: row.get(1)?,
                        score: row.get(2)?,
                        reason: row.get(3)?,
                        suggested_action: row.get(4)?,
                        urgency_level: row.get(5)?,
                        close_message: row.get(6)?,
                        converted: row.get::<_, i64>(7)? != 0,
                    })
                })?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Close every open opportunity for the chat. Called when the customer
/// converts; returns the number of opportunities closed.
pub async fn mark_converted(db: &Database, chat_id: &str) -> Result<usize, CarameloError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let closed = conn.execute(
                "UPDATE conversion_opportunities SET converted = 1
                 WHERE chat_id = ?1 AND converted = 0",
                params![chat_id],
            )?;
            Ok(closed)
        })
        .await
        .map_err(map_tr_err)
}
