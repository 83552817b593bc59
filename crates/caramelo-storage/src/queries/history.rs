// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded conversation history: append with insert-then-prune so the
//! table never holds more than [`MAX_HISTORY_MESSAGES`] rows per chat.

use rusqlite::params;

use caramelo_core::CarameloError;
use caramelo_core::types::{ConversationMessage, MessageRole, NewMessage};

use crate::database::{Database, map_tr_err};
use crate::queries::{MAX_HISTORY_MESSAGES, parse_enum, profiles::ensure_profile};

/// Append a message and prune the chat's history to the newest
/// [`MAX_HISTORY_MESSAGES`] rows, in one transaction.
pub async fn record_message(db: &Database, message: NewMessage) -> Result<(), CarameloError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            ensure_profile(&tx, &message.chat_id)?;
            tx.execute(
                "INSERT INTO conversation_history
                     (chat_id, role, content, sentiment, engagement_delta, message_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.chat_id,
                    message.role.to_string(),
                    message.content,
                    message.sentiment,
                    message.engagement_delta,
                    message.message_id,
                ],
            )?;
            tx.execute(
                "DELETE FROM conversation_history
                 WHERE chat_id = ?1
                   AND id NOT IN (
                       SELECT id FROM conversation_history
                       WHERE chat_id = ?1
                       ORDER BY id DESC
                       LIMIT ?2
                   )",
                params![message.chat_id, MAX_HISTORY_MESSAGES],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The chat's retained history in chronological order, capped at
/// `limit` newest messages.
pub async fn recent_messages(
    db: &Database,
    chat_id: &str,
    limit: i64,
) -> Result<Vec<ConversationMessage>, CarameloError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, role, content, sentiment, engagement_delta,
                        message_id, created_at
                 FROM conversation_history
                 WHERE chat_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )?;
            let mut messages: Vec<ConversationMessage> = stmt
                .query_map(params![chat_id, limit], |row| {
                    let role: String = row.get(2)?;
                    Ok(ConversationMessage {
                        id: row.get(0)?,
                        chat_id: row.get(1)?,
                        role: parse_enum::<MessageRole>(2, role)?,
                        content: row.get(3)?,
                        sentiment: row.get(4)?,
                        engagement_delta: row.get(5)?,
                        message_id: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<Result<_, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}
