// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Customer profile queries: idempotent creation, explicit partial
//! updates, bounded response-time samples, interests, objections, and
//! the purchase ledger.

use rusqlite::{OptionalExtension, params};
use tracing::debug;

use caramelo_core::types::{
    ConversationStage, CustomerProfile, EngagementLevel, ProfilePatch, Purchase,
};
use caramelo_core::CarameloError;

use crate::database::{Database, map_tr_err};
use crate::queries::{MAX_RESPONSE_SAMPLES, parse_enum};

/// Create the profile row if absent. Safe to call at the top of any
/// transaction that references a chat; the insert is a no-op when the
/// row already exists.
pub(crate) fn ensure_profile(
    conn: &rusqlite::Connection,
    chat_id: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO customer_profiles (chat_id) VALUES (?1)
         ON CONFLICT (chat_id) DO NOTHING",
        params![chat_id],
    )?;
    Ok(())
}

/// Return the chat's profile, creating a defaulted row first when none
/// exists. Concurrent callers for the same chat observe a single row.
pub async fn get_or_create(db: &Database, chat_id: &str) -> Result<CustomerProfile, CarameloError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            ensure_profile(&tx, &chat_id)?;
            let profile = read_profile(&tx, &chat_id)?.ok_or_else(|| {
                rusqlite::Error::QueryReturnedNoRows
            })?;
            tx.commit()?;
            Ok(profile)
        })
        .await
        .map_err(map_tr_err)
}

/// Return the chat's composed profile, or `None` for an unknown chat.
pub async fn fetch(db: &Database, chat_id: &str) -> Result<Option<CustomerProfile>, CarameloError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| Ok(read_profile(conn, &chat_id)?))
        .await
        .map_err(map_tr_err)
}

/// Apply an explicit partial update. Absent fields are untouched; an
/// all-`None` patch performs no write at all.
pub async fn update(
    db: &Database,
    chat_id: &str,
    patch: ProfilePatch,
) -> Result<(), CarameloError> {
    if patch.is_empty() {
        debug!(chat_id, "empty profile patch, skipping write");
        return Ok(());
    }
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            ensure_profile(&tx, &chat_id)?;

            let mut sets: Vec<&'static str> = Vec::new();
            let mut values: Vec<rusqlite::types::Value> = Vec::new();
            let mut push = |set: &'static str, value: rusqlite::types::Value| {
                sets.push(set);
                values.push(value);
            };
            if let Some(v) = patch.display_name {
                push("display_name = ?", v.into());
            }
            if let Some(v) = patch.pet_name {
                push("pet_name = ?", v.into());
            }
            if let Some(v) = patch.pet_breed {
                push("pet_breed = ?", v.into());
            }
            if let Some(v) = patch.pet_size {
                push("pet_size = ?", v.into());
            }
            if let Some(v) = patch.pet_species {
                push("pet_species = ?", v.into());
            }
            if let Some(v) = patch.last_message_at {
                push("last_message_at = ?", v.into());
            }
            if let Some(v) = patch.last_follow_up_at {
                push("last_follow_up_at = ?", v.into());
            }
            if let Some(v) = patch.avg_response_time_ms {
                push("avg_response_time_ms = ?", v.into());
            }
            if let Some(v) = patch.engagement_score {
                push("engagement_score = ?", v.into());
            }
            if let Some(v) = patch.engagement_level {
                push("engagement_level = ?", v.to_string().into());
            }
            if let Some(v) = patch.conversation_stage {
                push("conversation_stage = ?", v.to_string().into());
            }
            if let Some(v) = patch.purchase_intent {
                push("purchase_intent = ?", v.into());
            }
            if let Some(v) = patch.last_sentiment {
                push("last_sentiment = ?", v.into());
            }
            if let Some(v) = patch.total_messages {
                push("total_messages = ?", v.into());
            }
            if let Some(v) = patch.total_conversations {
                push("total_conversations = ?", v.into());
            }
            if let Some(v) = patch.notes {
                push("notes = ?", v.into());
            }
            if let Some(v) = patch.preferences {
                push("preferences = ?", v.to_string().into());
            }

            values.push(chat_id.clone().into());
            let sql = format!(
                "UPDATE customer_profiles SET {} WHERE chat_id = ?",
                sets.join(", ")
            );
            tx.execute(&sql, rusqlite::params_from_iter(values))?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Advance the chat's activity counters for one consumed message:
/// bump `total_messages`, bump `total_conversations` when the message
/// opened a new conversation, and set `last_message_at`.
///
/// The increments happen in SQL inside one transaction, so concurrent
/// ingests for the same chat never lose a count to a stale read.
pub async fn record_activity(
    db: &Database,
    chat_id: &str,
    now: &str,
    new_conversation: bool,
) -> Result<(), CarameloError> {
    let chat_id = chat_id.to_string();
    let now = now.to_string();
    let conversation_bump: i64 = if new_conversation { 1 } else { 0 };
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            ensure_profile(&tx, &chat_id)?;
            tx.execute(
                "UPDATE customer_profiles
                 SET last_message_at = ?1,
                     total_messages = total_messages + 1,
                     total_conversations = total_conversations + ?2
                 WHERE chat_id = ?3",
                params![now, conversation_bump, chat_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a response-time sample, prune to the newest
/// [`MAX_RESPONSE_SAMPLES`], and recompute the rolling average over the
/// retained samples, all in one transaction. Returns the new average.
pub async fn record_response_time(
    db: &Database,
    chat_id: &str,
    duration_ms: i64,
) -> Result<f64, CarameloError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            ensure_profile(&tx, &chat_id)?;
            tx.execute(
                "INSERT INTO response_times (chat_id, duration_ms) VALUES (?1, ?2)",
                params![chat_id, duration_ms],
            )?;
            tx.execute(
                "DELETE FROM response_times
                 WHERE chat_id = ?1
                   AND id NOT IN (
                       SELECT id FROM response_times
                       WHERE chat_id = ?1
                       ORDER BY id DESC
                       LIMIT ?2
                   )",
                params![chat_id, MAX_RESPONSE_SAMPLES],
            )?;
            let avg: f64 = tx.query_row(
                "SELECT AVG(duration_ms) FROM response_times WHERE chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "UPDATE customer_profiles SET avg_response_time_ms = ?1 WHERE chat_id = ?2",
                params![avg, chat_id],
            )?;
            tx.commit()?;
            Ok(avg)
        })
        .await
        .map_err(map_tr_err)
}

/// Record an interest mention. Re-mentioning an existing interest is a
/// no-op; the original row and its timestamp stand.
pub async fn add_interest(
    db: &Database,
    chat_id: &str,
    interest: &str,
) -> Result<(), CarameloError> {
    let chat_id = chat_id.to_string();
    let interest = interest.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            ensure_profile(&tx, &chat_id)?;
            tx.execute(
                "INSERT OR IGNORE INTO customer_interests (chat_id, interest) VALUES (?1, ?2)",
                params![chat_id, interest],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record an objection. Objections are never deduplicated: raising the
/// same objection twice is a meaningful signal.
pub async fn add_objection(
    db: &Database,
    chat_id: &str,
    objection: &str,
) -> Result<(), CarameloError> {
    let chat_id = chat_id.to_string();
    let objection = objection.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            ensure_profile(&tx, &chat_id)?;
            tx.execute(
                "INSERT INTO customer_objections (chat_id, objection) VALUES (?1, ?2)",
                params![chat_id, objection],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Append to the purchase ledger. Funnel stage is the caller's concern.
pub async fn record_purchase(
    db: &Database,
    chat_id: &str,
    service: &str,
    value: f64,
    pet_name: Option<String>,
) -> Result<(), CarameloError> {
    let chat_id = chat_id.to_string();
    let service = service.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            ensure_profile(&tx, &chat_id)?;
            tx.execute(
                "INSERT INTO purchases (chat_id, service, value, pet_name) VALUES (?1, ?2, ?3, ?4)",
                params![chat_id, service, value, pet_name],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Move the chat to the `abandoned` stage.
pub async fn mark_abandoned(db: &Database, chat_id: &str) -> Result<(), CarameloError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            ensure_profile(&tx, &chat_id)?;
            tx.execute(
                "UPDATE customer_profiles SET conversation_stage = 'abandoned' WHERE chat_id = ?1",
                params![chat_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Compose the full profile from the base row and its sub-collections.
pub(crate) fn read_profile(
    conn: &rusqlite::Connection,
    chat_id: &str,
) -> Result<Option<CustomerProfile>, rusqlite::Error> {
    let base = conn
        .query_row(
            "SELECT chat_id, display_name, pet_name, pet_breed, pet_size, pet_species,
                    first_contact_at, last_message_at, last_follow_up_at,
                    avg_response_time_ms, engagement_score, engagement_level,
                    conversation_stage, purchase_intent, last_sentiment,
                    total_messages, total_conversations, notes, preferences
             FROM customer_profiles WHERE chat_id = ?1",
            params![chat_id],
            |row| {
                let level: String = row.get(11)?;
                let stage: String = row.get(12)?;
                let preferences: String = row.get(18)?;
                Ok(CustomerProfile {
                    chat_id: row.get(0)?,
                    display_name: row.get(1)?,
                    pet_name: row.get(2)?,
                    pet_breed: row.get(3)?,
                    pet_size: row.get(4)?,
                    pet_species: row.get(5)?,
                    first_contact_at: row.get(6)?,
                    last_message_at: row.get(7)?,
                    last_follow_up_at: row.get(8)?,
                    avg_response_time_ms: row.get(9)?,
                    response_times_ms: Vec::new(),
                    engagement_score: row.get(10)?,
                    engagement_level: parse_enum::<EngagementLevel>(11, level)?,
                    conversation_stage: parse_enum::<ConversationStage>(12, stage)?,
                    purchase_intent: row.get(13)?,
                    last_sentiment: row.get(14)?,
                    total_messages: row.get(15)?,
                    total_conversations: row.get(16)?,
                    notes: row.get(17)?,
                    preferences: serde_json::from_str(&preferences).unwrap_or_else(|_| {
                        serde_json::Value::Object(serde_json::Map::new())
                    }),
                    interests: Vec::new(),
                    objections: Vec::new(),
                    purchases: Vec::new(),
                })
            },
        )
        .optional()?;

    let Some(mut profile) = base else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT duration_ms FROM response_times WHERE chat_id = ?1 ORDER BY id DESC",
    )?;
    profile.response_times_ms = stmt
        .query_map(params![chat_id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT interest FROM customer_interests WHERE chat_id = ?1 ORDER BY id DESC",
    )?;
    profile.interests = stmt
        .query_map(params![chat_id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT objection FROM customer_objections
         WHERE chat_id = ?1 AND resolved = 0 ORDER BY id DESC",
    )?;
    profile.objections = stmt
        .query_map(params![chat_id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT service, value, pet_name, purchased_at FROM purchases
         WHERE chat_id = ?1 ORDER BY id DESC",
    )?;
    profile.purchases = stmt
        .query_map(params![chat_id], |row| {
            Ok(Purchase {
                service: row.get(0)?,
                value: row.get(1)?,
                pet_name: row.get(2)?,
                purchased_at: row.get(3)?,
            })
        })?
        .collect::<Result<_, _>>()?;

    Ok(Some(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let (_dir, db) = test_db().await;

        let first = get_or_create(&db, "5511999990000@c.us").await.unwrap();
        assert_eq!(first.conversation_stage, ConversationStage::New);
        assert_eq!(first.engagement_level, EngagementLevel::Low);
        assert_eq!(first.total_messages, 0);

        let second = get_or_create(&db, "5511999990000@c.us").await.unwrap();
        assert_eq!(second.first_contact_at, first.first_contact_at);

        let count: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                Ok(conn.query_row("SELECT COUNT(*) FROM customer_profiles", [], |r| r.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn concurrent_get_or_create_yields_single_row() {
        let (_dir, db) = test_db().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                get_or_create(&db, "racer@c.us").await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let count: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM customer_profiles WHERE chat_id = 'racer@c.us'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn patch_updates_only_present_fields() {
        let (_dir, db) = test_db().await;
        get_or_create(&db, "c1").await.unwrap();

        let patch = ProfilePatch {
            pet_name: Some("Thor".to_string()),
            conversation_stage: Some(ConversationStage::Negotiating),
            purchase_intent: Some(0.7),
            ..Default::default()
        };
        update(&db, "c1", patch).await.unwrap();

        let profile = fetch(&db, "c1").await.unwrap().unwrap();
        assert_eq!(profile.pet_name.as_deref(), Some("Thor"));
        assert_eq!(profile.conversation_stage, ConversationStage::Negotiating);
        assert_eq!(profile.purchase_intent, 0.7);
        assert!(profile.display_name.is_none());
        assert_eq!(profile.engagement_level, EngagementLevel::Low);
    }

    #[tokio::test]
    async fn empty_patch_writes_nothing() {
        let (_dir, db) = test_db().await;
        get_or_create(&db, "c1").await.unwrap();
        update(&db, "c1", ProfilePatch::default()).await.unwrap();
        let profile = fetch(&db, "c1").await.unwrap().unwrap();
        assert_eq!(profile.conversation_stage, ConversationStage::New);
    }

    #[tokio::test]
    async fn preferences_are_replaced_wholesale() {
        let (_dir, db) = test_db().await;
        get_or_create(&db, "c1").await.unwrap();

        let patch = ProfilePatch {
            preferences: Some(serde_json::json!({"delivery": "morning", "brand": "premium"})),
            ..Default::default()
        };
        update(&db, "c1", patch).await.unwrap();

        let patch = ProfilePatch {
            preferences: Some(serde_json::json!({"brand": "budget"})),
            ..Default::default()
        };
        update(&db, "c1", patch).await.unwrap();

        let profile = fetch(&db, "c1").await.unwrap().unwrap();
        assert_eq!(profile.preferences, serde_json::json!({"brand": "budget"}));
    }

    #[tokio::test]
    async fn response_samples_prune_to_newest_ten() {
        let (_dir, db) = test_db().await;

        for i in 1..=15 {
            record_response_time(&db, "c1", i * 1000).await.unwrap();
        }

        let profile = fetch(&db, "c1").await.unwrap().unwrap();
        assert_eq!(profile.response_times_ms.len(), 10);
        // Newest first: samples 15000 down to 6000.
        assert_eq!(profile.response_times_ms[0], 15000);
        assert_eq!(profile.response_times_ms[9], 6000);
        // Average over the retained window only.
        let expected: f64 = (6..=15).map(|i| (i * 1000) as f64).sum::<f64>() / 10.0;
        assert_eq!(profile.avg_response_time_ms, expected);
    }

    #[tokio::test]
    async fn interests_deduplicate_objections_do_not() {
        let (_dir, db) = test_db().await;

        add_interest(&db, "c1", "racao premium").await.unwrap();
        add_interest(&db, "c1", "racao premium").await.unwrap();
        add_interest(&db, "c1", "banho e tosa").await.unwrap();

        add_objection(&db, "c1", "preco alto").await.unwrap();
        add_objection(&db, "c1", "preco alto").await.unwrap();

        let profile = fetch(&db, "c1").await.unwrap().unwrap();
        assert_eq!(profile.interests, vec!["banho e tosa", "racao premium"]);
        assert_eq!(profile.objections.len(), 2);
    }

    #[tokio::test]
    async fn purchases_append_without_touching_stage() {
        let (_dir, db) = test_db().await;

        record_purchase(&db, "c1", "banho e tosa", 80.0, Some("Thor".to_string()))
            .await
            .unwrap();
        record_purchase(&db, "c1", "racao premium", 150.0, None)
            .await
            .unwrap();

        let profile = fetch(&db, "c1").await.unwrap().unwrap();
        assert_eq!(profile.conversation_stage, ConversationStage::New);
        assert_eq!(profile.purchases.len(), 2);
        assert_eq!(profile.purchases[0].service, "racao premium");
        assert_eq!(profile.purchases[1].value, 80.0);
    }

    #[tokio::test]
    async fn mark_abandoned_sets_stage() {
        let (_dir, db) = test_db().await;
        get_or_create(&db, "c1").await.unwrap();
        mark_abandoned(&db, "c1").await.unwrap();
        let profile = fetch(&db, "c1").await.unwrap().unwrap();
        assert_eq!(profile.conversation_stage, ConversationStage::Abandoned);
    }

    #[tokio::test]
    async fn fetch_unknown_chat_is_none() {
        let (_dir, db) = test_db().await;
        assert!(fetch(&db, "nobody").await.unwrap().is_none());
    }
}
