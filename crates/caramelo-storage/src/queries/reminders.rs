// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Appointment reminder queries, capability-gated on the optional
//! `appointment_reminders` table. Reminders are matched to appointments
//! by (chat id, appointment time) equality at whole-second precision.

use rusqlite::params;
use tracing::warn;

use caramelo_core::CarameloError;
use caramelo_core::types::{AppointmentReminder, ReminderRequest, now_iso};

use crate::database::{Database, map_tr_err};

/// Persist a reminder. Returns its id, or `None` when the optional table
/// is unavailable.
pub async fn save(db: &Database, request: ReminderRequest) -> Result<Option<i64>, CarameloError> {
    if !db.capabilities().appointment_reminders {
        warn!(
            chat_id = %request.chat_id,
            "appointment_reminders table unavailable, reminder dropped"
        );
        return Ok(None);
    }
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO appointment_reminders
                     (chat_id, service, appointment_time, reminder_time,
                      lead_minutes, pet_name, owner_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    request.chat_id,
                    request.service,
                    request.appointment_time,
                    request.reminder_time,
                    request.lead_minutes,
                    request.pet_name,
                    request.owner_name,
                ],
            )?;
            Ok(Some(conn.last_insert_rowid()))
        })
        .await
        .map_err(map_tr_err)
}

/// Unsent reminders whose reminder time has passed, soonest first. Empty
/// when the optional table is unavailable.
pub async fn due(db: &Database, now: &str) -> Result<Vec<AppointmentReminder>, CarameloError> {
    if !db.capabilities().appointment_reminders {
        return Ok(Vec::new());
    }
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, service, appointment_time, reminder_time,
                        lead_minutes, pet_name, owner_name, sent, sent_at
                 FROM appointment_reminders
                 WHERE sent = 0 AND reminder_time <= ?1
                 ORDER BY reminder_time ASC",
            )?;
            let rows = stmt
                .query_map(params![now], map_reminder_row)?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark one reminder as sent. Idempotent against double-delivery: a
/// reminder already marked stays marked with its original timestamp.
pub async fn mark_sent(db: &Database, id: i64) -> Result<(), CarameloError> {
    if !db.capabilities().appointment_reminders {
        return Ok(());
    }
    let sent_at = now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE appointment_reminders SET sent = 1, sent_at = ?1
                 WHERE id = ?2 AND sent = 0",
                params![sent_at, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete unsent reminders matching the appointment. Returns the number
/// removed; zero when the optional table is unavailable.
pub async fn cancel_for_appointment(
    db: &Database,
    chat_id: &str,
    appointment_time: &str,
) -> Result<usize, CarameloError> {
    if !db.capabilities().appointment_reminders {
        warn!(chat_id, "appointment_reminders table unavailable, nothing to cancel");
        return Ok(0);
    }
    let chat_id = chat_id.to_string();
    let appointment_time = appointment_time.to_string();
    db.connection()
        .call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM appointment_reminders
                 WHERE chat_id = ?1 AND appointment_time = ?2 AND sent = 0",
                params![chat_id, appointment_time],
            )?;
            Ok(removed)
        })
        .await
        .map_err(map_tr_err)
}

fn map_reminder_row(row: &rusqlite::Row<'_>) -> Result<AppointmentReminder, rusqlite::Error> {
    Ok(AppointmentReminder {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        service: row.get(2)?,
        appointment_time: row.get(3)?,
        reminder_time: row.get(4)?,
        lead_minutes: row.get(5)?,
        pet_name: row.get(6)?,
        owner_name: row.get(7)?,
        sent: row.get::<_, i64>(8)? != 0,
        sent_at: row.get(9)?,
    })
}
