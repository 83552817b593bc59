// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment ledger queries, capability-gated on the optional `payments`
//! table and its `payment_analytics` view.
//!
//! The ledger is keyed by the provider-assigned payment id. The store
//! does not enforce status monotonicity: leaving a settled status is
//! logged and accepted, and `confirmed_at` always reflects the current
//! status (set iff `confirmed`).

use rusqlite::{OptionalExtension, params};
use tracing::warn;

use caramelo_core::CarameloError;
use caramelo_core::types::{
    NewPayment, Payment, PaymentAnalytics, PaymentAnalyticsRollup, PaymentStatus, now_iso,
};

use crate::database::{Database, map_tr_err};
use crate::queries::{parse_enum, profiles::ensure_profile};

/// Record a payment intent. `original_amount` defaults to `amount` and
/// `discount_amount` to zero. Returns `None` when the ledger table is
/// unavailable.
pub async fn record(db: &Database, payment: NewPayment) -> Result<Option<Payment>, CarameloError> {
    if !db.capabilities().payments {
        warn!(
            chat_id = %payment.chat_id,
            payment_id = %payment.payment_id,
            "payments table unavailable, payment not recorded"
        );
        return Ok(None);
    }
    let confirmed_at = match payment.status {
        PaymentStatus::Confirmed => Some(now_iso()),
        _ => None,
    };
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            ensure_profile(&tx, &payment.chat_id)?;
            tx.execute(
                "INSERT INTO payments
                     (chat_id, payment_id, provider, amount, original_amount,
                      discount_amount, status, method, description, payment_url, confirmed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    payment.chat_id,
                    payment.payment_id,
                    payment.provider,
                    payment.amount,
                    payment.original_amount.unwrap_or(payment.amount),
                    payment.discount_amount.unwrap_or(0.0),
                    payment.status.to_string(),
                    payment.method,
                    payment.description,
                    payment.payment_url,
                    confirmed_at,
                ],
            )?;
            let stored = read_payment(&tx, &payment.payment_id)?;
            tx.commit()?;
            Ok(stored)
        })
        .await
        .map_err(map_tr_err)
}

/// Move a payment to a new status by its provider id, keeping
/// `confirmed_at` consistent with the status. Returns the updated row,
/// or `None` when the id is unknown or the ledger is unavailable.
pub async fn update_status(
    db: &Database,
    payment_id: &str,
    status: PaymentStatus,
) -> Result<Option<Payment>, CarameloError> {
    if !db.capabilities().payments {
        warn!(payment_id, "payments table unavailable, status update dropped");
        return Ok(None);
    }
    let payment_id = payment_id.to_string();
    let confirmed_at = match status {
        PaymentStatus::Confirmed => Some(now_iso()),
        _ => None,
    };
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(current) = read_payment(&tx, &payment_id)? else {
                return Ok(None);
            };
            if matches!(
                current.status,
                PaymentStatus::Confirmed | PaymentStatus::Failed | PaymentStatus::Cancelled
            ) && current.status != status
            {
                warn!(
                    payment_id = %payment_id,
                    from = %current.status,
                    to = %status,
                    "payment leaving a settled status"
                );
            }
            tx.execute(
                "UPDATE payments SET status = ?1, confirmed_at = ?2 WHERE payment_id = ?3",
                params![status.to_string(), confirmed_at, payment_id],
            )?;
            let updated = read_payment(&tx, &payment_id)?;
            tx.commit()?;
            Ok(updated)
        })
        .await
        .map_err(map_tr_err)
}

/// Look up one payment by its provider id.
pub async fn find_by_id(
    db: &Database,
    payment_id: &str,
) -> Result<Option<Payment>, CarameloError> {
    if !db.capabilities().payments {
        return Ok(None);
    }
    let payment_id = payment_id.to_string();
    db.connection()
        .call(move |conn| Ok(read_payment(conn, &payment_id)?))
        .await
        .map_err(map_tr_err)
}

/// The customer's payments, newest first.
pub async fn list_by_customer(
    db: &Database,
    chat_id: &str,
) -> Result<Vec<Payment>, CarameloError> {
    if !db.capabilities().payments {
        return Ok(Vec::new());
    }
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{PAYMENT_COLUMNS} WHERE chat_id = ?1 ORDER BY id DESC"
            ))?;
            let rows = stmt
                .query_map(params![chat_id], map_payment_row)?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// All payments still awaiting settlement, oldest first.
pub async fn list_pending(db: &Database) -> Result<Vec<Payment>, CarameloError> {
    if !db.capabilities().payments {
        return Ok(Vec::new());
    }
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{PAYMENT_COLUMNS} WHERE status = 'pending' ORDER BY id ASC"
            ))?;
            let rows = stmt
                .query_map([], map_payment_row)?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// One customer's rollup from the analytics view. `None` when the
/// customer has no payments or the view is unavailable.
pub async fn analytics(
    db: &Database,
    chat_id: &str,
) -> Result<Option<PaymentAnalytics>, CarameloError> {
    if !db.capabilities().payments {
        return Ok(None);
    }
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let row = conn
                .query_row(
                    "SELECT chat_id, total_payments, confirmed_payments, total_revenue,
                            total_discounts_given, avg_ticket
                     FROM payment_analytics WHERE chat_id = ?1",
                    params![chat_id],
                    |row| {
                        Ok(PaymentAnalytics {
                            chat_id: row.get(0)?,
                            total_payments: row.get(1)?,
                            confirmed_payments: row.get(2)?,
                            total_revenue: row.get(3)?,
                            total_discounts_given: row.get(4)?,
                            avg_ticket: row.get(5)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)
}

/// Cross-customer rollup over the analytics view. Zeros when the view is
/// unavailable or the ledger is empty.
pub async fn analytics_rollup(db: &Database) -> Result<PaymentAnalyticsRollup, CarameloError> {
    if !db.capabilities().payments {
        return Ok(empty_rollup());
    }
    db.connection()
        .call(move |conn| {
            let rollup = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(total_payments), 0),
                        COALESCE(SUM(confirmed_payments), 0),
                        COALESCE(SUM(total_revenue), 0),
                        COALESCE(SUM(total_discounts_given), 0),
                        CASE WHEN COALESCE(SUM(confirmed_payments), 0) > 0
                             THEN SUM(total_revenue) / SUM(confirmed_payments)
                             ELSE 0 END
                 FROM payment_analytics",
                [],
                |row| {
                    Ok(PaymentAnalyticsRollup {
                        total_customers: row.get(0)?,
                        total_payments: row.get(1)?,
                        confirmed_payments: row.get(2)?,
                        total_revenue: row.get(3)?,
                        total_discounts_given: row.get(4)?,
                        avg_ticket: row.get(5)?,
                    })
                },
            )?;
            Ok(rollup)
        })
        .await
        .map_err(map_tr_err)
}

const PAYMENT_COLUMNS: &str = "SELECT id, chat_id, payment_id, provider, amount, original_amount, \
     discount_amount, status, method, description, payment_url, created_at, confirmed_at \
     FROM payments";

fn empty_rollup() -> PaymentAnalyticsRollup {
    PaymentAnalyticsRollup {
        total_customers: 0,
        total_payments: 0,
        confirmed_payments: 0,
        total_revenue: 0.0,
        total_discounts_given: 0.0,
        avg_ticket: 0.0,
    }
}

fn read_payment(
    conn: &rusqlite::Connection,
    payment_id: &str,
) -> Result<Option<Payment>, rusqlite::Error> {
    conn.query_row(
        &format!("{PAYMENT_COLUMNS} WHERE payment_id = ?1"),
        params![payment_id],
        map_payment_row,
    )
    .optional()
}

fn map_payment_row(row: &rusqlite::Row<'_>) -> Result<Payment, rusqlite::Error> {
    let status: String = row.get(7)?;
    Ok(Payment {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        payment_id: row.get(2)?,
        provider: row.get(3)?,
        amount: row.get(4)?,
        original_amount: row.get(5)?,
        discount_amount: row.get(6)?,
        status: parse_enum::<PaymentStatus>(7, status)?,
        method: row.get(8)?,
        description: row.get(9)?,
        payment_url: row.get(10)?,
        created_at: row.get(11)?,
        confirmed_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Capabilities;
    use tempfile::tempdir;

    async fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        (dir, db)
    }

    fn pix_payment(chat_id: &str, payment_id: &str, amount: f64) -> NewPayment {
        NewPayment {
            chat_id: chat_id.to_string(),
            payment_id: payment_id.to_string(),
            provider: "asaas".to_string(),
            amount,
            original_amount: None,
            discount_amount: None,
            status: PaymentStatus::Pending,
            method: "pix".to_string(),
            description: Some("banho e tosa".to_string()),
            payment_url: None,
        }
    }

    #[tokio::test]
    async fn record_applies_amount_defaults() {
        let (_dir, db) = test_db().await;

        let stored = record(&db, pix_payment("c1", "pay_1", 75.0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.original_amount, 75.0);
        assert_eq!(stored.discount_amount, 0.0);
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert!(stored.confirmed_at.is_none());
    }

    #[tokio::test]
    async fn explicit_discount_is_kept() {
        let (_dir, db) = test_db().await;

        let mut payment = pix_payment("c1", "pay_1", 67.5);
        payment.original_amount = Some(75.0);
        payment.discount_amount = Some(7.5);
        let stored = record(&db, payment).await.unwrap().unwrap();
        assert_eq!(stored.original_amount, 75.0);
        assert_eq!(stored.discount_amount, 7.5);
    }

    #[tokio::test]
    async fn confirmed_at_tracks_status() {
        let (_dir, db) = test_db().await;

        record(&db, pix_payment("c1", "pay_1", 50.0)).await.unwrap();

        let confirmed = update_status(&db, "pay_1", PaymentStatus::Confirmed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(confirmed.status, PaymentStatus::Confirmed);
        assert!(confirmed.confirmed_at.is_some());

        // Leaving confirmed clears the confirmation timestamp.
        let failed = update_status(&db, "pay_1", PaymentStatus::Failed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert!(failed.confirmed_at.is_none());
    }

    #[tokio::test]
    async fn update_status_of_unknown_id_is_none() {
        let (_dir, db) = test_db().await;
        let updated = update_status(&db, "pay_missing", PaymentStatus::Confirmed)
            .await
            .unwrap();
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn listing_by_customer_and_pending() {
        let (_dir, db) = test_db().await;

        record(&db, pix_payment("c1", "pay_1", 30.0)).await.unwrap();
        record(&db, pix_payment("c1", "pay_2", 40.0)).await.unwrap();
        record(&db, pix_payment("c2", "pay_3", 50.0)).await.unwrap();
        update_status(&db, "pay_1", PaymentStatus::Confirmed)
            .await
            .unwrap();

        let c1 = list_by_customer(&db, "c1").await.unwrap();
        assert_eq!(c1.len(), 2);
        assert_eq!(c1[0].payment_id, "pay_2");

        let pending = list_pending(&db).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].payment_id, "pay_2");
    }

    #[tokio::test]
    async fn analytics_counts_confirmed_revenue_only() {
        let (_dir, db) = test_db().await;

        let mut discounted = pix_payment("c1", "pay_1", 90.0);
        discounted.original_amount = Some(100.0);
        discounted.discount_amount = Some(10.0);
        record(&db, discounted).await.unwrap();
        record(&db, pix_payment("c1", "pay_2", 60.0)).await.unwrap();
        update_status(&db, "pay_1", PaymentStatus::Confirmed)
            .await
            .unwrap();

        let stats = analytics(&db, "c1").await.unwrap().unwrap();
        assert_eq!(stats.total_payments, 2);
        assert_eq!(stats.confirmed_payments, 1);
        assert_eq!(stats.total_revenue, 90.0);
        assert_eq!(stats.total_discounts_given, 10.0);
        assert_eq!(stats.avg_ticket, 90.0);

        let rollup = analytics_rollup(&db).await.unwrap();
        assert_eq!(rollup.total_customers, 1);
        assert_eq!(rollup.total_revenue, 90.0);
    }

    #[tokio::test]
    async fn ledger_degrades_without_capability() {
        let (_dir, db) = test_db().await;
        let db = db.with_capabilities(Capabilities {
            immediate_followups: true,
            appointment_reminders: true,
            payments: false,
        });

        assert!(record(&db, pix_payment("c1", "pay_1", 10.0))
            .await
            .unwrap()
            .is_none());
        assert!(find_by_id(&db, "pay_1").await.unwrap().is_none());
        assert!(list_pending(&db).await.unwrap().is_empty());
        assert_eq!(analytics_rollup(&db).await.unwrap().total_payments, 0);
    }
}
