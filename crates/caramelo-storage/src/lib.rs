// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Caramelo sales agent.
//!
//! Provides WAL-mode SQLite storage with an embedded base migration, a
//! single-writer concurrency model via `tokio-rusqlite`, capability-gated
//! optional schema revisions, and typed query modules for profiles,
//! bounded histories, conversion opportunities, follow-ups, appointment
//! reminders, and the payment ledger.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod writer;

pub use database::{Capabilities, Database};
pub use models::*;
