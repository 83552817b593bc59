// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write-path concurrency contract.
//!
//! Every mutation goes through the one [`crate::database::Database`]
//! handle, whose `tokio-rusqlite` connection executes closures on a
//! single background thread. That thread is the only writer; do not
//! open extra `Connection`s against the same file.

// Consequences of the single-writer model:
// - Webhook handlers for different chats can run concurrently without
//   interleaving partial writes; WAL keeps readers unblocked meanwhile.
// - Multi-statement sequences that must be atomic (get-or-create,
//   insert-then-prune) run as one transaction inside one closure.
// - `busy_timeout` covers the rare contention from external tooling
//   (sqlite3 shell, backups) touching the database file.
