// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded base-schema migration using refinery.
//!
//! The base schema (profiles, bounded histories, scheduled follow-ups) is
//! compiled into the binary via `embed_migrations!` and applied on open;
//! its failure is fatal. Optional feature revisions are applied separately
//! in [`crate::database`] and never block startup.

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending base migrations against the given connection.
///
/// Refinery tracks applied migrations in its own
/// `refinery_schema_history` table.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), refinery::Error> {
    embedded::migrations::runner().run(conn)?;
    Ok(())
}
