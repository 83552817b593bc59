// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per logical table group.
//!
//! Every function takes `&Database` and funnels through the single
//! background writer. Multi-statement sequences that must appear atomic
//! run inside one closure as one transaction.

pub mod followups;
pub mod history;
pub mod opportunities;
pub mod payments;
pub mod profiles;
pub mod reminders;

/// Retained conversation messages per chat.
pub const MAX_HISTORY_MESSAGES: i64 = 50;

/// Retained response-time samples per chat.
pub const MAX_RESPONSE_SAMPLES: i64 = 10;

/// Parse a lowercase enum column, mapping failure into a rusqlite
/// conversion error so it surfaces through the normal error path.
pub(crate) fn parse_enum<T>(idx: usize, text: String) -> Result<T, rusqlite::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
