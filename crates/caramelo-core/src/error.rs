// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Caramelo sales agent.

use thiserror::Error;

/// The primary error type used across Caramelo components.
#[derive(Debug, Error)]
pub enum CarameloError {
    /// Configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Chat gateway errors (send failure, session unavailable, rate limiting).
    #[error("gateway error: {message}")]
    Gateway {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
