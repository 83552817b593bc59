// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat gateway trait for the outbound messaging network.

use async_trait::async_trait;

use crate::error::CarameloError;

/// Boundary to the chat network (WAHA or compatible).
///
/// The core calls this only after a payment confirmation is reconciled, or
/// when a follow-up or appointment reminder becomes due. Implementations
/// must not be invoked inside an open store transaction.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Sends a text message to a chat.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), CarameloError>;

    /// Returns the gateway session status (e.g. "WORKING").
    async fn session_status(&self) -> Result<String, CarameloError>;
}
