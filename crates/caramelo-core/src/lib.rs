// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types, errors, and trait seams for the Caramelo sales agent.
//!
//! Everything shared across the workspace lives here: the error taxonomy,
//! the customer-memory domain model, and the `ChatGateway` trait that marks
//! the boundary to the external messaging network.

pub mod error;
pub mod traits;
pub mod types;

pub use error::CarameloError;
pub use traits::ChatGateway;
