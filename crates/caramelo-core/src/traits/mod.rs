// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams to external collaborators.

pub mod gateway;

pub use gateway::ChatGateway;
