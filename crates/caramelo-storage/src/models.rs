// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types live in `caramelo-core::types` so components can
//! share them across crate boundaries. Re-exported here for convenience
//! within the storage crate.

pub use caramelo_core::types::{
    AppointmentReminder, ConversationMessage, ConversionOpportunity, CustomerProfile,
    FollowUpContext, FollowUpRequest, ImmediateFollowUp, NewMessage, NewPayment,
    OpportunityRequest, Payment, PaymentAnalytics, PaymentAnalyticsRollup, ProfilePatch,
    ReminderRequest, ScheduledFollowUp,
};
