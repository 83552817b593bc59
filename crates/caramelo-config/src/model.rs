// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Caramelo sales agent.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Caramelo configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CarameloConfig {
    /// Agent identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// HTTP webhook server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outbound chat gateway (WAHA) settings.
    #[serde(default)]
    pub waha: WahaConfig,

    /// Payment provider integration settings.
    #[serde(default)]
    pub payments: PaymentsConfig,

    /// Follow-up dispatcher settings.
    #[serde(default)]
    pub followup: FollowUpConfig,
}

/// Agent identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the agent.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "caramelo".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP webhook server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address for the webhook server.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port for the webhook server.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Route on which inbound chat webhooks are received.
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            webhook_path: default_webhook_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file. The parent directory is created
    /// on first open.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "./data/caramelo.db".to_string()
}

/// Outbound chat gateway (WAHA) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WahaConfig {
    /// Base URL of the WAHA instance. Required for `serve`.
    #[serde(default)]
    pub api_url: Option<String>,

    /// API key sent in the `X-Api-Key` header.
    #[serde(default)]
    pub api_key: Option<String>,

    /// WAHA session name. Inbound events for other sessions are ignored.
    #[serde(default = "default_session")]
    pub session: String,
}

impl Default for WahaConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            session: default_session(),
        }
    }
}

fn default_session() -> String {
    "default".to_string()
}

/// Payment provider integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentsConfig {
    /// Enables the payment-reconciliation path. When false, payment
    /// webhooks are acknowledged and dropped.
    #[serde(default)]
    pub enabled: bool,

    /// Provider name recorded on each payment row.
    #[serde(default = "default_provider")]
    pub provider: String,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
        }
    }
}

fn default_provider() -> String {
    "asaas".to_string()
}

/// Follow-up dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FollowUpConfig {
    /// Seconds between polls of the scheduled follow-up queue.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds between sweeps of the appointment reminder queue.
    #[serde(default = "default_reminder_interval")]
    pub reminder_poll_interval_secs: u64,

    /// Number of consecutive unanswered follow-ups after which a customer
    /// is marked abandoned.
    #[serde(default = "default_max_unanswered")]
    pub max_unanswered: i64,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            reminder_poll_interval_secs: default_reminder_interval(),
            max_unanswered: default_max_unanswered(),
        }
    }
}

fn default_poll_interval() -> u64 {
    60
}

fn default_reminder_interval() -> u64 {
    60
}

fn default_max_unanswered() -> i64 {
    5
}
