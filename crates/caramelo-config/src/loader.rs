// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the XDG hierarchy: `./caramelo.toml` > `~/.config/caramelo/caramelo.toml`
//! > `/etc/caramelo/caramelo.toml` with environment overrides via the
//! `CARAMELO_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CarameloConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/caramelo/caramelo.toml` (system-wide)
/// 3. `~/.config/caramelo/caramelo.toml` (user XDG config)
/// 4. `./caramelo.toml` (local directory)
/// 5. `CARAMELO_*` environment variables
pub fn load_config() -> Result<CarameloConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CarameloConfig::default()))
        .merge(Toml::file("/etc/caramelo/caramelo.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("caramelo/caramelo.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("caramelo.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<CarameloConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CarameloConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CarameloConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CarameloConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `CARAMELO_WAHA_API_KEY` must map to
/// `waha.api_key`, not `waha.api.key`.
fn env_provider() -> Env {
    Env::prefixed("CARAMELO_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("server_", "server.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("waha_", "waha.", 1)
            .replacen("payments_", "payments.", 1)
            .replacen("followup_", "followup.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
[agent]
log_level = "debug"

[storage]
database_path = "/tmp/caramelo-test.db"
"#,
        )
        .unwrap();
        assert_eq!(config.agent.log_level, "debug");
        assert_eq!(config.storage.database_path, "/tmp/caramelo-test.db");
        // Untouched sections keep compiled defaults.
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.agent.name, "caramelo");
    }
}
