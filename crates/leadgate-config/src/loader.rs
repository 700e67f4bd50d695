// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./leadgate.toml` > `~/.config/leadgate/leadgate.toml`
//! > `/etc/leadgate/leadgate.toml` with environment variable overrides via
//! the `LEADGATE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::LeadgateConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/leadgate/leadgate.toml` (system-wide)
/// 3. `~/.config/leadgate/leadgate.toml` (user XDG config)
/// 4. `./leadgate.toml` (local directory)
/// 5. `LEADGATE_*` environment variables
pub fn load_config() -> Result<LeadgateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LeadgateConfig::default()))
        .merge(Toml::file("/etc/leadgate/leadgate.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("leadgate/leadgate.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("leadgate.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and for callers that already hold the TOML text.
pub fn load_config_from_str(toml_content: &str) -> Result<LeadgateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LeadgateConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LeadgateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LeadgateConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `LEADGATE_GATEWAY_API_KEY`
/// must map to `gateway.api_key`, not `gateway.api.key`.
fn env_provider() -> Env {
    Env::prefixed("LEADGATE_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: LEADGATE_GATEWAY_API_KEY -> "gateway_api_key"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("gateway_", "gateway.", 1)
            .replacen("server_", "server.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("dispatch_", "dispatch.", 1)
            .replacen("monitor_", "monitor.", 1)
            .replacen("scheduler_", "scheduler.", 1)
            .replacen("classifier_", "classifier.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_files() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.gateway.base_url, "http://localhost:3000");
        assert_eq!(config.monitor.poll_interval_secs, 20);
        assert_eq!(config.scheduler.max_attempts, 3);
        assert!(!config.classifier.enabled);
    }

    #[test]
    fn toml_overrides_defaults() {
        let toml = r#"
[gateway]
base_url = "http://waha.internal:3000"
api_key = "secret"

[dispatch]
rate_capacity = 10
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.gateway.base_url, "http://waha.internal:3000");
        assert_eq!(config.gateway.api_key.as_deref(), Some("secret"));
        assert_eq!(config.dispatch.rate_capacity, 10);
        // Unset keys keep their defaults.
        assert_eq!(config.dispatch.send_deadline_secs, 30);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml = r#"
[gateway]
base_uri = "typo"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn env_provider_maps_sections_not_underscores() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LEADGATE_GATEWAY_API_KEY", "from-env");
            jail.set_env("LEADGATE_SCHEDULER_BUSINESS_HOURS_START", "8");
            let config: LeadgateConfig = Figment::new()
                .merge(Serialized::defaults(LeadgateConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.gateway.api_key.as_deref(), Some("from-env"));
            assert_eq!(config.scheduler.business_hours_start, 8);
            Ok(())
        });
    }
}
