// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as URL shapes, hour windows, and rate parameters.

use crate::diagnostic::ConfigError;
use crate::model::LeadgateConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &LeadgateConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.gateway.base_url.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.base_url must not be empty".to_string(),
        });
    } else if !config.gateway.base_url.starts_with("http://")
        && !config.gateway.base_url.starts_with("https://")
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "gateway.base_url `{}` must start with http:// or https://",
                config.gateway.base_url
            ),
        });
    }

    if config.server.host.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.host must not be empty".to_string(),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.dispatch.rate_capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.rate_capacity must be at least 1".to_string(),
        });
    }

    if config.dispatch.rate_refill_per_sec <= 0.0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "dispatch.rate_refill_per_sec must be positive, got {}",
                config.dispatch.rate_refill_per_sec
            ),
        });
    }

    if config.monitor.max_reconnect_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "monitor.max_reconnect_attempts must be at least 1".to_string(),
        });
    }

    if config.scheduler.max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "scheduler.max_attempts must be at least 1".to_string(),
        });
    }

    if config.scheduler.business_hours_start > 23 || config.scheduler.business_hours_end > 23 {
        errors.push(ConfigError::Validation {
            message: format!(
                "scheduler business hours must be 0-23, got {}-{}",
                config.scheduler.business_hours_start, config.scheduler.business_hours_end
            ),
        });
    } else if config.scheduler.business_hours_enabled
        && config.scheduler.business_hours_start == config.scheduler.business_hours_end
    {
        errors.push(ConfigError::Validation {
            message: "scheduler business hours window is empty".to_string(),
        });
    }

    if config.classifier.min_advance_score > 100 {
        errors.push(ConfigError::Validation {
            message: format!(
                "classifier.min_advance_score must be 0-100, got {}",
                config.classifier.min_advance_score
            ),
        });
    }

    if config.classifier.enabled && config.classifier.base_url.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "classifier.base_url must not be empty when classifier.enabled".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
