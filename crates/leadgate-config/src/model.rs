// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Leadgate messaging gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Leadgate configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeadgateConfig {
    /// Upstream WhatsApp HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Webhook/management HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outbound dispatch and rate limiting settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Session monitoring and reconnect settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Scheduled send queue settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Funnel classifier settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// Upstream WhatsApp HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the gateway server.
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    /// API key sent in the `x-api-key` header. `None` disables auth.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries for transient upstream errors (429/5xx) per request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_gateway_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    1
}

/// Webhook/management HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8088
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Days to keep webhook idempotency keys before pruning.
    #[serde(default = "default_webhook_retention_days")]
    pub webhook_retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            webhook_retention_days: default_webhook_retention_days(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("leadgate").join("leadgate.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("leadgate.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_webhook_retention_days() -> u32 {
    7
}

/// Outbound dispatch and rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Token bucket capacity per session (burst size).
    #[serde(default = "default_rate_capacity")]
    pub rate_capacity: u32,

    /// Tokens added to each session's bucket per second.
    #[serde(default = "default_rate_refill_per_sec")]
    pub rate_refill_per_sec: f64,

    /// Default deadline in seconds a send waits on the rate limiter.
    #[serde(default = "default_send_deadline_secs")]
    pub send_deadline_secs: u64,

    /// Verify a recipient exists upstream before the first send to it.
    #[serde(default = "default_check_new_recipients")]
    pub check_new_recipients: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            rate_capacity: default_rate_capacity(),
            rate_refill_per_sec: default_rate_refill_per_sec(),
            send_deadline_secs: default_send_deadline_secs(),
            check_new_recipients: default_check_new_recipients(),
        }
    }
}

fn default_rate_capacity() -> u32 {
    5
}

fn default_rate_refill_per_sec() -> f64 {
    0.5
}

fn default_send_deadline_secs() -> u64 {
    30
}

fn default_check_new_recipients() -> bool {
    false
}

/// Session monitoring and reconnect configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Seconds between status polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Consecutive failed polls tolerated before a session counts as
    /// disconnected.
    #[serde(default = "default_grace_polls")]
    pub grace_polls: u32,

    /// Maximum automatic reconnect attempts before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base reconnect backoff in seconds; doubles per attempt.
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,

    /// Cap on the reconnect backoff in seconds.
    #[serde(default = "default_reconnect_backoff_cap_secs")]
    pub reconnect_backoff_cap_secs: u64,

    /// Seconds after which a QR payload is considered stale and re-fetched.
    #[serde(default = "default_qr_refresh_secs")]
    pub qr_refresh_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            grace_polls: default_grace_polls(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            reconnect_backoff_cap_secs: default_reconnect_backoff_cap_secs(),
            qr_refresh_secs: default_qr_refresh_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    20
}

fn default_grace_polls() -> u32 {
    3
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_backoff_secs() -> u64 {
    10
}

fn default_reconnect_backoff_cap_secs() -> u64 {
    300
}

fn default_qr_refresh_secs() -> u64 {
    120
}

/// Scheduled send queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Seconds between drain passes.
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,

    /// Maximum delivery attempts per scheduled entry.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base retry backoff in seconds; doubles per attempt.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    /// Only dispatch scheduled sends inside the business-hours window.
    #[serde(default = "default_business_hours_enabled")]
    pub business_hours_enabled: bool,

    /// Business window start hour, 0-23, in UTC.
    #[serde(default = "default_business_hours_start")]
    pub business_hours_start: u8,

    /// Business window end hour (exclusive), 0-23, in UTC.
    #[serde(default = "default_business_hours_end")]
    pub business_hours_end: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            drain_interval_secs: default_drain_interval_secs(),
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff_secs(),
            business_hours_enabled: default_business_hours_enabled(),
            business_hours_start: default_business_hours_start(),
            business_hours_end: default_business_hours_end(),
        }
    }
}

fn default_drain_interval_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_secs() -> u64 {
    60
}

fn default_business_hours_enabled() -> bool {
    false
}

fn default_business_hours_start() -> u8 {
    9
}

fn default_business_hours_end() -> u8 {
    18
}

/// Funnel classifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Enable LLM classification. When false, the heuristic fallback scores
    /// contacts instead.
    #[serde(default = "default_classifier_enabled")]
    pub enabled: bool,

    /// Base URL of the chat-completions endpoint.
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,

    /// API key for the classifier endpoint. `None` sends no auth header.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier.
    #[serde(default = "default_classifier_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_classifier_temperature")]
    pub temperature: f64,

    /// Maximum tokens per classification response.
    #[serde(default = "default_classifier_max_tokens")]
    pub max_tokens: u32,

    /// Hard response-time budget in seconds. Exceeding it flags the contact
    /// for human review.
    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,

    /// Minimum score required before an advance verdict is honored.
    /// Lower-confidence advances are downgraded to flag_for_human.
    #[serde(default = "default_min_advance_score")]
    pub min_advance_score: u8,

    /// Recent messages included as classification context.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: default_classifier_enabled(),
            base_url: default_classifier_base_url(),
            api_key: None,
            model: default_classifier_model(),
            temperature: default_classifier_temperature(),
            max_tokens: default_classifier_max_tokens(),
            timeout_secs: default_classifier_timeout_secs(),
            min_advance_score: default_min_advance_score(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_classifier_enabled() -> bool {
    false
}

fn default_classifier_base_url() -> String {
    "http://localhost:11434/v1/chat/completions".to_string()
}

fn default_classifier_model() -> String {
    "llama3".to_string()
}

fn default_classifier_temperature() -> f64 {
    0.2
}

fn default_classifier_max_tokens() -> u32 {
    512
}

fn default_classifier_timeout_secs() -> u64 {
    15
}

fn default_min_advance_score() -> u8 {
    40
}

fn default_history_limit() -> u32 {
    10
}
