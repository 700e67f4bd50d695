// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Leadgate messaging gateway.

use thiserror::Error;

use crate::types::SessionState;

/// The primary error type used across all Leadgate components.
#[derive(Debug, Error)]
pub enum LeadgateError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Caller supplied data that fails validation (malformed recipient, empty
    /// content, unknown template placeholder).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation required a working session, but the session is elsewhere
    /// in its lifecycle.
    #[error("session `{session}` not ready: state is {state}")]
    SessionNotReady {
        session: String,
        state: SessionState,
    },

    /// A session lifecycle operation was requested from a state that does not
    /// permit it (e.g. fetching an auth challenge for a working session).
    #[error("session lifecycle violation for `{session}`: {message}")]
    SessionLifecycle { session: String, message: String },

    /// Upstream gateway failure that is worth retrying (timeouts, 5xx,
    /// connection resets).
    #[error("transient gateway error: {message}")]
    TransientGateway {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Upstream gateway rejection that will not succeed on retry (auth
    /// failure, invalid recipient, unknown session).
    #[error("permanent gateway error: {message}")]
    PermanentGateway {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The rate limiter could not grant a send slot before the caller's
    /// deadline elapsed. The message was never submitted upstream.
    #[error("rate limit wait exceeded deadline of {deadline:?}")]
    RateLimitTimeout { deadline: std::time::Duration },

    /// The classifier did not produce a usable verdict within its budget.
    #[error("classifier timed out after {duration:?}")]
    ClassifierTimeout { duration: std::time::Duration },

    /// Storage backend errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LeadgateError {
    /// True for failures a retry with backoff may resolve.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LeadgateError::TransientGateway { .. }
                | LeadgateError::RateLimitTimeout { .. }
                | LeadgateError::SessionNotReady { .. }
        )
    }
}
