// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait for the upstream WhatsApp HTTP gateway.

use async_trait::async_trait;

use crate::error::LeadgateError;
use crate::types::{GatewayMessageId, MessageContent, SessionState};

/// Session status as reported by the upstream gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamSessionStatus {
    /// Mapped lifecycle state.
    pub state: SessionState,
    /// Raw status string from the upstream API, kept for logging.
    pub raw: String,
}

/// Authentication challenge payload (QR code) for a session awaiting scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrCode {
    pub payload: String,
}

/// Operations against the upstream WhatsApp HTTP gateway.
///
/// Implemented by the real REST client and by the in-memory mock used in
/// engine tests.
#[async_trait]
pub trait GatewayApi: Send + Sync + 'static {
    /// Ask the gateway to start (or restart) the named session.
    async fn start_session(&self, session: &str) -> Result<(), LeadgateError>;

    /// Fetch the current upstream status of the named session.
    async fn session_status(&self, session: &str) -> Result<UpstreamSessionStatus, LeadgateError>;

    /// Fetch the current authentication QR payload for the named session.
    async fn qr_code(&self, session: &str) -> Result<QrCode, LeadgateError>;

    /// Stop the session without discarding its credentials.
    async fn stop_session(&self, session: &str) -> Result<(), LeadgateError>;

    /// Log the session out, discarding its credentials.
    async fn logout_session(&self, session: &str) -> Result<(), LeadgateError>;

    /// Submit a message. Returns the gateway-assigned message id on
    /// acknowledgment.
    async fn send_message(
        &self,
        session: &str,
        recipient: &str,
        content: &MessageContent,
    ) -> Result<GatewayMessageId, LeadgateError>;

    /// Check whether a number is registered with the messaging service.
    async fn number_exists(&self, session: &str, number: &str) -> Result<bool, LeadgateError>;
}
