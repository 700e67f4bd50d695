// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Leadgate messaging gateway.
//!
//! This crate provides the error taxonomy, domain types, and the trait
//! seams (upstream gateway, funnel classifier) used throughout the
//! Leadgate workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::LeadgateError;
pub use traits::{
    ClassificationOutcome, ClassificationRequest, ClassifierProvider, GatewayApi, QrCode,
    UpstreamSessionStatus,
};
pub use types::{
    DeliveryStatus, FunnelContact, FunnelStage, GatewayMessageId, InboundMessage,
    MessageButton, MessageContent, OutboundMessage, Qualification, SessionState, Verdict,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_has_all_variants() {
        // Verify all 10 error variants exist and can be constructed.
        let _config = LeadgateError::Config("test".into());
        let _input = LeadgateError::InvalidInput("test".into());
        let _not_ready = LeadgateError::SessionNotReady {
            session: "s".into(),
            state: SessionState::Created,
        };
        let _lifecycle = LeadgateError::SessionLifecycle {
            session: "s".into(),
            message: "test".into(),
        };
        let _transient = LeadgateError::TransientGateway {
            message: "test".into(),
            source: None,
        };
        let _permanent = LeadgateError::PermanentGateway {
            message: "test".into(),
            source: None,
        };
        let _rate = LeadgateError::RateLimitTimeout {
            deadline: std::time::Duration::from_secs(5),
        };
        let _classifier = LeadgateError::ClassifierTimeout {
            duration: std::time::Duration::from_secs(10),
        };
        let _storage = LeadgateError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _internal = LeadgateError::Internal("test".into());
    }

    #[test]
    fn trait_objects_are_constructible() {
        // If either trait loses object safety, this stops compiling.
        fn _assert_gateway(_: &dyn GatewayApi) {}
        fn _assert_classifier(_: &dyn ClassifierProvider) {}
    }
}
