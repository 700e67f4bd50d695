// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait for funnel-stage classification providers.

use async_trait::async_trait;

use crate::error::LeadgateError;
use crate::types::{FunnelContact, FunnelStage};

/// Input to a single classification call.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    /// The contact being classified, including its current stage and score.
    pub contact: FunnelContact,
    /// The inbound message that triggered classification.
    pub message: String,
    /// Recent message bodies for the contact, newest last.
    pub history: Vec<String>,
}

/// Raw classifier output before funnel policy (monotonicity, one-step
/// advance, confidence threshold) is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationOutcome {
    /// Stage the classifier believes the contact is at.
    pub stage: FunnelStage,
    /// Engagement score, 0-100.
    pub score: u8,
    pub reasoning: String,
}

/// A provider that classifies contacts into funnel stages.
///
/// Implementations enforce their own response-time budget and return
/// [`LeadgateError::ClassifierTimeout`] when it is exceeded.
#[async_trait]
pub trait ClassifierProvider: Send + Sync + 'static {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationOutcome, LeadgateError>;
}
