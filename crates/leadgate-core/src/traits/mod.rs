// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits at the seams of the system.

pub mod classifier;
pub mod gateway;

pub use classifier::{ClassificationOutcome, ClassificationRequest, ClassifierProvider};
pub use gateway::{GatewayApi, QrCode, UpstreamSessionStatus};
