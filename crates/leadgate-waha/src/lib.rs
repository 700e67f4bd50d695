// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WAHA gateway integration.
//!
//! [`WahaClient`] implements [`leadgate_core::GatewayApi`] against the WAHA
//! REST API: session lifecycle, QR retrieval, message sends, and contact
//! existence checks.

pub mod client;
pub mod types;

pub use client::{WahaClient, map_upstream_state};
