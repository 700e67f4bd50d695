// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core runtime of the leadgate messaging gateway.
//!
//! Components, each grounded in storage and talking to the gateway through
//! the [`leadgate_core::GatewayApi`] seam:
//! - [`session::SessionManager`]: session lifecycle and QR authentication
//! - [`monitor::SessionMonitor`]: health polling and bounded reconnects
//! - [`dispatcher::Dispatcher`]: rate-limited, ordered, at-most-once sends
//! - [`scheduler::Scheduler`]: durable scheduled-send queue
//! - [`classifier::FunnelPipeline`]: inbound classification and funnel policy
//! - [`webhook::WebhookProcessor`]: idempotent webhook intake

pub mod classifier;
pub mod dispatcher;
pub mod events;
pub mod monitor;
pub mod ratelimit;
pub mod scheduler;
pub mod session;
pub mod template;
pub mod webhook;

pub use classifier::FunnelPipeline;
pub use dispatcher::Dispatcher;
pub use events::{AlertBus, AlertEvent};
pub use monitor::SessionMonitor;
pub use scheduler::Scheduler;
pub use session::SessionManager;
pub use webhook::{WebhookEnvelope, WebhookProcessor};
