// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface of the leadgate gateway.
//!
//! Two route groups share one router: the webhook intake the upstream
//! gateway posts events to, and the management API operators use for
//! sessions, messages, contacts and templates.

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, build_router, start_server};
