// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per storage concern.

pub mod contacts;
pub mod inbound;
pub mod messages;
pub mod queue;
pub mod sessions;
pub mod templates;
pub mod webhook_events;
