// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-backed funnel classification.
//!
//! [`ChatClassifier`] implements [`leadgate_core::ClassifierProvider`]
//! against any OpenAI-compatible chat-completions endpoint.

pub mod client;
pub mod prompt;

pub use client::ChatClassifier;
