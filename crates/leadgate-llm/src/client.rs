// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-completions classifier client.
//!
//! Talks to any OpenAI-compatible chat completions endpoint (Ollama,
//! vLLM, hosted APIs) and enforces a hard response-time budget.

use std::time::Duration;

use async_trait::async_trait;
use leadgate_core::{
    ClassificationOutcome, ClassificationRequest, ClassifierProvider, LeadgateError,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::prompt::{SYSTEM_PROMPT, build_user_prompt, parse_verdict};

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Classifier backed by a chat-completions model.
#[derive(Debug, Clone)]
pub struct ChatClassifier {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    budget: Duration,
}

impl ChatClassifier {
    /// Creates a new classifier client.
    ///
    /// # Arguments
    /// * `endpoint` - Full chat-completions URL
    /// * `api_key` - Optional bearer token
    /// * `model` - Model identifier
    /// * `temperature` / `max_tokens` - Sampling parameters
    /// * `timeout_secs` - Hard budget for a single classification
    pub fn new(
        endpoint: &str,
        api_key: Option<&str>,
        model: &str,
        temperature: f64,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Result<Self, LeadgateError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert(
                "authorization",
                HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                    LeadgateError::Config(format!("invalid API key header value: {e}"))
                })?,
            );
        }
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| LeadgateError::TransientGateway {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            temperature,
            max_tokens,
            budget: Duration::from_secs(timeout_secs),
        })
    }

    async fn complete(&self, request: &ClassificationRequest) -> Result<String, LeadgateError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_user_prompt(request),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| LeadgateError::TransientGateway {
                message: format!("classifier request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, "classifier response received");
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LeadgateError::TransientGateway {
                message: format!("classifier returned {status}: {text}"),
                source: None,
            });
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| LeadgateError::TransientGateway {
                    message: format!("failed to read classifier response: {e}"),
                    source: Some(Box::new(e)),
                })?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                LeadgateError::Internal("classifier response contained no choices".into())
            })
    }
}

#[async_trait]
impl ClassifierProvider for ChatClassifier {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationOutcome, LeadgateError> {
        let reply = tokio::time::timeout(self.budget, self.complete(request))
            .await
            .map_err(|_| LeadgateError::ClassifierTimeout {
                duration: self.budget,
            })??;
        parse_verdict(&reply)
    }
}
