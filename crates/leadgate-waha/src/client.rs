// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the WAHA REST API.
//!
//! Provides [`WahaClient`] which handles request construction,
//! authentication, transient error retry, and mapping of upstream session
//! status strings onto [`SessionState`].

use std::time::Duration;

use async_trait::async_trait;
use leadgate_core::{
    GatewayApi, GatewayMessageId, LeadgateError, MessageContent, QrCode, SessionState,
    UpstreamSessionStatus,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::types::{
    ButtonPayload, CheckExistsResponse, QrResponse, RemoteFile, SendButtonsRequest,
    SendFileRequest, SendImageRequest, SendMessageResponse, SendTextRequest,
    SessionStatusResponse, StartSessionRequest,
};

/// HTTP client for WAHA gateway communication.
///
/// Manages the `X-Api-Key` header, connection pooling, and retry logic
/// for transient errors (429, 500, 503).
#[derive(Debug, Clone)]
pub struct WahaClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl WahaClient {
    /// Creates a new WAHA client.
    ///
    /// # Arguments
    /// * `base_url` - Gateway base URL, e.g. `http://localhost:3000`
    /// * `api_key` - Optional API key sent as `X-Api-Key`
    /// * `timeout_secs` - Per-request timeout
    /// * `max_retries` - Extra attempts after a transient failure
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, LeadgateError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert(
                "X-Api-Key",
                HeaderValue::from_str(key).map_err(|e| {
                    LeadgateError::Config(format!("invalid API key header value: {e}"))
                })?,
            );
        }
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LeadgateError::TransientGateway {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Sends a request with transient-error retry and decodes a JSON body.
    ///
    /// On 429, 500, or 503, retries after a 1-second delay. Any other 4xx
    /// response is permanent; network failures are transient.
    async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, LeadgateError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, path, "retrying gateway request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let mut req = self.client.request(method.clone(), self.url(path));
            if let Some(json) = &body {
                req = req.json(json);
            }
            let response = req.send().await.map_err(|e| LeadgateError::TransientGateway {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

            let status = response.status();
            debug!(status = %status, attempt, path, "gateway response received");

            if status.is_success() {
                let text = response.text().await.map_err(|e| {
                    LeadgateError::TransientGateway {
                        message: format!("failed to read response body: {e}"),
                        source: Some(Box::new(e)),
                    }
                })?;
                return serde_json::from_str(&text).map_err(|e| {
                    LeadgateError::PermanentGateway {
                        message: format!("failed to parse gateway response: {e}"),
                        source: Some(Box::new(e)),
                    }
                });
            }

            let text = response.text().await.unwrap_or_default();
            if is_transient_error(status) {
                warn!(status = %status, body = %text, "transient gateway error");
                last_error = Some(LeadgateError::TransientGateway {
                    message: format!("gateway returned {status}: {text}"),
                    source: None,
                });
                if attempt < self.max_retries {
                    continue;
                }
                break;
            }

            return Err(LeadgateError::PermanentGateway {
                message: format!("gateway returned {status}: {text}"),
                source: None,
            });
        }

        Err(last_error.unwrap_or_else(|| LeadgateError::TransientGateway {
            message: "gateway request failed after retries".into(),
            source: None,
        }))
    }

    /// Like [`Self::request_json`] but discards the response body.
    async fn request_ack(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), LeadgateError> {
        let _: serde_json::Value = self.request_json(method, path, body).await?;
        Ok(())
    }
}

/// Maps a WAHA status string onto the session state machine.
pub fn map_upstream_state(raw: &str) -> SessionState {
    match raw {
        "STARTING" | "INITIALIZING" => SessionState::Starting,
        "SCAN_QR_CODE" => SessionState::AwaitingScan,
        "WORKING" | "CONNECTED" => SessionState::Working,
        "FAILED" => SessionState::Failed,
        _ => SessionState::Disconnected,
    }
}

/// Formats a phone number as a WAHA chat id (`<digits>@c.us`).
fn chat_id(recipient: &str) -> String {
    let digits: String = recipient.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("{digits}@c.us")
}

#[async_trait]
impl GatewayApi for WahaClient {
    async fn start_session(&self, session: &str) -> Result<(), LeadgateError> {
        let body = serde_json::to_value(StartSessionRequest {
            name: session.to_string(),
        })
        .map_err(|e| LeadgateError::Internal(format!("failed to encode request: {e}")))?;
        self.request_ack(
            reqwest::Method::POST,
            &format!("api/sessions/{session}/start"),
            Some(body),
        )
        .await
    }

    async fn session_status(&self, session: &str) -> Result<UpstreamSessionStatus, LeadgateError> {
        let response: SessionStatusResponse = self
            .request_json(reqwest::Method::GET, &format!("api/sessions/{session}"), None)
            .await?;
        Ok(UpstreamSessionStatus {
            state: map_upstream_state(&response.status),
            raw: response.status,
        })
    }

    async fn qr_code(&self, session: &str) -> Result<QrCode, LeadgateError> {
        let response: QrResponse = self
            .request_json(
                reqwest::Method::GET,
                &format!("api/{session}/auth/qr?format=raw"),
                None,
            )
            .await?;
        Ok(QrCode {
            payload: response.value,
        })
    }

    async fn stop_session(&self, session: &str) -> Result<(), LeadgateError> {
        self.request_ack(
            reqwest::Method::POST,
            &format!("api/sessions/{session}/stop"),
            None,
        )
        .await
    }

    async fn logout_session(&self, session: &str) -> Result<(), LeadgateError> {
        self.request_ack(
            reqwest::Method::POST,
            &format!("api/sessions/{session}/logout"),
            None,
        )
        .await
    }

    async fn send_message(
        &self,
        session: &str,
        recipient: &str,
        content: &MessageContent,
    ) -> Result<GatewayMessageId, LeadgateError> {
        let chat = chat_id(recipient);
        let (path, body) = match content {
            MessageContent::Text { body } => (
                "api/sendText",
                serde_json::to_value(SendTextRequest {
                    session: session.to_string(),
                    chat_id: chat,
                    text: body.clone(),
                }),
            ),
            MessageContent::Image { url, caption } => (
                "api/sendImage",
                serde_json::to_value(SendImageRequest {
                    session: session.to_string(),
                    chat_id: chat,
                    file: RemoteFile {
                        url: url.clone(),
                        filename: None,
                    },
                    caption: caption.clone(),
                }),
            ),
            MessageContent::Document { url, filename } => (
                "api/sendFile",
                serde_json::to_value(SendFileRequest {
                    session: session.to_string(),
                    chat_id: chat,
                    file: RemoteFile {
                        url: url.clone(),
                        filename: filename.clone(),
                    },
                }),
            ),
            MessageContent::Buttons { body, buttons } => (
                "api/sendButtons",
                serde_json::to_value(SendButtonsRequest {
                    session: session.to_string(),
                    chat_id: chat,
                    body: body.clone(),
                    buttons: buttons
                        .iter()
                        .map(|b| ButtonPayload {
                            id: b.id.clone(),
                            text: b.text.clone(),
                        })
                        .collect(),
                }),
            ),
        };
        let body =
            body.map_err(|e| LeadgateError::Internal(format!("failed to encode request: {e}")))?;

        let response: SendMessageResponse = self
            .request_json(reqwest::Method::POST, path, Some(body))
            .await?;
        Ok(GatewayMessageId(response.id.serialized))
    }

    async fn number_exists(&self, session: &str, phone: &str) -> Result<bool, LeadgateError> {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        let response: CheckExistsResponse = self
            .request_json(
                reqwest::Method::GET,
                &format!("api/contacts/check-exists?phone={digits}&session={session}"),
                None,
            )
            .await?;
        Ok(response.number_exists)
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503)
}
