// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the WAHA REST API.

use serde::{Deserialize, Serialize};

/// Body for `POST /api/sessions/{name}/start`.
#[derive(Debug, Clone, Serialize)]
pub struct StartSessionRequest {
    pub name: String,
}

/// Response of `GET /api/sessions/{name}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStatusResponse {
    pub name: String,
    pub status: String,
}

/// Response of `GET /api/{session}/auth/qr?format=raw`.
#[derive(Debug, Clone, Deserialize)]
pub struct QrResponse {
    pub value: String,
}

/// Response of `GET /api/contacts/check-exists`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckExistsResponse {
    #[serde(rename = "numberExists")]
    pub number_exists: bool,
}

/// Body for `POST /api/sendText`.
#[derive(Debug, Clone, Serialize)]
pub struct SendTextRequest {
    pub session: String,
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub text: String,
}

/// Remote file reference used by image and document sends.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteFile {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Body for `POST /api/sendImage`.
#[derive(Debug, Clone, Serialize)]
pub struct SendImageRequest {
    pub session: String,
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub file: RemoteFile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Body for `POST /api/sendFile`.
#[derive(Debug, Clone, Serialize)]
pub struct SendFileRequest {
    pub session: String,
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub file: RemoteFile,
}

/// One button for `POST /api/sendButtons`.
#[derive(Debug, Clone, Serialize)]
pub struct ButtonPayload {
    pub id: String,
    pub text: String,
}

/// Body for `POST /api/sendButtons`.
#[derive(Debug, Clone, Serialize)]
pub struct SendButtonsRequest {
    pub session: String,
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub body: String,
    pub buttons: Vec<ButtonPayload>,
}

/// Message id envelope returned by the send endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct SentMessageId {
    #[serde(rename = "_serialized")]
    pub serialized: String,
}

/// Response of the send endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    pub id: SentMessageId,
}
