// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from domain errors to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use leadgate_core::LeadgateError;
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Wrapper that turns a [`LeadgateError`] into an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub LeadgateError);

impl From<LeadgateError> for ApiError {
    fn from(e: LeadgateError) -> Self {
        ApiError(e)
    }
}

pub fn status_for(error: &LeadgateError) -> StatusCode {
    match error {
        LeadgateError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        LeadgateError::SessionNotReady { .. } | LeadgateError::SessionLifecycle { .. } => {
            StatusCode::CONFLICT
        }
        LeadgateError::RateLimitTimeout { .. } => StatusCode::TOO_MANY_REQUESTS,
        LeadgateError::TransientGateway { .. } | LeadgateError::PermanentGateway { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadgate_core::SessionState;

    #[test]
    fn domain_errors_map_to_expected_statuses() {
        assert_eq!(
            status_for(&LeadgateError::InvalidInput("bad phone".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&LeadgateError::SessionNotReady {
                session: "s".into(),
                state: SessionState::Starting,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&LeadgateError::RateLimitTimeout {
                deadline: std::time::Duration::from_secs(30),
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&LeadgateError::PermanentGateway {
                message: "400".into(),
                source: None,
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&LeadgateError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
