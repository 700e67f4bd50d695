// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory mocks for the gateway and classifier trait seams.
//!
//! Used by engine tests to script upstream behavior without a live WAHA
//! instance or model endpoint.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use leadgate_core::{
    ClassificationOutcome, ClassificationRequest, ClassifierProvider, GatewayApi,
    GatewayMessageId, LeadgateError, MessageContent, QrCode, SessionState, UpstreamSessionStatus,
};

/// One message the mock gateway accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSend {
    pub session: String,
    pub recipient: String,
    pub content: MessageContent,
}

#[derive(Default)]
struct GatewayState {
    statuses: VecDeque<Result<UpstreamSessionStatus, LeadgateError>>,
    send_results: VecDeque<Result<GatewayMessageId, LeadgateError>>,
    sends: Vec<RecordedSend>,
    started: Vec<String>,
    stopped: Vec<String>,
    logged_out: Vec<String>,
    qr_fetches: u32,
    send_counter: u64,
    number_exists: bool,
}

/// Scriptable [`GatewayApi`] implementation.
///
/// Statuses and send results are consumed in FIFO order; when a script
/// queue runs dry the mock falls back to `working` status and successful
/// sends with generated ids.
pub struct MockGateway {
    state: Mutex<GatewayState>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState {
                number_exists: true,
                ..GatewayState::default()
            }),
        }
    }

    /// Queue an upstream status to report on the next poll.
    pub fn push_status(&self, state: SessionState, raw: &str) {
        self.state.lock().unwrap().statuses.push_back(Ok(UpstreamSessionStatus {
            state,
            raw: raw.to_string(),
        }));
    }

    /// Queue a failure for the next status poll.
    pub fn push_status_error(&self, error: LeadgateError) {
        self.state.lock().unwrap().statuses.push_back(Err(error));
    }

    /// Queue a failure for the next send.
    pub fn push_send_failure(&self, error: LeadgateError) {
        self.state.lock().unwrap().send_results.push_back(Err(error));
    }

    /// Queue a specific gateway id for the next send.
    pub fn push_send_id(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .send_results
            .push_back(Ok(GatewayMessageId(id.to_string())));
    }

    pub fn set_number_exists(&self, exists: bool) {
        self.state.lock().unwrap().number_exists = exists;
    }

    pub fn sends(&self) -> Vec<RecordedSend> {
        self.state.lock().unwrap().sends.clone()
    }

    pub fn started_sessions(&self) -> Vec<String> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn logged_out_sessions(&self) -> Vec<String> {
        self.state.lock().unwrap().logged_out.clone()
    }

    pub fn qr_fetches(&self) -> u32 {
        self.state.lock().unwrap().qr_fetches
    }
}

#[async_trait]
impl GatewayApi for MockGateway {
    async fn start_session(&self, session: &str) -> Result<(), LeadgateError> {
        self.state.lock().unwrap().started.push(session.to_string());
        Ok(())
    }

    async fn session_status(&self, _session: &str) -> Result<UpstreamSessionStatus, LeadgateError> {
        let mut state = self.state.lock().unwrap();
        state.statuses.pop_front().unwrap_or(Ok(UpstreamSessionStatus {
            state: SessionState::Working,
            raw: "WORKING".to_string(),
        }))
    }

    async fn qr_code(&self, _session: &str) -> Result<QrCode, LeadgateError> {
        let mut state = self.state.lock().unwrap();
        state.qr_fetches += 1;
        Ok(QrCode {
            payload: format!("qr-payload-{}", state.qr_fetches),
        })
    }

    async fn stop_session(&self, session: &str) -> Result<(), LeadgateError> {
        self.state.lock().unwrap().stopped.push(session.to_string());
        Ok(())
    }

    async fn logout_session(&self, session: &str) -> Result<(), LeadgateError> {
        self.state.lock().unwrap().logged_out.push(session.to_string());
        Ok(())
    }

    async fn send_message(
        &self,
        session: &str,
        recipient: &str,
        content: &MessageContent,
    ) -> Result<GatewayMessageId, LeadgateError> {
        let mut state = self.state.lock().unwrap();
        if let Some(result) = state.send_results.pop_front() {
            if let Ok(id) = &result {
                state.sends.push(RecordedSend {
                    session: session.to_string(),
                    recipient: recipient.to_string(),
                    content: content.clone(),
                });
                let id = id.clone();
                return Ok(id);
            }
            return result;
        }
        state.send_counter += 1;
        let id = GatewayMessageId(format!("mock-{}", state.send_counter));
        state.sends.push(RecordedSend {
            session: session.to_string(),
            recipient: recipient.to_string(),
            content: content.clone(),
        });
        Ok(id)
    }

    async fn number_exists(&self, _session: &str, _number: &str) -> Result<bool, LeadgateError> {
        Ok(self.state.lock().unwrap().number_exists)
    }
}

#[derive(Default)]
struct ClassifierState {
    outcomes: VecDeque<Result<ClassificationOutcome, LeadgateError>>,
    requests: Vec<ClassificationRequest>,
}

/// Scriptable [`ClassifierProvider`] implementation.
///
/// Outcomes are consumed in FIFO order; an empty queue yields an
/// internal error so tests fail loudly on unscripted calls.
#[derive(Default)]
pub struct MockClassifier {
    state: Mutex<ClassifierState>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_outcome(&self, outcome: ClassificationOutcome) {
        self.state.lock().unwrap().outcomes.push_back(Ok(outcome));
    }

    pub fn push_failure(&self, error: LeadgateError) {
        self.state.lock().unwrap().outcomes.push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<ClassificationRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl ClassifierProvider for MockClassifier {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationOutcome, LeadgateError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        state.outcomes.pop_front().unwrap_or_else(|| {
            Err(LeadgateError::Internal(
                "mock classifier called without a scripted outcome".into(),
            ))
        })
    }
}
