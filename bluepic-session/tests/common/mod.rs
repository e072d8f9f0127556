//! Shared test doubles for session integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bluepic_session::{
    AuthorizationProvider, AuthorizationState, Bytes, Outcome, PreparedRequest, RequestMetadata,
    Response, Result, SessionDelegate, SessionError, StatusCode, TelemetrySink, Transport,
    TransportErrorKind,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// Transport
// =============================================================================

/// How a physical exchange was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallShape {
    Fetch,
    Upload(Bytes),
}

/// One physical exchange observed by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct Call {
    pub shape: CallShape,
    pub request: PreparedRequest,
}

impl Call {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }
}

/// Step of a transport script.
pub enum Step {
    Status(u16),
    Reply(Response),
    Fail(TransportErrorKind),
}

impl Step {
    fn into_outcome(self) -> Outcome {
        match self {
            Self::Status(code) => Ok(Response::new(
                StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            )),
            Self::Reply(response) => Ok(response),
            Self::Fail(kind) => Err(SessionError::transport(kind, format!("simulated {}", kind))),
        }
    }
}

/// Transport answering from a script; replies 200 once the script runs out.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    repeat: Mutex<Option<TransportErrorKind>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        })
    }

    /// Transport failing every exchange with `kind`.
    pub fn always_failing(kind: TransportErrorKind) -> Arc<Self> {
        Arc::new(Self {
            repeat: Mutex::new(Some(kind)),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn answer(&self, shape: CallShape, request: PreparedRequest) -> Outcome {
        self.calls.lock().push(Call { shape, request });
        if let Some(kind) = *self.repeat.lock() {
            return Step::Fail(kind).into_outcome();
        }
        self.script
            .lock()
            .pop_front()
            .map(Step::into_outcome)
            .unwrap_or_else(|| Ok(Response::new(StatusCode::OK)))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, request: PreparedRequest) -> Result<Response> {
        self.answer(CallShape::Fetch, request)
    }

    async fn upload(&self, request: PreparedRequest, body: Bytes) -> Result<Response> {
        let bytes_sent = body.len() as u64;
        self.answer(CallShape::Upload(body), request)
            .map(|response| response.with_bytes_sent(bytes_sent))
    }
}

/// A 401 challenge from the protected backend.
pub fn challenge_response() -> Response {
    Response::new(StatusCode::UNAUTHORIZED)
        .with_header("www-authenticate", "Bearer realm=\"appid_default\"")
}

// =============================================================================
// Authorization
// =============================================================================

/// Result the scripted authorizer produces.
#[derive(Debug, Clone)]
pub enum AuthScript {
    Grant(&'static str),
    Deny(u16),
    Fail,
}

pub struct ScriptedAuthorizer {
    script: AuthScript,
    calls: AtomicUsize,
}

impl ScriptedAuthorizer {
    pub fn new(script: AuthScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorizationProvider for ScriptedAuthorizer {
    async fn obtain_authorization(&self, state: &AuthorizationState) -> Result<StatusCode> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            AuthScript::Grant(header) => {
                state.set_header(*header);
                Ok(StatusCode::OK)
            }
            AuthScript::Deny(code) => {
                Ok(StatusCode::from_u16(*code).unwrap_or(StatusCode::UNAUTHORIZED))
            }
            AuthScript::Fail => Err(SessionError::transport(
                TransportErrorKind::CannotConnectToHost,
                "token endpoint unreachable",
            )),
        }
    }
}

// =============================================================================
// Telemetry and delegates
// =============================================================================

#[derive(Default)]
pub struct CollectingSink {
    records: Mutex<Vec<Value>>,
}

impl CollectingSink {
    pub fn records(&self) -> Vec<Value> {
        self.records.lock().clone()
    }
}

impl TelemetrySink for CollectingSink {
    fn record(&self, metadata: &RequestMetadata) {
        self.records.lock().push(metadata.combined());
    }
}

#[derive(Default)]
pub struct RecordingDelegate {
    events: Mutex<Vec<String>>,
}

impl RecordingDelegate {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl SessionDelegate for RecordingDelegate {
    fn on_response(&self, response: &Response) {
        self.events
            .lock()
            .push(format!("response:{}", response.status().as_u16()));
    }

    fn on_redirect(&self, response: &Response) {
        self.events
            .lock()
            .push(format!("redirect:{}", response.status().as_u16()));
    }

    fn on_complete(&self, outcome: &Outcome) {
        let entry = match outcome {
            Ok(response) => format!("complete:ok:{}", response.status().as_u16()),
            Err(e) => format!("complete:err:{}", e),
        };
        self.events.lock().push(entry);
    }
}
