//! Scripted transport for deterministic testing.
//!
//! Replays a queue of canned outcomes, optionally routed by a substring of
//! the request's messages, and records every request it receives. The last
//! outcome of a queue repeats once the queue is drained.
//!
//! ## Usage
//!
//! ```rust
//! use gtdflow_core::TransportError;
//! use gtdflow_inference::mock::ScriptedTransport;
//!
//! let transport = ScriptedTransport::new("primary")
//!     .then_err(TransportError::throttle("slow down"))
//!     .then_ok(r#"{"summary": "ok"}"#)
//!     .route("project-b", Err(TransportError::auth("denied")));
//! assert_eq!(transport.calls(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use gtdflow_core::{GenerationRequest, Transport, TransportError, TransportResponse};

/// Model id reported by scripted responses.
pub const MOCK_MODEL_ID: &str = "mock-model";

type Step = Result<String, TransportError>;

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
    routes: Vec<(String, VecDeque<Step>)>,
    requests: Vec<GenerationRequest>,
    call_times: Vec<Instant>,
}

/// Transport that replays scripted outcomes.
pub struct ScriptedTransport {
    name: String,
    latency: Duration,
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: Duration::ZERO,
            script: Mutex::new(Script::default()),
        }
    }

    /// Queue a successful response.
    pub fn then_ok(self, raw_text: impl Into<String>) -> Self {
        self.push(Ok(raw_text.into()))
    }

    /// Queue a failure.
    pub fn then_err(self, err: TransportError) -> Self {
        self.push(Err(err))
    }

    /// Queue an outcome for requests whose messages contain `needle`.
    /// Routes are checked in insertion order before the main queue.
    pub fn route(self, needle: impl Into<String>, step: Step) -> Self {
        let needle = needle.into();
        {
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            match script.routes.iter_mut().find(|(n, _)| *n == needle) {
                Some((_, steps)) => steps.push_back(step),
                None => script.routes.push((needle, VecDeque::from([step]))),
            }
        }
        self
    }

    /// Simulated latency per call (honours a paused tokio clock).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of calls received.
    pub fn calls(&self) -> usize {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).requests.len()
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).requests.clone()
    }

    /// Tokio clock reading at each call, for asserting backoff gaps.
    pub fn call_times(&self) -> Vec<Instant> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).call_times.clone()
    }

    fn push(self, step: Step) -> Self {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).steps.push_back(step);
        self
    }

    fn next_step(&self, request: &GenerationRequest) -> Step {
        let mut guard = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        let script = &mut *guard;
        script.requests.push(request.clone());
        script.call_times.push(Instant::now());

        let routed = script.routes.iter_mut().find(|(needle, _)| {
            request
                .messages
                .iter()
                .any(|m| m.content.contains(needle.as_str()))
        });
        let queue = match routed {
            Some((_, steps)) => steps,
            None => &mut script.steps,
        };

        let step = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        step.unwrap_or_else(|| Err(TransportError::server("mock script exhausted")))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, request: &GenerationRequest) -> Result<TransportResponse, TransportError> {
        let step = self.next_step(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        step.map(|raw_text| TransportResponse {
            tokens_used: Some((raw_text.len() / 4) as u32),
            raw_text,
            model_id: MOCK_MODEL_ID.to_string(),
        })
    }
}
