//! Retrying client with a one-way fallback from the primary to the secondary transport.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use gtdflow_core::{
    GenerationRequest, GenerationResult, InferenceConfig, Result, Transport, TransportError,
    TransportErrorKind, TransportKind,
};

use crate::bedrock::{ConverseTransport, InvokeTransport};
use crate::config::BedrockConfig;
use crate::retry::RetryPolicy;

/// Outcome of a health probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub healthy: bool,
    /// Transport that answered the probe.
    pub transport: Option<TransportKind>,
    pub model_id: Option<String>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Sends generation requests with bounded retry, backoff and transport fallback.
///
/// Holds no per-call state; concurrent `send` calls are independent.
#[derive(Clone)]
pub struct InferenceClient {
    primary: Arc<dyn Transport>,
    secondary: Option<Arc<dyn Transport>>,
    policy: RetryPolicy,
}

impl InferenceClient {
    pub fn new(
        primary: Arc<dyn Transport>,
        secondary: Option<Arc<dyn Transport>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            primary,
            secondary,
            policy,
        }
    }

    /// Converse as primary, InvokeModel as secondary.
    pub fn from_config(config: &BedrockConfig, policy: RetryPolicy) -> Result<Self> {
        let primary = Arc::new(ConverseTransport::new(config)?);
        let secondary = Arc::new(InvokeTransport::new(config)?);
        info!(
            model = %config.model_id,
            max_attempts = policy.max_attempts,
            "Inference client ready"
        );
        Ok(Self::new(primary, Some(secondary), policy))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver one logical request.
    ///
    /// Fatal errors return immediately. A retriable protocol-level failure
    /// switches to the secondary transport once, without delay, consuming one
    /// attempt from the shared budget; the switch is never reversed. Other
    /// retriable failures back off and retry on the current transport. Total
    /// transport calls never exceed `max_attempts`; when the budget runs out
    /// the most recent error is returned.
    pub async fn send(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<GenerationResult, TransportError> {
        let started = Instant::now();
        let mut current = &self.primary;
        let mut kind = TransportKind::Primary;
        let mut attempt: u32 = 0;
        let mut retries: u32 = 0;
        let mut throttled: u32 = 0;

        loop {
            attempt += 1;
            debug!(
                attempt,
                transport = current.name(),
                prompt_chars = request.prompt_len(),
                "Sending generation request"
            );

            let err = match current.send(request).await {
                Ok(response) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    debug!(
                        attempt,
                        transport = current.name(),
                        model = %response.model_id,
                        tokens = ?response.tokens_used,
                        duration_ms = latency_ms,
                        "Generation succeeded"
                    );
                    return Ok(GenerationResult {
                        raw_text: response.raw_text,
                        model_id: response.model_id,
                        tokens_used: response.tokens_used,
                        attempts: attempt,
                        throttled,
                        transport: kind,
                        latency_ms,
                    });
                }
                Err(err) => err,
            };

            if err.kind == TransportErrorKind::Throttle {
                throttled += 1;
            }

            if err.is_fatal() {
                warn!(
                    attempt,
                    transport = current.name(),
                    error_kind = %err.kind,
                    error = %err,
                    "Fatal transport error, not retrying"
                );
                return Err(err);
            }

            if attempt >= self.policy.max_attempts {
                warn!(
                    attempt,
                    transport = current.name(),
                    error_kind = %err.kind,
                    error = %err,
                    "Retry budget exhausted"
                );
                return Err(err);
            }

            if err.warrants_fallback() && kind == TransportKind::Primary {
                if let Some(ref secondary) = self.secondary {
                    warn!(
                        attempt,
                        from = current.name(),
                        to = secondary.name(),
                        error = %err,
                        "Primary transport unreachable, falling back"
                    );
                    current = secondary;
                    kind = TransportKind::Secondary;
                    continue;
                }
            }

            let delay = self.policy.delay_for(retries, err.retry_after);
            retries += 1;
            warn!(
                attempt,
                transport = current.name(),
                error_kind = %err.kind,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retriable transport error, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Minimal one-token round trip through the normal send path.
    pub async fn health_check(&self) -> ProviderHealth {
        let probe = GenerationRequest::new("")
            .with_user("ping")
            .with_inference_config(InferenceConfig {
                temperature: Some(0.0),
                max_tokens: Some(1),
                top_p: None,
            });

        let started = Instant::now();
        match self.send(&probe).await {
            Ok(result) => {
                info!(
                    transport = ?result.transport,
                    duration_ms = result.latency_ms,
                    "Health check passed"
                );
                ProviderHealth {
                    healthy: true,
                    transport: Some(result.transport),
                    model_id: Some(result.model_id),
                    latency_ms: result.latency_ms,
                    error: None,
                }
            }
            Err(err) => {
                warn!(error = %err, "Health check failed");
                ProviderHealth {
                    healthy: false,
                    transport: None,
                    model_id: None,
                    latency_ms: started.elapsed().as_millis() as u64,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

impl std::fmt::Debug for InferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceClient")
            .field("primary", &self.primary.name())
            .field("secondary", &self.secondary.as_ref().map(|s| s.name()))
            .field("policy", &self.policy)
            .finish()
    }
}
