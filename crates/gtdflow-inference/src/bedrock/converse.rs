//! Converse API transport.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use gtdflow_core::{GenerationRequest, Result, Transport, TransportError, TransportResponse};

use super::types::{ConverseRequest, ConverseResponse};
use super::{build_client, post_json};
use crate::config::BedrockConfig;

/// Primary transport: `POST /model/{modelId}/converse`.
pub struct ConverseTransport {
    client: Client,
    config: BedrockConfig,
}

impl ConverseTransport {
    pub const OPERATION: &'static str = "converse";

    /// Create a transport with its own HTTP client.
    pub fn new(config: &BedrockConfig) -> Result<Self> {
        let client = build_client(config)?;
        info!(
            endpoint = %config.endpoint_url(),
            model = %config.model_id,
            "Initializing Bedrock Converse transport"
        );
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &BedrockConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for ConverseTransport {
    fn name(&self) -> &str {
        Self::OPERATION
    }

    async fn send(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let body = ConverseRequest::from(request);
        let response: ConverseResponse =
            post_json(&self.client, &self.config, Self::OPERATION, &body).await?;

        debug!(
            stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
            "Converse response received"
        );

        let raw_text = response
            .text()
            .ok_or_else(|| TransportError::server("Converse response contained no text"))?;

        Ok(TransportResponse {
            raw_text,
            model_id: self.config.model_id.clone(),
            tokens_used: response.usage.map(|u| u.total_tokens),
        })
    }
}
