//! InvokeModel transport with the Anthropic Messages body.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use gtdflow_core::{GenerationRequest, Result, Transport, TransportError, TransportResponse};

use super::types::{InvokeRequest, InvokeResponse};
use super::{build_client, post_json};
use crate::config::BedrockConfig;

/// Secondary transport: `POST /model/{modelId}/invoke`.
pub struct InvokeTransport {
    client: Client,
    config: BedrockConfig,
}

impl InvokeTransport {
    pub const OPERATION: &'static str = "invoke";

    pub fn new(config: &BedrockConfig) -> Result<Self> {
        let client = build_client(config)?;
        info!(
            endpoint = %config.endpoint_url(),
            model = %config.model_id,
            "Initializing Bedrock InvokeModel transport"
        );
        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl Transport for InvokeTransport {
    fn name(&self) -> &str {
        Self::OPERATION
    }

    async fn send(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let body = InvokeRequest::from(request);
        let response: InvokeResponse =
            post_json(&self.client, &self.config, Self::OPERATION, &body).await?;

        debug!(
            stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
            "InvokeModel response received"
        );

        let raw_text = response
            .text()
            .ok_or_else(|| TransportError::server("InvokeModel response contained no text"))?;

        Ok(TransportResponse {
            raw_text,
            model_id: response
                .model
                .unwrap_or_else(|| self.config.model_id.clone()),
            tokens_used: response.usage.map(|u| u.input_tokens + u.output_tokens),
        })
    }
}
