//! Amazon Bedrock runtime transports.
//!
//! Two wire mechanisms reach the same model:
//!
//! - [`ConverseTransport`]: the model-agnostic Converse API (primary)
//! - [`InvokeTransport`]: InvokeModel with an Anthropic Messages body (secondary)
//!
//! Both authenticate with a Bedrock API key sent as a bearer token and
//! classify failures into [`TransportError`] kinds. Neither retries; that
//! is the job of [`InferenceClient`](crate::InferenceClient).
//!
//! # Example
//!
//! ```rust,no_run
//! use gtdflow_core::{GenerationRequest, Transport};
//! use gtdflow_inference::bedrock::ConverseTransport;
//! use gtdflow_inference::BedrockConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = BedrockConfig::from_env().unwrap();
//!     let transport = ConverseTransport::new(&config).unwrap();
//!     let request = GenerationRequest::new("Answer in JSON.").with_user("Say hi");
//!     let response = transport.send(&request).await.unwrap();
//!     println!("{}", response.raw_text);
//! }
//! ```

mod converse;
mod error;
mod invoke;
mod types;

pub use converse::ConverseTransport;
pub use error::{
    from_reqwest, normalize_error_type, parse_retry_after, to_transport_error, BedrockErrorCode,
};
pub use invoke::InvokeTransport;
pub use types::*;

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use gtdflow_core::{Error, Result, TransportError};

use crate::config::BedrockConfig;

/// Header carrying the AWS error type on failed calls.
const ERROR_TYPE_HEADER: &str = "x-amzn-ErrorType";

/// Longest error body echoed into a transport error message.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Build the HTTP client shared by a transport's calls.
pub(crate) fn build_client(config: &BedrockConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// POST a JSON body and decode a JSON response, classifying every failure.
///
/// A 2xx body that does not decode as `R` is reported as a protocol-level
/// network error: the endpoint answered, but not in this transport's format.
pub(crate) async fn post_json<B, R>(
    client: &Client,
    config: &BedrockConfig,
    operation: &str,
    body: &B,
) -> std::result::Result<R, TransportError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let url = config.operation_url(operation);
    debug!(operation, url = %url, "Sending Bedrock request");

    let response = client
        .post(&url)
        .bearer_auth(&config.bearer_token)
        .header("Accept", "application/json")
        .json(body)
        .send()
        .await
        .map_err(from_reqwest)?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(response.headers());
        let header_type = response
            .headers()
            .get(ERROR_TYPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.unwrap_or_default();
        let body: BedrockErrorBody = serde_json::from_str(&text).unwrap_or_default();

        let error_type = header_type.or(body.error_type).unwrap_or_default();
        let message = body
            .message
            .unwrap_or_else(|| text.trim().chars().take(MAX_ERROR_BODY_CHARS).collect());

        return Err(to_transport_error(
            status.as_u16(),
            &error_type,
            &message,
            retry_after,
        ));
    }

    let bytes = response.bytes().await.map_err(from_reqwest)?;
    serde_json::from_slice::<R>(&bytes).map_err(|e| {
        TransportError::unreachable(format!("Unexpected {} response body: {}", operation, e))
            .with_status(status.as_u16())
    })
}
