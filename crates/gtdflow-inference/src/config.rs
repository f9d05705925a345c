//! Bedrock connection configuration.
//!
//! The configuration is an explicit immutable value handed to the transports
//! at construction; nothing reads ambient state after that.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `AWS_REGION` | `us-east-1` | Region of the Bedrock runtime endpoint |
//! | `AWS_BEARER_TOKEN_BEDROCK` | (required) | Bedrock API key sent as bearer token |
//! | `BEDROCK_MODEL_ID` | `us.anthropic.claude-sonnet-4-20250514-v1:0` | Model or inference profile id |
//! | `BEDROCK_ENDPOINT` | (derived from region) | Endpoint override (proxies, tests) |
//! | `BEDROCK_TIMEOUT_SECS` | `120` | Per-call timeout |

use std::fmt;

use tracing::debug;

use gtdflow_core::defaults;
use gtdflow_core::{Error, Result};

/// Immutable Bedrock settings shared by both transports.
#[derive(Clone)]
pub struct BedrockConfig {
    /// AWS region, used to derive the endpoint.
    pub region: String,
    /// Bedrock API key.
    pub bearer_token: String,
    /// Model or cross-region inference profile id.
    pub model_id: String,
    /// Explicit endpoint, e.g. `http://127.0.0.1:9000` in tests.
    pub endpoint: Option<String>,
    /// Per-call timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: defaults::AWS_REGION.to_string(),
            bearer_token: String::new(),
            model_id: defaults::BEDROCK_MODEL_ID.to_string(),
            endpoint: None,
            timeout_seconds: defaults::GEN_TIMEOUT_SECS,
        }
    }
}

// Never print the credential.
impl fmt::Debug for BedrockConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BedrockConfig")
            .field("region", &self.region)
            .field("bearer_token", &"<redacted>")
            .field("model_id", &self.model_id)
            .field("endpoint", &self.endpoint)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl BedrockConfig {
    /// Load from environment variables and validate.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            region: std::env::var("AWS_REGION")
                .unwrap_or_else(|_| defaults::AWS_REGION.to_string()),
            bearer_token: std::env::var("AWS_BEARER_TOKEN_BEDROCK").unwrap_or_default(),
            model_id: std::env::var("BEDROCK_MODEL_ID")
                .unwrap_or_else(|_| defaults::BEDROCK_MODEL_ID.to_string()),
            endpoint: std::env::var("BEDROCK_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            timeout_seconds: std::env::var("BEDROCK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::GEN_TIMEOUT_SECS),
        };
        let config = config.validated()?;
        debug!(?config, "Loaded Bedrock configuration");
        Ok(config)
    }

    /// Trim the token and check required fields.
    pub fn validated(mut self) -> Result<Self> {
        self.bearer_token = self.bearer_token.trim().to_string();
        if self.bearer_token.is_empty() {
            return Err(Error::Config(
                "AWS_BEARER_TOKEN_BEDROCK is required and cannot be empty".to_string(),
            ));
        }
        if self.model_id.trim().is_empty() {
            return Err(Error::Config("BEDROCK_MODEL_ID cannot be empty".to_string()));
        }
        if self.region.trim().is_empty() && self.endpoint.is_none() {
            return Err(Error::Config(
                "AWS_REGION cannot be empty without BEDROCK_ENDPOINT".to_string(),
            ));
        }
        if let Some(ref endpoint) = self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(Error::Config(format!(
                    "BEDROCK_ENDPOINT must start with http:// or https://, got: {}",
                    endpoint
                )));
            }
        }
        if self.timeout_seconds == 0 {
            return Err(Error::Config(
                "BEDROCK_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }

    /// Runtime endpoint without trailing slash.
    pub fn endpoint_url(&self) -> String {
        match self.endpoint {
            Some(ref endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://bedrock-runtime.{}.amazonaws.com", self.region),
        }
    }

    /// URL of a model operation (`converse`, `invoke`).
    pub fn operation_url(&self, operation: &str) -> String {
        format!(
            "{}/model/{}/{}",
            self.endpoint_url(),
            urlencoding::encode(&self.model_id),
            operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> BedrockConfig {
        BedrockConfig {
            bearer_token: "token".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = BedrockConfig::default();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.model_id, defaults::BEDROCK_MODEL_ID);
        assert_eq!(config.timeout_seconds, 120);
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn test_token_is_trimmed() {
        let config = BedrockConfig {
            bearer_token: "  abc \n".to_string(),
            ..Default::default()
        }
        .validated()
        .unwrap();
        assert_eq!(config.bearer_token, "abc");
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = BedrockConfig {
            bearer_token: "   ".to_string(),
            ..Default::default()
        }
        .validated()
        .unwrap_err();
        assert!(err.to_string().contains("AWS_BEARER_TOKEN_BEDROCK"));
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        let config = BedrockConfig {
            endpoint: Some("localhost:9000".to_string()),
            ..valid()
        };
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_endpoint_derived_from_region() {
        let config = BedrockConfig {
            region: "eu-west-1".to_string(),
            ..valid()
        };
        assert_eq!(
            config.endpoint_url(),
            "https://bedrock-runtime.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_operation_url_encodes_model_id() {
        let config = BedrockConfig {
            endpoint: Some("http://localhost:9000/".to_string()),
            model_id: "arn:aws:bedrock:us-east-1::foundation-model/x".to_string(),
            ..valid()
        };
        assert_eq!(
            config.operation_url("converse"),
            "http://localhost:9000/model/arn%3Aaws%3Abedrock%3Aus-east-1%3A%3Afoundation-model%2Fx/converse"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", valid());
        assert!(!debug.contains("token\""));
        assert!(debug.contains("<redacted>"));
    }
}
