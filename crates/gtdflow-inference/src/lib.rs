//! # gtdflow-inference
//!
//! Resilient access to Amazon Bedrock for the gtdflow pipeline.
//!
//! This crate provides:
//! - Converse (primary) and InvokeModel (secondary) transports
//! - `InferenceClient` with bounded retry, jittered backoff and a one-way
//!   fallback between transports
//! - Extraction of JSON payloads from model text and schema validation
//! - Scripted transport for tests (feature `mock`)
//!
//! # Feature Flags
//!
//! - `mock`: Expose [`mock::ScriptedTransport`] to dependent crates
//!
//! # Example
//!
//! ```rust,no_run
//! use gtdflow_inference::{parse, BedrockConfig, FieldKind, InferenceClient, RetryPolicy, Schema};
//! use gtdflow_core::GenerationRequest;
//!
//! #[derive(serde::Deserialize)]
//! struct Answer {
//!     summary: String,
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = BedrockConfig::from_env().unwrap();
//!     let client = InferenceClient::from_config(&config, RetryPolicy::default()).unwrap();
//!     let schema = Schema::<Answer>::object("answer").required("summary", FieldKind::NonEmptyString);
//!
//!     let request = GenerationRequest::new("Reply with JSON.").with_user("Summarize: ...");
//!     let result = client.send(&request).await.unwrap();
//!     let answer = parse(&result.raw_text, &schema).unwrap();
//!     println!("{}", answer.summary);
//! }
//! ```

pub mod bedrock;
pub mod client;
pub mod config;
pub mod parse;
pub mod retry;
pub mod schema;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use bedrock::{ConverseTransport, InvokeTransport};
pub use client::{InferenceClient, ProviderHealth};
pub use config::BedrockConfig;
pub use parse::{extract_json, parse, parse_value};
pub use retry::RetryPolicy;
pub use schema::{FieldKind, FieldSpec, Schema};
