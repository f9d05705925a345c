//! Bedrock runtime request and response types.

use serde::{Deserialize, Serialize};

use gtdflow_core::{GenerationRequest, InferenceConfig};

// =============================================================================
// CONVERSE TYPES
// =============================================================================

/// Request body for `POST /model/{modelId}/converse`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<ConverseText>,
    pub messages: Vec<ConverseMessage>,
    pub inference_config: ConverseInferenceConfig,
}

/// Text content block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverseText {
    pub text: String,
}

/// A single conversation message.
#[derive(Debug, Serialize)]
pub struct ConverseMessage {
    pub role: String,
    pub content: Vec<ConverseText>,
}

/// Sampling parameters in Converse naming.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseInferenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl From<&InferenceConfig> for ConverseInferenceConfig {
    fn from(config: &InferenceConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

impl From<&GenerationRequest> for ConverseRequest {
    fn from(request: &GenerationRequest) -> Self {
        let system = if request.system_prompt.is_empty() {
            Vec::new()
        } else {
            vec![ConverseText {
                text: request.system_prompt.clone(),
            }]
        };

        Self {
            system,
            messages: request
                .messages
                .iter()
                .map(|m| ConverseMessage {
                    role: m.role.as_str().to_string(),
                    content: vec![ConverseText {
                        text: m.content.clone(),
                    }],
                })
                .collect(),
            inference_config: (&request.inference_config).into(),
        }
    }
}

/// Response from the Converse operation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseResponse {
    pub output: ConverseOutput,
    pub usage: Option<ConverseUsage>,
    pub stop_reason: Option<String>,
}

/// Output union; only `message` is produced for text generation.
#[derive(Debug, Deserialize)]
pub struct ConverseOutput {
    pub message: Option<ConverseResponseMessage>,
}

/// Assistant message in a Converse response.
#[derive(Debug, Deserialize)]
pub struct ConverseResponseMessage {
    pub role: String,
    pub content: Vec<ConverseContentBlock>,
}

/// Content block; non-text blocks (tool use, reasoning) leave `text` unset.
#[derive(Debug, Deserialize)]
pub struct ConverseContentBlock {
    #[serde(default)]
    pub text: Option<String>,
}

/// Token usage for a Converse call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl ConverseResponse {
    /// Concatenated text blocks of the assistant message.
    pub fn text(&self) -> Option<String> {
        let message = self.output.message.as_ref()?;
        let text: String = message
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

// =============================================================================
// INVOKE MODEL (ANTHROPIC MESSAGES) TYPES
// =============================================================================

/// Request body for `POST /model/{modelId}/invoke` with an Anthropic model.
#[derive(Debug, Serialize)]
pub struct InvokeRequest {
    pub anthropic_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub system: String,
    pub messages: Vec<InvokeMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

/// A single message in Anthropic Messages format.
#[derive(Debug, Serialize)]
pub struct InvokeMessage {
    pub role: String,
    pub content: String,
}

impl From<&GenerationRequest> for InvokeRequest {
    fn from(request: &GenerationRequest) -> Self {
        let config = &request.inference_config;
        Self {
            anthropic_version: gtdflow_core::defaults::ANTHROPIC_BEDROCK_VERSION.to_string(),
            system: request.system_prompt.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| InvokeMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            // The Messages API requires an explicit budget.
            max_tokens: config
                .max_tokens
                .unwrap_or(gtdflow_core::defaults::GEN_MAX_TOKENS),
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

/// Response body from InvokeModel for Anthropic models.
#[derive(Debug, Deserialize)]
pub struct InvokeResponse {
    pub content: Vec<InvokeContentBlock>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<InvokeUsage>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Typed content block.
#[derive(Debug, Deserialize)]
pub struct InvokeContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Token usage for an InvokeModel call.
#[derive(Debug, Deserialize)]
pub struct InvokeUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl InvokeResponse {
    /// Concatenated `text` blocks.
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Error body returned by the Bedrock runtime.
#[derive(Debug, Default, Deserialize)]
pub struct BedrockErrorBody {
    #[serde(default, alias = "Message")]
    pub message: Option<String>,
    #[serde(default, rename = "__type")]
    pub error_type: Option<String>,
}
