//! Data models shared across gtdflow crates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::digest::ContentDigest;

// =============================================================================
// GENERATION
// =============================================================================

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters forwarded to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            temperature: Some(crate::defaults::GEN_TEMPERATURE),
            max_tokens: Some(crate::defaults::GEN_MAX_TOKENS),
            top_p: None,
        }
    }
}

/// A fully-formed generation request.
///
/// Built by the host's prompt builder and never modified by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub inference_config: InferenceConfig,
}

impl GenerationRequest {
    /// Start a request with the given system prompt and default sampling.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages: Vec::new(),
            inference_config: InferenceConfig::default(),
        }
    }

    pub fn with_user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    pub fn with_assistant(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::assistant(content));
        self
    }

    pub fn with_inference_config(mut self, config: InferenceConfig) -> Self {
        self.inference_config = config;
        self
    }

    /// Total characters of prompt text (system + messages).
    pub fn prompt_len(&self) -> usize {
        self.system_prompt.len() + self.messages.iter().map(|m| m.content.len()).sum::<usize>()
    }
}

/// Which of the two transports produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Primary,
    Secondary,
}

/// What a single transport call returns on success.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub raw_text: String,
    pub model_id: String,
    pub tokens_used: Option<u32>,
}

/// Result of a logical send, after retry and fallback handling.
///
/// Owned exclusively by the caller that issued the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub raw_text: String,
    pub model_id: String,
    pub tokens_used: Option<u32>,
    /// Transport calls made, including the successful one.
    pub attempts: u32,
    /// Attempts that were rejected with a throttling signal.
    pub throttled: u32,
    pub transport: TransportKind,
    pub latency_ms: u64,
}

// =============================================================================
// ENTITIES
// =============================================================================

/// Stable identifier for a trackable unit of work (e.g. one project note).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a target document, resolved by a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Everything the scheduler needs to process one entity.
#[derive(Debug, Clone)]
pub struct EntityContext {
    pub key: EntityKey,
    /// Document that receives the rendered result.
    pub document: DocumentId,
    /// Canonically ordered, already-truncated fields fed to the digest.
    pub fields: Vec<String>,
    pub request: GenerationRequest,
    /// Re-issued once when the first response fails to parse.
    pub strict_request: Option<GenerationRequest>,
}

// =============================================================================
// CACHE
// =============================================================================

/// Outcome recorded with a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Ok,
    Error,
}

/// Last computation for an entity. One entry per key, overwritten in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: EntityKey,
    pub digest: ContentDigest,
    /// Validated payload as JSON (`null` when no successful result exists yet).
    pub result: JsonValue,
    pub computed_at: DateTime<Utc>,
    pub status: CacheStatus,
}

impl CacheEntry {
    pub fn ok(key: EntityKey, digest: ContentDigest, result: JsonValue) -> Self {
        Self {
            key,
            digest,
            result,
            computed_at: Utc::now(),
            status: CacheStatus::Ok,
        }
    }

    /// Failed computation; keeps the previous result if there was one.
    pub fn error(key: EntityKey, digest: ContentDigest, previous: Option<JsonValue>) -> Self {
        Self {
            key,
            digest,
            result: previous.unwrap_or(JsonValue::Null),
            computed_at: Utc::now(),
            status: CacheStatus::Error,
        }
    }
}

/// Cache freshness rule: recompute iff there is no entry, the digest changed,
/// the last computation failed, or the caller forces a refresh.
pub fn needs_recompute(entry: Option<&CacheEntry>, fresh: &ContentDigest, force: bool) -> bool {
    match entry {
        _ if force => true,
        None => true,
        Some(entry) => entry.digest != *fresh || entry.status == CacheStatus::Error,
    }
}
