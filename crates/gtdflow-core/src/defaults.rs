//! Centralized default constants for gtdflow.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// AI SERVICE
// =============================================================================

/// Default AWS region for the Bedrock runtime endpoint.
pub const AWS_REGION: &str = "us-east-1";

/// Default Bedrock model (cross-region inference profile).
pub const BEDROCK_MODEL_ID: &str = "us.anthropic.claude-sonnet-4-20250514-v1:0";

/// Anthropic Messages API version expected by InvokeModel.
pub const ANTHROPIC_BEDROCK_VERSION: &str = "bedrock-2023-05-31";

/// Timeout for a single generation request (seconds).
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Default output token budget for a generation request.
pub const GEN_MAX_TOKENS: u32 = 2000;

/// Default sampling temperature.
pub const GEN_TEMPERATURE: f32 = 0.3;

// =============================================================================
// RETRY
// =============================================================================

/// Total transport calls per logical send, including the first.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Backoff base delay (milliseconds); attempt n waits base * 2^n.
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Backoff ceiling (milliseconds).
pub const RETRY_MAX_DELAY_MS: u64 = 8_000;

// =============================================================================
// SCHEDULER
// =============================================================================

/// Jobs in flight per batch.
pub const BATCH_CONCURRENCY: usize = 3;

/// First inter-dispatch delay after a throttle signal (milliseconds).
pub const THROTTLE_BASE_DELAY_MS: u64 = 1_000;

/// Maximum inter-dispatch delay under sustained throttling (milliseconds).
pub const THROTTLE_MAX_DELAY_MS: u64 = 30_000;

/// Clean completions required before the effective concurrency grows back by one.
pub const THROTTLE_RECOVERY_SUCCESSES: u32 = 3;

/// Capacity of the batch event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// CONTEXT / DIGEST
// =============================================================================

/// Lines kept from each structured section before hashing and prompting.
pub const CONTEXT_EXCERPT_LINES: usize = 20;

// =============================================================================
// DOCUMENT REGIONS
// =============================================================================

/// Prefix shared by every gtdflow region marker.
pub const REGION_MARKER_PREFIX: &str = "<!-- gtdflow:";

/// Region rewritten with AI output.
pub const MANAGED_REGION_NAME: &str = "ai-review";

/// Region holding user-authored text that is never overwritten.
pub const RAW_REGION_NAME: &str = "notes";

// =============================================================================
// CACHE
// =============================================================================

/// Default file name of the flat JSON cache.
pub const CACHE_FILE_NAME: &str = ".gtdflow-cache.json";

/// On-disk cache format version.
pub const CACHE_FORMAT_VERSION: u32 = 1;
