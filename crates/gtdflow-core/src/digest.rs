//! Content digests over canonicalized entity context.
//!
//! The digest decides cache freshness, so it must be a pure function of the
//! ordered field sequence: same fields in the same order produce the same
//! digest in every process, and any reordering produces a different one.
//! Fields are length-prefixed before hashing so `["ab", "c"]` and
//! `["a", "bc"]` never collide by concatenation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::Error;

/// SHA-256 digest of an entity's relevant fields.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.short())
    }
}

impl FromStr for ContentDigest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::InvalidInput(format!("invalid digest hex: {}", e)))?;
        let array: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::InvalidInput(format!("digest must be 32 bytes, got {}", b.len()))
        })?;
        Ok(Self(array))
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Hash an ordered sequence of fields.
pub fn digest<S: AsRef<str>>(fields: &[S]) -> ContentDigest {
    let mut hasher = Sha256::new();
    for field in fields {
        let bytes = field.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    ContentDigest(hasher.finalize().into())
}

/// Keep the first `max_lines` lines of `text`, trimming trailing whitespace.
pub fn truncate_lines(text: &str, max_lines: usize) -> String {
    text.lines()
        .take(max_lines)
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builder for the canonical field sequence of an entity.
///
/// Each field is rendered as `name=value`; the caller fixes the order by the
/// order of builder calls.
#[derive(Debug, Clone, Default)]
pub struct ContextFields {
    fields: Vec<String>,
}

impl ContextFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.fields
            .push(format!("{}={}", name, value.as_ref().trim()));
        self
    }

    /// Truncated section excerpt; truncation happens here, before hashing.
    pub fn excerpt(self, name: &str, text: &str, max_lines: usize) -> Self {
        let excerpt = truncate_lines(text, max_lines);
        self.field(name, excerpt)
    }

    pub fn count(self, name: &str, n: usize) -> Self {
        self.field(name, n.to_string())
    }

    pub fn digest(&self) -> ContentDigest {
        digest(&self.fields)
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }
}
