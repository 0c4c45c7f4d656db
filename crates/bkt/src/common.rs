// ai
//! 📦 Common data structures — the building blocks of bkt
//!
//! 🎬 COLD OPEN — INT. S3 CONSOLE — 3:47 AM
//!
//! A bucket sits in us-east-1. It has a KMS key. It has a bucket key setting
//! that someone toggled in a change ticket nobody read. The question on the
//! table: "if we write a hundred tiny objects with SSE-KMS, do they come back?"
//! These structs are the answer's luggage. 🦆
//!
//! 🧠 Knowledge graph:
//! - `ObjectRef`: (bucket, key). Immutable. Named by writes, produced by listings.
//! - `Record`: the payload. One id, one object, `{prefix}/data-{id}`.
//! - `ObjectSummary` / `ListingPage`: what one `list` call hands back.
//! - `SseParams`: the KMS key id + bucket-key flag attached to encrypted puts.
//! - `PutAck` / `FetchedObject`: observable response metadata, logged, never trusted for correctness.
//! - `WriteTask`: half-open id range owned by one pool worker while it runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 🪣 Names exactly one stored object. Cheap to clone, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// 🗝️ The object a record with `id` lives at under `prefix`.
    pub fn for_record(bucket: impl Into<String>, prefix: &str, id: u64) -> Self {
        Self::new(bucket, record_key(prefix, id))
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // -- 🎭 "s3://" even for the in-memory store. It's aspirational.
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// 🗝️ `{prefix}/data-{id}` — the one and only naming convention.
pub fn record_key(prefix: &str, id: u64) -> String {
    format!("{prefix}/data-{id}")
}

/// 🔙 The id a key under `prefix` was named after, if it follows `{prefix}/data-{id}`.
pub fn record_id_from_key(prefix: &str, key: &str) -> Option<u64> {
    key.strip_prefix(prefix)?
        .strip_prefix("/data-")?
        .parse()
        .ok()
}

/// 🎯 The logical payload. Serialized as `{"id":N}` and nothing else.
///
/// The whole probe hinges on this round trip: write `Record { id: 7 }`,
/// list it, fetch it, parse it, get `Record { id: 7 }` back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
}

impl Record {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// 📄 One entry of a listing page. Size and etag ride along for the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub object: ObjectRef,
    pub size: u64,
    pub etag: Option<String>,
}

impl ObjectSummary {
    pub fn new(object: ObjectRef, size: u64) -> Self {
        Self {
            object,
            size,
            etag: None,
        }
    }
}

/// 📚 The result of one `list` call. Consumed immediately by the scanner.
///
/// `next_marker == None` means "that was the last page, go home".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub summaries: Vec<ObjectSummary>,
    pub next_marker: Option<String>,
}

/// 🔒 Server-side encryption parameters for a put. Present iff encryption is on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseParams {
    pub kms_key_id: String,
    pub bucket_key_enabled: bool,
}

/// ✅ What a put told us about itself. Logged at trace, trusted by nobody.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutAck {
    pub etag: Option<String>,
    pub bucket_key_enabled: Option<bool>,
    pub kms_key_id: Option<String>,
}

/// 📥 Bytes of one object plus the encryption metadata the backend reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedObject {
    pub body: Vec<u8>,
    pub content_length: Option<u64>,
    pub bucket_key_enabled: Option<bool>,
    pub kms_key_id: Option<String>,
}

/// 🧵 A contiguous, half-open id range `[from, to_exclusive)` handed to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTask {
    pub from: u64,
    pub to_exclusive: u64,
}

impl WriteTask {
    pub fn ids(&self) -> std::ops::Range<u64> {
        self.from..self.to_exclusive
    }

    pub fn len(&self) -> u64 {
        self.to_exclusive.saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for WriteTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to_exclusive)
    }
}
