//! 🔌 Backends — where the real I/O happens.
//!
//! 🪣 Every probe needs a bucket. Sometimes it's a real one in AWS with a KMS
//! key and a bill attached. Sometimes it's a `BTreeMap` pretending very hard.
//! Either way the core only ever sees [`ObjectStore`]: list a page, get an
//! object, put an object. Three verbs. No retries. No opinions.
//!
//! 🎭 `StoreBackend` is the casting agency. The supervisor picks a variant from
//! config and never asks again which one it got.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{FetchedObject, ListingPage, ObjectRef, PutAck, SseParams};

pub(crate) mod in_mem;
pub(crate) mod s3;

pub use in_mem::InMemoryStore;
pub use s3::{S3Store, S3StoreConfig};

/// 🪣 The storage collaborator the core is written against.
///
/// # Contract 📜
/// - `list_page` returns at most `max_keys` summaries under `prefix`, in the
///   backend's listing order, starting after `marker`. `next_marker == None`
///   means the listing is complete.
/// - `get` returns the full body of one object.
/// - `put` stores `body` at `object`, with SSE-KMS when `sse` is `Some`.
/// - All three are point operations. Retrying is somebody else's hobby.
#[async_trait]
pub trait ObjectStore: std::fmt::Debug + Send + Sync {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> Result<ListingPage>;

    async fn get(&self, object: &ObjectRef) -> Result<FetchedObject>;

    async fn put(&self, object: &ObjectRef, body: Vec<u8>, sse: Option<&SseParams>)
    -> Result<PutAck>;
}

/// 🎭 The many faces of a store — a polymorphic casting call for buckets.
///
/// Think of it as a universal remote. Except it only controls buckets. And it's async.
#[derive(Debug)]
pub enum StoreBackend {
    InMemory(InMemoryStore),
    S3(S3Store),
}

#[async_trait]
impl ObjectStore for StoreBackend {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> Result<ListingPage> {
        match self {
            StoreBackend::InMemory(store) => store.list_page(bucket, prefix, marker, max_keys).await,
            StoreBackend::S3(store) => store.list_page(bucket, prefix, marker, max_keys).await,
        }
    }

    async fn get(&self, object: &ObjectRef) -> Result<FetchedObject> {
        match self {
            StoreBackend::InMemory(store) => store.get(object).await,
            StoreBackend::S3(store) => store.get(object).await,
        }
    }

    async fn put(
        &self,
        object: &ObjectRef,
        body: Vec<u8>,
        sse: Option<&SseParams>,
    ) -> Result<PutAck> {
        match self {
            StoreBackend::InMemory(store) => store.put(object, body, sse).await,
            StoreBackend::S3(store) => store.put(object, body, sse).await,
        }
    }
}
