//! # Previously, on bkt...
//!
//! 🎬 The bucket was imaginary. The KMS key was a string. The objects lived in
//! a `BTreeMap` and died with the process. And yet, every listing came back in
//! order, every marker was honored, and every put was written down in a little
//! ledger so the tests could check who sent what.
//!
//! `InMemoryStore` is the [`ObjectStore`] for tests and `kind = "in_memory"`
//! dry runs. It behaves like an S3 ListObjects v1 listing (lexicographic keys,
//! "start after this marker", last key of a truncated page as the next marker)
//! and carries a few knobs S3 would never give you:
//!
//! - `with_put_latency` makes every put take a while, so concurrency shows up
//! - `fail_puts_for` makes chosen keys blow up on put
//! - `fail_lists` makes every listing call blow up
//! - `max_in_flight_puts` reports the most puts ever running at once
//!
//! ⚠️ This is NOT for production. If you're deploying this to prod, please also deploy a therapist.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;

use crate::backends::ObjectStore;
use crate::common::{
    FetchedObject, ListingPage, ObjectRef, ObjectSummary, PutAck, SseParams,
};

/// 📒 One put, as the store saw it arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecord {
    pub object: ObjectRef,
    pub sse: Option<SseParams>,
}

/// 📄 One listing call, as the store saw it arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCall {
    pub prefix: String,
    pub marker: Option<String>,
    pub max_keys: usize,
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    sse: Option<SseParams>,
}

/// 📦 A bucket that never forgets (until the process exits).
///
/// Clone-able because tests hand one copy to the pipeline and keep another to
/// peek inside afterwards. Every field is behind an `Arc`, so the clones share
/// the same objects, ledgers and counters.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    objects: Arc<Mutex<BTreeMap<(String, String), StoredObject>>>,
    put_log: Arc<Mutex<Vec<PutRecord>>>,
    list_log: Arc<Mutex<Vec<ListCall>>>,
    failing_keys: Arc<Mutex<HashSet<String>>>,
    fail_lists: Arc<AtomicBool>,
    put_latency: Option<Duration>,
    in_flight_puts: Arc<AtomicUsize>,
    max_in_flight_puts: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// ⏳ Every put sleeps this long before landing. Makes overlap observable.
    pub fn with_put_latency(mut self, latency: Duration) -> Self {
        self.put_latency = Some(latency);
        self
    }

    /// 💣 Puts to these keys fail. Everything else succeeds.
    pub async fn fail_puts_for<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut failing = self.failing_keys.lock().await;
        failing.extend(keys.into_iter().map(Into::into));
    }

    /// 💣 Every listing call from now on fails.
    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// 🧪 Seeds an object directly, bypassing the put ledger.
    pub async fn insert(&self, object: &ObjectRef, body: Vec<u8>) {
        self.objects.lock().await.insert(
            (object.bucket.clone(), object.key.clone()),
            StoredObject { body, sse: None },
        );
    }

    pub async fn put_log(&self) -> Vec<PutRecord> {
        self.put_log.lock().await.clone()
    }

    pub async fn list_log(&self) -> Vec<ListCall> {
        self.list_log.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 📊 High-water mark of concurrent puts since this store was created.
    pub fn max_in_flight_puts(&self) -> usize {
        self.max_in_flight_puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> Result<ListingPage> {
        self.list_log.lock().await.push(ListCall {
            prefix: prefix.to_string(),
            marker: marker.map(str::to_string),
            max_keys,
        });

        if self.fail_lists.load(Ordering::SeqCst) {
            bail!("💀 in-memory listing of {bucket}/{prefix} was told to fail, and it listened");
        }

        let objects = self.objects.lock().await;
        // -- 🔎 "start after marker" — strictly greater, exactly like ListObjects v1
        let mut matching = objects
            .iter()
            .filter(|((b, key), _)| {
                b == bucket
                    && key.starts_with(prefix)
                    && marker.is_none_or(|m| key.as_str() > m)
            })
            .map(|((b, key), stored)| {
                ObjectSummary::new(ObjectRef::new(b.clone(), key.clone()), stored.body.len() as u64)
            });

        let summaries: Vec<ObjectSummary> = matching.by_ref().take(max_keys).collect();
        let is_truncated = matching.next().is_some();
        let next_marker = if is_truncated {
            summaries.last().map(|s| s.object.key.clone())
        } else {
            None
        };

        trace!(
            "📄 in-memory page: {} summaries under {}/{}, truncated: {}",
            summaries.len(),
            bucket,
            prefix,
            is_truncated
        );
        Ok(ListingPage {
            summaries,
            next_marker,
        })
    }

    async fn get(&self, object: &ObjectRef) -> Result<FetchedObject> {
        let objects = self.objects.lock().await;
        let Some(stored) = objects.get(&(object.bucket.clone(), object.key.clone())) else {
            bail!("💀 NoSuchKey: {object} is not in the in-memory bucket");
        };
        Ok(FetchedObject {
            body: stored.body.clone(),
            content_length: Some(stored.body.len() as u64),
            bucket_key_enabled: stored.sse.as_ref().map(|s| s.bucket_key_enabled),
            kms_key_id: stored.sse.as_ref().map(|s| s.kms_key_id.clone()),
        })
    }

    async fn put(
        &self,
        object: &ObjectRef,
        body: Vec<u8>,
        sse: Option<&SseParams>,
    ) -> Result<PutAck> {
        let now_in_flight = self.in_flight_puts.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_puts.fetch_max(now_in_flight, Ordering::SeqCst);

        if let Some(latency) = self.put_latency {
            tokio::time::sleep(latency).await;
        }

        self.put_log.lock().await.push(PutRecord {
            object: object.clone(),
            sse: sse.cloned(),
        });

        let should_fail = self.failing_keys.lock().await.contains(&object.key);
        let outcome = if should_fail {
            Err(anyhow::anyhow!("💀 injected put failure for {object}"))
        } else {
            self.objects.lock().await.insert(
                (object.bucket.clone(), object.key.clone()),
                StoredObject {
                    body,
                    sse: sse.cloned(),
                },
            );
            Ok(PutAck {
                etag: None,
                bucket_key_enabled: sse.map(|s| s.bucket_key_enabled),
                kms_key_id: sse.map(|s| s.kms_key_id.clone()),
            })
        };

        self.in_flight_puts.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}
