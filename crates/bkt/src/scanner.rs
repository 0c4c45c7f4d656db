// ai
//! 📚 PaginatedScanner — turns "page 1 of ???" into one long, lazy line of keys.
//!
//! 🎬 INT. LIBRARY — NIGHT. The librarian hands over a thousand index cards and
//! a slip of paper that says "ask again after `prefix/data-999`". Our scanner
//! reads every card, one at a time, and only walks back to the desk when the
//! stack is gone. It never holds more than one page of cards at once.
//!
//! 🧠 Knowledge graph:
//! - Page size = `results_size` clamped into `1..=1000`. 1000 is the S3 ceiling for
//!   `max-keys`; asking for more doesn't get you more, it gets you surprised.
//! - State (`ScanCursor` in the design notes): a bounded FIFO `buffer`, the pending
//!   `next_marker`, and `exhausted` once a page comes back without a marker.
//! - `has_next()` = buffer not empty OR a marker is pending.
//! - `next()` refills from the backend only when the buffer is empty, then pops one.
//! - Finite and not restartable. Want to scan again? Build a new scanner.
//! - Listing failures propagate as `ListingFailure`. No retries here; that's policy, not plumbing.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use tracing::trace;

use crate::backends::ObjectStore;
use crate::common::ObjectRef;
use crate::errors::{ProbeError, ProbeResult};

/// 📏 The most keys a single ListObjects call will ever hand back.
pub const MAX_PAGE_SIZE: usize = 1000;

/// 📏 `min(results_size, 1000)`, and never zero.
pub fn page_size_for(results_size: usize) -> usize {
    results_size.clamp(1, MAX_PAGE_SIZE)
}

/// 📚 A lazy, read-ahead view over a paginated listing.
///
/// Owns its buffer outright. One scanner, one reader, no sharing.
pub struct PaginatedScanner<S: ObjectStore + ?Sized> {
    store: Arc<S>,
    bucket: String,
    prefix: String,
    page_size: usize,
    buffer: VecDeque<ObjectRef>,
    next_marker: Option<String>,
    exhausted: bool,
    pages_fetched: usize,
}

impl<S: ObjectStore + ?Sized> std::fmt::Debug for PaginatedScanner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 the store and the buffer contents stay out of it; nobody needs 1000 keys in a panic message
        f.debug_struct("PaginatedScanner")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("page_size", &self.page_size)
            .field("buffered", &self.buffer.len())
            .field("next_marker", &self.next_marker)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl<S: ObjectStore + ?Sized> PaginatedScanner<S> {
    /// 🚀 Builds the scanner and fetches the first page right away, so
    /// `has_next()` means something from the very first call.
    pub async fn new(
        store: Arc<S>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        results_size: usize,
    ) -> ProbeResult<Self> {
        let page_size = page_size_for(results_size);
        let mut scanner = Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
            page_size,
            buffer: VecDeque::with_capacity(page_size),
            next_marker: None,
            exhausted: false,
            pages_fetched: 0,
        };
        scanner.fetch_page().await?;
        Ok(scanner)
    }

    /// ✅ True while there is something buffered or the backend promised more.
    pub fn has_next(&self) -> bool {
        !self.buffer.is_empty() || self.next_marker.is_some()
    }

    /// 🎯 The next object, in backend order. May suspend on a page fetch.
    pub async fn next(&mut self) -> ProbeResult<ObjectRef> {
        // -- 🔄 a page can legally be empty and still carry a marker; keep walking until we hold something
        while self.buffer.is_empty() && self.next_marker.is_some() {
            self.fetch_page().await?;
        }
        self.buffer.pop_front().ok_or(ProbeError::EmptyIteration)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// 🌊 The same sequence as a `Stream`. Consumes the scanner; the first
    /// error ends the stream after being yielded.
    pub fn into_stream(self) -> impl Stream<Item = ProbeResult<ObjectRef>> {
        futures::stream::try_unfold(self, |mut scanner| async move {
            if !scanner.has_next() {
                return Ok(None);
            }
            match scanner.next().await {
                Ok(next) => Ok(Some((next, scanner))),
                // -- 🏁 a trailing empty page ends the listing, it doesn't break it
                Err(ProbeError::EmptyIteration) => Ok(None),
                Err(err) => Err(err),
            }
        })
    }

    async fn fetch_page(&mut self) -> ProbeResult<()> {
        let marker = self.next_marker.take();
        let listed = self
            .store
            .list_page(&self.bucket, &self.prefix, marker.as_deref(), self.page_size)
            .await;
        let page = match listed {
            Ok(page) => page,
            Err(source) => {
                let err = ProbeError::ListingFailure {
                    bucket: self.bucket.clone(),
                    prefix: self.prefix.clone(),
                    marker: marker.clone(),
                    source: source.into(),
                };
                // -- 🔙 put the bookmark back; the caller may decide to try again
                self.next_marker = marker;
                return Err(err);
            }
        };

        let returned = page.summaries.len();
        if self.buffer.len() + returned > self.page_size {
            self.next_marker = marker;
            return Err(ProbeError::PageOverflow {
                returned,
                capacity: self.page_size,
            });
        }

        self.buffer
            .extend(page.summaries.into_iter().map(|summary| summary.object));
        self.next_marker = page.next_marker;
        self.exhausted = self.next_marker.is_none();
        self.pages_fetched += 1;

        trace!(
            "📚 page {} for {}/{}: {} entries, more: {}",
            self.pages_fetched,
            self.bucket,
            self.prefix,
            returned,
            !self.exhausted
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryStore;
    use crate::common::{FetchedObject, ListingPage, ObjectSummary, PutAck, SseParams};
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use std::sync::Mutex;

    /// 🎬 A backend that reads its lines from a script: one canned page per call,
    /// and a ledger of every (marker, max_keys) it was asked for.
    #[derive(Debug, Default)]
    struct ScriptedLister {
        pages: Mutex<VecDeque<Result<ListingPage, String>>>,
        calls: Mutex<Vec<(Option<String>, usize)>>,
    }

    impl ScriptedLister {
        fn with_pages(pages: Vec<Result<ListingPage, String>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(Option<String>, usize)> {
            self.calls.lock().expect("💀 poisoned ledger").clone()
        }
    }

    #[async_trait]
    impl ObjectStore for ScriptedLister {
        async fn list_page(
            &self,
            _bucket: &str,
            _prefix: &str,
            marker: Option<&str>,
            max_keys: usize,
        ) -> Result<ListingPage> {
            self.calls
                .lock()
                .expect("💀 poisoned ledger")
                .push((marker.map(str::to_string), max_keys));
            match self.pages.lock().expect("💀 poisoned script").pop_front() {
                Some(Ok(page)) => Ok(page),
                Some(Err(reason)) => bail!(reason),
                None => bail!("💀 the script ran out of pages; the scanner asked one time too many"),
            }
        }

        async fn get(&self, _object: &ObjectRef) -> Result<FetchedObject> {
            bail!("listing only")
        }

        async fn put(
            &self,
            _object: &ObjectRef,
            _body: Vec<u8>,
            _sse: Option<&SseParams>,
        ) -> Result<PutAck> {
            bail!("listing only")
        }
    }

    fn page(keys: &[&str], next_marker: Option<&str>) -> Result<ListingPage, String> {
        Ok(ListingPage {
            summaries: keys
                .iter()
                .map(|key| ObjectSummary::new(ObjectRef::new("b", *key), 8))
                .collect(),
            next_marker: next_marker.map(str::to_string),
        })
    }

    async fn drain<S: ObjectStore + ?Sized>(scanner: &mut PaginatedScanner<S>) -> Vec<String> {
        let mut keys = Vec::new();
        while scanner.has_next() {
            keys.push(scanner.next().await.expect("💀 next() while has_next()").key);
        }
        keys
    }

    #[tokio::test]
    async fn the_one_where_three_pages_become_one_sequence_in_page_order() {
        let lister = ScriptedLister::with_pages(vec![
            page(&["k1", "k2"], Some("m1")),
            page(&["k3", "k4"], Some("m2")),
            page(&["k5"], None),
        ]);

        let mut scanner = PaginatedScanner::new(lister.clone(), "b", "p", 2)
            .await
            .expect("💀 first page");
        let keys = drain(&mut scanner).await;

        assert_eq!(keys, vec!["k1", "k2", "k3", "k4", "k5"]);
        assert!(!scanner.has_next());
        assert!(scanner.is_exhausted());
        assert_eq!(
            lister.calls(),
            vec![
                (None, 2),
                (Some("m1".to_string()), 2),
                (Some("m2".to_string()), 2)
            ]
        );
    }

    #[tokio::test]
    async fn the_one_where_has_next_stays_true_while_a_marker_is_pending() {
        let lister = ScriptedLister::with_pages(vec![page(&["k1"], Some("m1")), page(&[], None)]);
        let mut scanner = PaginatedScanner::new(lister.clone(), "b", "p", 5)
            .await
            .expect("💀 first page");

        assert!(scanner.has_next());
        assert_eq!(scanner.next().await.expect("💀 k1").key, "k1");
        // -- 📌 buffer empty, but the backend said there's more
        assert!(scanner.has_next());
        assert_eq!(lister.calls().len(), 1, "no read-ahead beyond the buffer");

        // -- 🕳️ ...and then the backend's "more" turned out to be nothing
        assert!(matches!(scanner.next().await, Err(ProbeError::EmptyIteration)));
        assert!(!scanner.has_next());
    }

    #[tokio::test]
    async fn the_one_where_empty_pages_with_markers_are_walked_past() {
        let lister = ScriptedLister::with_pages(vec![
            page(&[], Some("m1")),
            page(&[], Some("m2")),
            page(&["k1"], None),
        ]);
        let mut scanner = PaginatedScanner::new(lister, "b", "p", 10)
            .await
            .expect("💀 first page");

        assert_eq!(drain(&mut scanner).await, vec!["k1"]);
    }

    #[tokio::test]
    async fn the_one_where_an_empty_prefix_has_nothing_next() {
        let lister = ScriptedLister::with_pages(vec![page(&[], None)]);
        let mut scanner = PaginatedScanner::new(lister, "b", "p", 10)
            .await
            .expect("💀 first page");

        assert!(!scanner.has_next());
        assert!(matches!(scanner.next().await, Err(ProbeError::EmptyIteration)));
    }

    #[tokio::test]
    async fn the_one_where_huge_result_sizes_are_clamped_to_a_thousand() {
        let lister = ScriptedLister::with_pages(vec![page(&["k1"], Some("m1")), page(&["k2"], None)]);
        let mut scanner = PaginatedScanner::new(lister.clone(), "b", "p", 50_000)
            .await
            .expect("💀 first page");
        drain(&mut scanner).await;

        assert_eq!(scanner.page_size(), MAX_PAGE_SIZE);
        assert!(lister.calls().iter().all(|(_, max_keys)| *max_keys == 1000));
    }

    #[test]
    fn the_one_where_page_sizes_are_clamped_on_both_ends() {
        assert_eq!(page_size_for(10), 10);
        assert_eq!(page_size_for(1000), 1000);
        assert_eq!(page_size_for(1001), 1000);
        assert_eq!(page_size_for(0), 1);
    }

    #[tokio::test]
    async fn the_one_where_small_result_sizes_are_requested_exactly() {
        let store = Arc::new(InMemoryStore::new());
        for id in 0..25u64 {
            store
                .insert(&ObjectRef::for_record("b", "p", id), b"{}".to_vec())
                .await;
        }

        let mut scanner = PaginatedScanner::new(store.clone(), "b", "p", 10)
            .await
            .expect("💀 first page");
        let keys = drain(&mut scanner).await;

        assert_eq!(keys.len(), 25);
        let calls = store.list_log().await;
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|call| call.max_keys == 10));
        assert_eq!(scanner.pages_fetched(), 3);
    }

    #[tokio::test]
    async fn the_one_where_a_failing_page_surfaces_as_a_listing_failure() {
        let lister = ScriptedLister::with_pages(vec![
            page(&["k1"], Some("m1")),
            Err("💀 503 SlowDown".to_string()),
        ]);
        let mut scanner = PaginatedScanner::new(lister, "b", "p", 1)
            .await
            .expect("💀 first page");

        assert_eq!(scanner.next().await.expect("💀 k1").key, "k1");
        match scanner.next().await {
            Err(ProbeError::ListingFailure { marker, .. }) => {
                assert_eq!(marker.as_deref(), Some("m1"))
            }
            other => panic!("💀 expected ListingFailure, got {other:?}"),
        }
        // -- 🔙 the marker survived the failure; the scanner still knows there's more
        assert!(scanner.has_next());
    }

    #[tokio::test]
    async fn the_one_where_the_first_page_failing_fails_construction() {
        let lister = ScriptedLister::with_pages(vec![Err("💀 AccessDenied".to_string())]);
        let result = PaginatedScanner::new(lister, "b", "p", 10).await;
        assert!(matches!(result, Err(ProbeError::ListingFailure { .. })));
    }

    #[tokio::test]
    async fn the_one_where_a_backend_ignoring_max_keys_overflows_the_buffer() {
        let lister = ScriptedLister::with_pages(vec![page(&["k1", "k2", "k3"], None)]);
        let result = PaginatedScanner::new(lister, "b", "p", 2).await;
        assert!(matches!(
            result,
            Err(ProbeError::PageOverflow {
                returned: 3,
                capacity: 2
            })
        ));
    }

    #[tokio::test]
    async fn the_one_where_the_stream_yields_the_same_sequence() {
        let lister = ScriptedLister::with_pages(vec![page(&["k1", "k2"], Some("m1")), page(&["k3"], None)]);
        let scanner = PaginatedScanner::new(lister, "b", "p", 2)
            .await
            .expect("💀 first page");

        let objects: Vec<ObjectRef> = scanner
            .into_stream()
            .try_collect()
            .await
            .expect("💀 stream");
        let keys: Vec<_> = objects.into_iter().map(|o| o.key).collect();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);
    }

    #[tokio::test]
    async fn the_one_where_a_trailing_empty_page_quietly_ends_the_stream() {
        let lister = ScriptedLister::with_pages(vec![page(&["k1"], Some("m1")), page(&[], None)]);
        let scanner = PaginatedScanner::new(lister, "b", "p", 10)
            .await
            .expect("💀 first page");

        let objects: Vec<ObjectRef> = scanner
            .into_stream()
            .try_collect()
            .await
            .expect("💀 an empty last page is the end of the listing, not an error");
        let keys: Vec<_> = objects.into_iter().map(|o| o.key).collect();
        assert_eq!(keys, vec!["k1"]);
    }

    #[tokio::test]
    async fn the_one_where_a_failing_page_still_ends_the_stream_with_an_error() {
        let lister = ScriptedLister::with_pages(vec![
            page(&["k1"], Some("m1")),
            Err("the bucket is on fire".to_string()),
        ]);
        let scanner = PaginatedScanner::new(lister, "b", "p", 10)
            .await
            .expect("💀 first page");

        let result: ProbeResult<Vec<ObjectRef>> = scanner.into_stream().try_collect().await;
        assert!(matches!(result, Err(ProbeError::ListingFailure { .. })));
    }
}
