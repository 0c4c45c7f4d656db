// ai
//! 📥 BulkReader — did it actually land? Let's go look.
//!
//! 🎬 The read phase. One scanner, one object at a time, strictly in listing
//! order. Every object is fetched, parsed back into a [`Record`], and kept.
//! The pass stops at `max_to_read` records or when the listing runs dry,
//! whichever happens first. The first object that won't come back, or won't
//! parse, ends the whole pass. It's a probe, not a salvage operation.
//!
//! 🧠 Knowledge graph:
//! - `max_to_read` doubles as the scanner's results size, so the page size is `min(max, 1000)`
//! - `None` means the default cap of 1000
//! - Progress is logged every quarter of the cap (skipped when the cap is under 4)
//! - A record parsed from `{prefix}/data-{i}` must carry id `i`, or the pass fails

use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::backends::ObjectStore;
use crate::common::{Record, record_id_from_key};
use crate::errors::{ProbeError, ProbeResult, StoreError};
use crate::progress::ProgressMetrics;
use crate::scanner::PaginatedScanner;

/// 📏 How many records a read pass takes when nobody says otherwise.
pub const DEFAULT_MAX_TO_READ: usize = 1000;

/// 📊 Everything the read pass brought back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadReport {
    pub records: Vec<Record>,
    pub count: usize,
    pub pages_fetched: usize,
}

/// 📥 The read phase.
#[derive(Debug)]
pub struct BulkReader<S: ObjectStore + ?Sized> {
    store: Arc<S>,
    bucket: String,
    show_progress: bool,
}

impl<S: ObjectStore + ?Sized> BulkReader<S> {
    pub fn new(store: Arc<S>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// 🔎 Reads up to `max_to_read` records under `prefix`, in listing order.
    pub async fn read(&self, prefix: &str, max_to_read: Option<usize>) -> ProbeResult<ReadReport> {
        let cap = max_to_read.unwrap_or(DEFAULT_MAX_TO_READ);
        if cap == 0 {
            info!("📥 asked to read 0 records under s3://{}/{}. Done already.", self.bucket, prefix);
            return Ok(ReadReport::default());
        }

        info!("📥 reading up to {} records under s3://{}/{}", cap, self.bucket, prefix);
        let mut scanner =
            PaginatedScanner::new(self.store.clone(), self.bucket.as_str(), prefix, cap).await?;
        let quarter = cap / 4;
        let mut progress = ProgressMetrics::new("read", cap as u64, self.show_progress);
        let mut records = Vec::with_capacity(scanner.page_size());

        while records.len() < cap && scanner.has_next() {
            let object = match scanner.next().await {
                Ok(object) => object,
                // -- 🏁 trailing empty pages can promise more than they deliver
                Err(ProbeError::EmptyIteration) => break,
                Err(err) => return Err(err),
            };

            let read_failure = |source: StoreError| ProbeError::ReadFailure {
                key: object.key.clone(),
                records_read: records.len(),
                source,
            };
            let fetched = self
                .store
                .get(&object)
                .await
                .map_err(|e| read_failure(e.into()))?;
            trace!(
                "🔒 get {}: {:?} bytes, bucket key enabled {:?}, kms key {:?}",
                object,
                fetched.content_length,
                fetched.bucket_key_enabled,
                fetched.kms_key_id
            );
            let record = Record::from_bytes(&fetched.body).map_err(|e| read_failure(e.into()))?;
            if let Some(expected_id) = record_id_from_key(prefix, &object.key) {
                if record.id != expected_id {
                    return Err(read_failure(
                        format!("💀 {object} holds id {} instead of {expected_id}", record.id).into(),
                    ));
                }
            }

            records.push(record);
            progress.update(fetched.body.len() as u64, 1);
            if quarter > 0 && records.len() % quarter == 0 {
                info!("📈 read {} of {} records", records.len(), cap);
            }
        }
        progress.finish();

        let count = records.len();
        debug!("📦 records read: {:?}", records);
        info!(
            "🏁 total records read: {} ({} pages, {:.2?})",
            count,
            scanner.pages_fetched(),
            progress.elapsed()
        );
        Ok(ReadReport {
            records,
            count,
            pages_fetched: scanner.pages_fetched(),
        })
    }
}
