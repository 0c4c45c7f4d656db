// ai
//! ✍️ BulkWriter — a hundred tiny objects, thirty pairs of hands, one barrier.
//!
//! 🎬 The write phase. Ids `0..=no_of_records` are sliced into chunks of
//! `chunk_size`, every chunk becomes a [`WriteTask`], and the tasks are handed
//! to a [`WorkerPool`] that exists only for the length of this call. Each task
//! writes its ids in ascending order, one `put` per id, with SSE-KMS
//! parameters when encryption is on. When the last task settles the pool is
//! torn down and the verdict is in: either everything landed, or we say
//! exactly how much didn't.
//!
//! 🧠 Knowledge graph:
//! - `partition()`: half-open chunks covering `[0, no_of_records]` exactly once, no overrun
//! - `RecordWriter`: the `TaskHandler` a pool worker runs per chunk
//! - A task stops at its first failing put; its siblings never notice
//! - Any failed task turns the whole phase into `WritePhaseFailed`, with counts

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, trace};

use crate::backends::ObjectStore;
use crate::common::{ObjectRef, Record, SseParams, WriteTask};
use crate::errors::{ProbeError, ProbeResult, StoreError};
use crate::progress::ProgressMetrics;
use crate::workers::{TaskHandler, WorkerPool};

/// 📋 What to write, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub prefix: String,
    pub encrypt: bool,
    /// 🔑 Only meaningful when `encrypt` is on.
    pub bucket_key_enabled: bool,
    pub no_of_records: u64,
    pub chunk_size: u64,
}

/// 📊 How the write phase went, when it went well.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub tasks_total: usize,
    /// 🎯 Ids the partitioning asked for: `no_of_records + 1`.
    pub records_expected: u64,
    pub tasks_failed: usize,
    pub records_written: u64,
    pub bytes_written: u64,
}

/// 🔪 Slices `[0, no_of_records]` into half-open chunks of `chunk_size` ids.
///
/// Every id lands in exactly one chunk; the last chunk is cut short instead of
/// running past `no_of_records`.
pub fn partition(no_of_records: u64, chunk_size: u64) -> ProbeResult<Vec<WriteTask>> {
    if chunk_size == 0 {
        return Err(ProbeError::InvalidConfig(
            "chunk_size must be at least 1; a chunk of nothing is a very long loop".to_string(),
        ));
    }
    let end_exclusive = no_of_records.saturating_add(1);
    let mut tasks = Vec::new();
    let mut from = 0u64;
    while from < end_exclusive {
        let to_exclusive = from.saturating_add(chunk_size).min(end_exclusive);
        tasks.push(WriteTask { from, to_exclusive });
        from = to_exclusive;
    }
    Ok(tasks)
}

#[derive(Debug, Clone, Copy, Default)]
struct ChunkStats {
    records: u64,
    bytes: u64,
}

/// 🧵 Writes one chunk of records. One of these is shared by every pool worker.
#[derive(Debug)]
struct RecordWriter<S: ObjectStore + ?Sized> {
    store: Arc<S>,
    bucket: String,
    prefix: String,
    sse: Option<SseParams>,
}

#[async_trait]
impl<S: ObjectStore + ?Sized + 'static> TaskHandler<WriteTask> for RecordWriter<S> {
    type Output = ChunkStats;

    async fn handle(&self, task: &WriteTask) -> ProbeResult<ChunkStats> {
        info!("🚀 triggered write for ids {}", task);
        let mut stats = ChunkStats::default();

        for id in task.ids() {
            let object = ObjectRef::for_record(self.bucket.as_str(), &self.prefix, id);
            let failed = |source: StoreError| ProbeError::WriteTaskFailure {
                from: task.from,
                to_exclusive: task.to_exclusive,
                failed_id: id,
                written: stats.records,
                source,
            };

            let body = Record::new(id).to_bytes().map_err(|e| failed(e.into()))?;
            let body_len = body.len() as u64;
            let ack = self
                .store
                .put(&object, body, self.sse.as_ref())
                .await
                .map_err(|e| failed(e.into()))?;

            trace!(
                "🔒 put {}: bucket key enabled {:?}, kms key {:?}",
                object,
                ack.bucket_key_enabled,
                ack.kms_key_id
            );
            stats.records += 1;
            stats.bytes += body_len;
        }

        info!("✅ done with ids {}", task);
        Ok(stats)
    }
}

/// ✍️ The write phase.
#[derive(Debug)]
pub struct BulkWriter<S: ObjectStore + ?Sized> {
    store: Arc<S>,
    bucket: String,
    kms_key_id: Option<String>,
    worker_pool_size: usize,
    queue_capacity: usize,
    show_progress: bool,
}

impl<S: ObjectStore + ?Sized + 'static> BulkWriter<S> {
    pub fn new(
        store: Arc<S>,
        bucket: impl Into<String>,
        kms_key_id: Option<String>,
        worker_pool_size: usize,
        queue_capacity: usize,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            kms_key_id,
            worker_pool_size,
            queue_capacity,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// 🔒 `Some` iff encryption is on; a missing key id with encryption on is a config bug.
    fn sse_params(&self, request: &WriteRequest) -> ProbeResult<Option<SseParams>> {
        if !request.encrypt {
            return Ok(None);
        }
        match self.kms_key_id.as_deref() {
            Some(kms_key_id) if !kms_key_id.trim().is_empty() => Ok(Some(SseParams {
                kms_key_id: kms_key_id.to_string(),
                bucket_key_enabled: request.bucket_key_enabled,
            })),
            _ => Err(ProbeError::InvalidConfig(
                "encrypt = true needs a kms_key_id (or the KMS_KEY_ID env var)".to_string(),
            )),
        }
    }

    /// 🚀 Writes every record of `request` and waits for all of them.
    pub async fn write(&self, request: &WriteRequest) -> ProbeResult<WriteReport> {
        let sse = self.sse_params(request)?;
        let tasks = partition(request.no_of_records, request.chunk_size)?;
        let tasks_total = tasks.len();
        let expected_records: u64 = tasks.iter().map(WriteTask::len).sum();

        info!(
            "✍️ writing {} records under s3://{}/{} in {} tasks on {} workers (encrypt: {}, bucket key: {})",
            expected_records,
            self.bucket,
            request.prefix,
            tasks_total,
            self.worker_pool_size,
            request.encrypt,
            request.bucket_key_enabled
        );

        let handler = Arc::new(RecordWriter {
            store: self.store.clone(),
            bucket: self.bucket.clone(),
            prefix: request.prefix.clone(),
            sse,
        });
        let mut progress = ProgressMetrics::new("write", expected_records, self.show_progress);

        // -- 🏭 the pool lives exactly as long as this call
        let pool = WorkerPool::new(self.worker_pool_size, self.queue_capacity);
        let outcomes = pool
            .run_all(tasks, handler, |outcome| match &outcome.result {
                Ok(stats) => progress.update(stats.bytes, stats.records),
                Err(ProbeError::WriteTaskFailure { written, .. }) => progress.update(0, *written),
                Err(_) => {}
            })
            .await
            .map_err(|source| ProbeError::PoolFailure {
                phase: "write",
                source: source.into(),
            })?;
        progress.finish();

        let mut report = WriteReport {
            tasks_total,
            records_expected: expected_records,
            ..WriteReport::default()
        };
        let mut first_failure = None;
        for outcome in outcomes {
            match outcome.result {
                Ok(stats) => {
                    report.records_written += stats.records;
                    report.bytes_written += stats.bytes;
                }
                Err(err) => {
                    error!("💀 task {} on worker {} failed: {}", outcome.task, outcome.worker_id, err);
                    if let ProbeError::WriteTaskFailure { written, .. } = &err {
                        report.records_written += written;
                    }
                    report.tasks_failed += 1;
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }

        info!(
            "🏁 done writing: {} records in {} tasks, {} failed, {:.2?}",
            report.records_written,
            report.tasks_total,
            report.tasks_failed,
            progress.elapsed()
        );

        match first_failure {
            None => Ok(report),
            Some(first_failure) => Err(ProbeError::WritePhaseFailed {
                failed_tasks: report.tasks_failed,
                total_tasks: report.tasks_total,
                records_written: report.records_written,
                first_failure: Box::new(first_failure),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryStore;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn request(no_of_records: u64, chunk_size: u64, encrypt: bool, bucket_key_enabled: bool) -> WriteRequest {
        WriteRequest {
            prefix: "prefix".to_string(),
            encrypt,
            bucket_key_enabled,
            no_of_records,
            chunk_size,
        }
    }

    fn writer(store: &InMemoryStore, kms_key_id: Option<&str>, pool_size: usize) -> BulkWriter<InMemoryStore> {
        BulkWriter::new(
            Arc::new(store.clone()),
            "bucket",
            kms_key_id.map(str::to_string),
            pool_size,
            16,
        )
    }

    #[test]
    fn the_one_where_25_records_in_chunks_of_10_make_three_tasks() {
        let tasks = partition(25, 10).expect("💀 partition");
        assert_eq!(
            tasks,
            vec![
                WriteTask { from: 0, to_exclusive: 10 },
                WriteTask { from: 10, to_exclusive: 20 },
                WriteTask { from: 20, to_exclusive: 26 },
            ]
        );
    }

    #[test]
    fn the_one_where_every_id_is_covered_exactly_once() {
        for (n, c) in [(0, 1), (0, 10), (9, 10), (10, 10), (11, 10), (100, 10), (99, 7), (5, 100)] {
            let tasks = partition(n, c).expect("💀 partition");
            let ids: Vec<u64> = tasks.iter().flat_map(WriteTask::ids).collect();
            assert_eq!(ids, (0..=n).collect::<Vec<_>>(), "gap, overlap or overrun for n={n}, c={c}");
            assert!(tasks.iter().all(|t| t.len() <= c && !t.is_empty()));
        }
    }

    #[test]
    fn the_one_where_a_zero_chunk_size_is_refused() {
        assert!(matches!(partition(10, 0), Err(ProbeError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn the_one_where_every_id_gets_exactly_one_put() {
        let store = InMemoryStore::new();
        let report = writer(&store, Some("kms"), 30)
            .write(&request(25, 10, true, false))
            .await
            .expect("💀 write phase");

        assert_eq!(report.tasks_total, 3);
        assert_eq!(report.tasks_failed, 0);
        assert_eq!(report.records_expected, 26);
        assert_eq!(report.records_written, 26);

        let puts = store.put_log().await;
        let keys: Vec<String> = puts.iter().map(|p| p.object.key.clone()).collect();
        let unique: BTreeSet<String> = keys.iter().cloned().collect();
        assert_eq!(keys.len(), unique.len(), "duplicate puts");
        let expected: BTreeSet<String> = (0..=25).map(|id| format!("prefix/data-{id}")).collect();
        assert_eq!(unique, expected);
    }

    #[tokio::test]
    async fn the_one_where_encrypted_puts_all_carry_the_kms_key_and_bucket_key_flag() {
        let store = InMemoryStore::new();
        writer(&store, Some("arn:aws:kms:us-east-1:123:key/abc"), 4)
            .write(&request(20, 3, true, true))
            .await
            .expect("💀 write phase");

        let puts = store.put_log().await;
        assert_eq!(puts.len(), 21);
        let expected = SseParams {
            kms_key_id: "arn:aws:kms:us-east-1:123:key/abc".to_string(),
            bucket_key_enabled: true,
        };
        assert!(puts.iter().all(|p| p.sse.as_ref() == Some(&expected)));
    }

    #[tokio::test]
    async fn the_one_where_unencrypted_puts_carry_nothing_even_with_a_key_configured() {
        let store = InMemoryStore::new();
        writer(&store, Some("kms"), 4)
            .write(&request(9, 5, false, true))
            .await
            .expect("💀 write phase");

        let puts = store.put_log().await;
        assert_eq!(puts.len(), 10);
        assert!(puts.iter().all(|p| p.sse.is_none()));
    }

    #[tokio::test]
    async fn the_one_where_encryption_without_a_key_fails_before_any_put() {
        let store = InMemoryStore::new();
        let result = writer(&store, None, 4).write(&request(9, 5, true, false)).await;

        assert!(matches!(result, Err(ProbeError::InvalidConfig(_))));
        assert!(store.put_log().await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_one_broken_chunk_does_not_stop_the_others() {
        let store = InMemoryStore::new();
        store.fail_puts_for(["prefix/data-13"]).await;

        let result = writer(&store, Some("kms"), 30)
            .write(&request(25, 10, true, false))
            .await;

        match result {
            Err(ProbeError::WritePhaseFailed {
                failed_tasks,
                total_tasks,
                records_written,
                first_failure,
            }) => {
                assert_eq!(failed_tasks, 1);
                assert_eq!(total_tasks, 3);
                // -- 📊 10 + 3 (before id 13) + 6
                assert_eq!(records_written, 19);
                assert!(matches!(
                    *first_failure,
                    ProbeError::WriteTaskFailure {
                        from: 10,
                        failed_id: 13,
                        written: 3,
                        ..
                    }
                ));
            }
            other => panic!("💀 expected WritePhaseFailed, got {other:?}"),
        }

        // -- ✅ the sibling chunks finished in full; the broken one stopped at its first failure
        let log = store.put_log().await;
        let attempted: BTreeSet<u64> = log
            .iter()
            .filter_map(|p| p.object.key.strip_prefix("prefix/data-"))
            .filter_map(|id| id.parse().ok())
            .collect();
        let expected: BTreeSet<u64> = (0..=13).chain(20..=25).collect();
        assert_eq!(attempted, expected);
        assert_eq!(store.len().await, 19);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_puts_never_outnumber_the_workers() {
        let store = InMemoryStore::new().with_put_latency(Duration::from_millis(2));
        let report = writer(&store, None, 3)
            .write(&request(99, 5, false, false))
            .await
            .expect("💀 write phase");

        assert_eq!(report.records_written, 100);
        assert!(store.max_in_flight_puts() <= 3);
        assert!(store.max_in_flight_puts() >= 1);
    }

    #[tokio::test]
    async fn the_one_where_zero_records_still_means_record_zero() {
        let store = InMemoryStore::new();
        let report = writer(&store, None, 30)
            .write(&request(0, 10, false, false))
            .await
            .expect("💀 write phase");

        assert_eq!(report.tasks_total, 1);
        assert_eq!(report.records_written, 1);
        assert_eq!(store.put_log().await[0].object.key, "prefix/data-0");
    }
}
