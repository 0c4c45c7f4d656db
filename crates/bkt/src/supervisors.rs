//! 🎬 *[camera pans across a bucket full of tiny JSON files]*
//! 🎬 "In a world where objects were written encrypted..."
//! 🎬 "One supervisor dared to read them all back."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor: builds the store from config, runs the write phase to
//! completion, then the read phase, and reports both. If the write phase comes
//! back with failures the read phase never starts; reading a half-written
//! prefix proves nothing.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app_config::{AppConfig, StoreKind};
use crate::backends::{InMemoryStore, S3Store, StoreBackend};
use crate::errors::ProbeError;
use crate::reader::{BulkReader, DEFAULT_MAX_TO_READ, ReadReport};
use crate::writer::{BulkWriter, WriteReport, WriteRequest};

/// 🧾 What one run did. `None` means the phase was switched off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub write: Option<WriteReport>,
    pub read: Option<ReadReport>,
    /// 🎯 How many records the read phase should have found: what was just
    /// written, capped by `max_to_read`. `None` unless both phases ran.
    pub read_expected: Option<u64>,
}

impl RunReport {
    /// 🤔 True when the read phase came back with fewer records than were written.
    pub fn read_shortfall(&self) -> bool {
        match (&self.read, self.read_expected) {
            (Some(read), Some(expected)) => (read.count as u64) < expected,
            _ => false,
        }
    }
}

/// 📦 Hovers over the two phases, asking "is it done yet?" until it is.
pub(crate) struct Supervisor {
    app_config: AppConfig,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 🎭 Casts the store named by config.
    async fn build_store(&self) -> Result<StoreBackend> {
        let store_config = &self.app_config.store;
        match store_config.kind {
            StoreKind::S3 => {
                if store_config.bucket.trim().is_empty() {
                    return Err(ProbeError::InvalidConfig(
                        "store.bucket (or BUCKET_NAME) is required for the s3 store".to_string(),
                    )
                    .into());
                }
                let store = S3Store::new(&store_config.s3)
                    .await
                    .context("💀 couldn't build the S3 client")?;
                Ok(StoreBackend::S3(store))
            }
            StoreKind::InMemory => Ok(StoreBackend::InMemory(InMemoryStore::new())),
        }
    }

    /// 🚀 Build the store, then write, then read.
    pub(crate) async fn run(&self) -> Result<RunReport> {
        let store = self.build_store().await?;
        self.run_on(Arc::new(store)).await
    }

    async fn run_on(&self, store: Arc<StoreBackend>) -> Result<RunReport> {
        let AppConfig {
            prefix,
            store: store_config,
            write,
            read,
            runtime,
        } = &self.app_config;
        let bucket = store_config.bucket.as_str();
        let mut report = RunReport::default();

        if write.enabled {
            let writer = BulkWriter::new(
                store.clone(),
                bucket,
                write.kms_key_id.clone(),
                runtime.worker_pool_size,
                runtime.queue_capacity,
            )
            .with_progress(runtime.show_progress);
            let request = WriteRequest {
                prefix: prefix.clone(),
                encrypt: write.encrypt,
                bucket_key_enabled: write.bucket_key_enabled,
                no_of_records: write.no_of_records,
                chunk_size: write.chunk_size,
            };
            let written = writer
                .write(&request)
                .await
                .context("💀 write phase failed, so the read phase was skipped")?;
            report.write = Some(written);
        } else {
            info!("⏭️ write phase disabled");
        }

        if read.enabled {
            let reader = BulkReader::new(store, bucket).with_progress(runtime.show_progress);
            let read_back = reader
                .read(prefix, read.max_to_read)
                .await
                .context("💀 read phase failed")?;
            let cap = read.max_to_read.unwrap_or(DEFAULT_MAX_TO_READ) as u64;
            report.read_expected = report.write.as_ref().map(|w| w.records_written.min(cap));
            report.read = Some(read_back);
            if report.read_shortfall() {
                warn!(
                    "🤔 read back {:?} records, expected at least {:?}",
                    report.read.as_ref().map(|r| r.count),
                    report.read_expected
                );
            }
        } else {
            info!("⏭️ read phase disabled");
        }

        Ok(report)
    }
}
