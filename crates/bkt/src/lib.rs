//! 🪣 bkt — write a pile of tiny SSE-KMS objects, list them, read them back,
//! and find out whether "Bucket Key: Enabled" broke anything.
//!
//! The pieces, bottom up:
//! - [`backends`]: the [`ObjectStore`] seam, an S3 store and an in-memory one
//! - [`scanner`]: a paginated listing as one lazy sequence
//! - [`workers`]: a fixed-size pool with a join barrier
//! - [`writer`] / [`reader`]: the two phases
//! - `run`: both phases, in order, from an [`AppConfig`]

pub mod app_config;
pub mod backends;
pub mod common;
pub mod errors;
mod progress;
pub mod reader;
pub mod scanner;
mod supervisors;
pub mod workers;
pub mod writer;

use anyhow::{Context, Result};

pub use crate::app_config::AppConfig;
pub use crate::backends::{InMemoryStore, ObjectStore, S3Store, StoreBackend};
pub use crate::common::{ObjectRef, Record};
pub use crate::errors::{ProbeError, ProbeResult};
pub use crate::reader::{BulkReader, ReadReport};
pub use crate::scanner::PaginatedScanner;
pub use crate::supervisors::RunReport;
pub use crate::writer::{BulkWriter, WriteReport, WriteRequest};

use crate::supervisors::Supervisor;

/// 🚀 Runs the configured phases against the configured store.
pub async fn run(app_config: AppConfig) -> Result<RunReport> {
    Supervisor::new(app_config)
        .run()
        .await
        .context("💀 the probe did not make it to the end")
}
