// ai
//! 💀 The taxonomy of sadness.
//!
//! Store collaborators speak `anyhow` (like every backend in this codebase).
//! The core speaks `ProbeError`, so the orchestrator can tell a listing that
//! died from a caller that asked an empty scanner for more. The underlying
//! collaborator error always rides along as `source`, so `err.chain()` in the
//! CLI still tells the whole story. 🦆

use thiserror::Error;

/// 🔗 Boxed collaborator error. `anyhow::Error` converts into this for free.
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// 📡 A page fetch failed. Not retried here.
    #[error("💀 listing page for s3://{bucket}/{prefix} (marker: {marker:?}) failed")]
    ListingFailure {
        bucket: String,
        prefix: String,
        marker: Option<String>,
        #[source]
        source: StoreError,
    },

    /// 🐛 `next()` on a drained scanner. Caller bug, not an outage.
    #[error("💀 next() called on an exhausted scanner. Check has_next() first, it's free.")]
    EmptyIteration,

    /// 📦 The backend ignored max-keys and handed back more than the buffer holds.
    #[error("💀 listing page returned {returned} summaries but the page size is {capacity}")]
    PageOverflow { returned: usize, capacity: usize },

    /// 🧵 One write task hit a failing put (or panicked). Siblings are unaffected.
    #[error("💀 write task for ids [{from}, {to_exclusive}) failed at id {failed_id} after {written} puts")]
    WriteTaskFailure {
        from: u64,
        to_exclusive: u64,
        failed_id: u64,
        written: u64,
        #[source]
        source: StoreError,
    },

    /// 💥 A task panicked. The worker caught it and kept going.
    #[error("💀 a task on pool worker {worker_id} panicked: {message}")]
    TaskPanicked { worker_id: usize, message: String },

    /// 📊 The join barrier came back with at least one failed task.
    #[error(
        "💀 write phase finished with {failed_tasks} of {total_tasks} tasks failed ({records_written} records written)"
    )]
    WritePhaseFailed {
        failed_tasks: usize,
        total_tasks: usize,
        records_written: u64,
        /// 🔍 The first failure to settle. The rest are in the logs.
        #[source]
        first_failure: Box<ProbeError>,
    },

    /// 🏭 The pool itself fell over (a worker could not be joined), not a task in it.
    #[error("💀 the worker pool for the {phase} phase broke down")]
    PoolFailure {
        phase: &'static str,
        #[source]
        source: StoreError,
    },

    /// 📥 A get or a parse went sideways. The whole read pass stops here.
    #[error("💀 reading {key} failed after {records_read} records")]
    ReadFailure {
        key: String,
        records_read: usize,
        #[source]
        source: StoreError,
    },

    /// 🔧 Knobs turned to positions that don't exist.
    #[error("💀 invalid configuration: {0}")]
    InvalidConfig(String),
}
