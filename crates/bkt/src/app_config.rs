//! 🔧 App Configuration — the sacred TOML-to-struct pipeline, now with KMS keys.
//!
//! 📡 "Which bucket? Which key? Was bucket key on or off?" — the three questions
//! every probe run asks, and the three answers nobody wrote down. 🦆
//!
//! 🏗️ Powered by Figment. Three layers, merged in this order (later wins):
//! 1. the bare env vars the probe has always read: `BUCKET_NAME`, `KMS_KEY_ID`,
//!    `ACCESS_KEY`, `SECRET_KEY`, `REGION`
//! 2. `BKT_*` env vars, nested with `__` (`BKT_WRITE__CHUNK_SIZE=5`)
//! 3. an optional TOML file

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::S3StoreConfig;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🗂️ Every record lives at `{prefix}/data-{id}`.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub write: WriteConfig,
    #[serde(default)]
    pub read: ReadConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

fn default_prefix() -> String {
    "prefix".to_string()
}

/// 🎭 Which store to cast.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    S3,
    /// 🧪 A `BTreeMap` wearing a bucket costume. For dry runs.
    InMemory,
}

/// 🪣 The bucket, and how to reach it.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default)]
    pub bucket: String,
    /// 🔌 Region, credentials, endpoint. Ignored by the in-memory store.
    #[serde(flatten)]
    pub s3: S3StoreConfig,
}

/// ✍️ Knobs for the write phase.
#[derive(Debug, Deserialize, Clone)]
pub struct WriteConfig {
    #[serde(default = "yes")]
    pub enabled: bool,
    #[serde(default = "yes")]
    pub encrypt: bool,
    #[serde(default)]
    pub bucket_key_enabled: bool,
    /// 🔑 Required when `encrypt` is on. Checked before anything is written.
    #[serde(default)]
    pub kms_key_id: Option<String>,
    #[serde(default = "default_no_of_records")]
    pub no_of_records: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            encrypt: true,
            bucket_key_enabled: false,
            kms_key_id: None,
            no_of_records: default_no_of_records(),
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_no_of_records() -> u64 {
    100
}

fn default_chunk_size() -> u64 {
    10
}

/// 📥 Knobs for the read phase.
#[derive(Debug, Deserialize, Clone)]
pub struct ReadConfig {
    #[serde(default = "yes")]
    pub enabled: bool,
    #[serde(default = "default_max_to_read")]
    pub max_to_read: Option<usize>,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_to_read: default_max_to_read(),
        }
    }
}

fn default_max_to_read() -> Option<usize> {
    Some(10)
}

/// 🏭 How hard to work.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 🧵 Fixed number of write workers. Also the ceiling on concurrent puts.
    #[serde(default = "default_worker_pool_size", alias = "thread_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "yes")]
    pub show_progress: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            queue_capacity: default_queue_capacity(),
            show_progress: true,
        }
    }
}

fn default_worker_pool_size() -> usize {
    30
}

fn default_queue_capacity() -> usize {
    64
}

fn yes() -> bool {
    true
}

/// 🗺️ Where the bare env vars land in the config tree.
const LEGACY_ENV_VARS: [(&str, &str); 5] = [
    ("BUCKET_NAME", "store.bucket"),
    ("KMS_KEY_ID", "write.kms_key_id"),
    ("ACCESS_KEY", "store.access_key"),
    ("SECRET_KEY", "store.secret_key"),
    ("REGION", "store.region"),
];

fn legacy_env() -> Env {
    let names: Vec<&str> = LEGACY_ENV_VARS.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        LEGACY_ENV_VARS
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, path)| (*path).into())
            .unwrap_or_else(|| key.as_str().into())
    })
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// - `None` → env vars only. Defaults fill in the rest.
/// - `Some(path)` → env vars + TOML file, merged. TOML wins on conflicts.
///
/// 💀 Returns an error if the config is unparseable, with a message that says
/// which layers were involved.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new()
        .merge(legacy_env())
        .merge(Env::prefixed("BKT_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (BKT_*, BUCKET_NAME, ...). \
             The file exists in our hearts, but apparently not in valid TOML.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (BKT_*, BUCKET_NAME, ...). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}
