// ai
//! 🪣📡🔒 S3 Store — the real bucket, with the real KMS key, and the real bill.
//!
//! COLD OPEN — EXT. DATA CENTER — 3:47 AM
//!
//! Someone flipped "Bucket Key: Enabled" in the console. Someone else swore
//! it would cut the KMS request bill by 99%. Nobody checked whether objects
//! written before the flip still read back. This module is how we check.
//!
//! 🧠 Knowledge graph:
//! - `S3StoreConfig`: bucket-independent client knobs (region, static creds, endpoint, path style)
//! - `S3Store`: wraps `aws_sdk_s3::Client`, implements [`ObjectStore`]
//! - list → `ListObjects` (v1, marker-based). Truncated pages without a
//!   `NextMarker` continue from their last key, because S3 only sends
//!   `NextMarker` when a delimiter is involved.
//! - get → `GetObject`, body collected in memory (our objects are `{"id":N}`, not 4K movies)
//! - put → `PutObject` + `aws:kms` + key id + bucket-key flag when SSE is on

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::backends::ObjectStore;
use crate::common::{FetchedObject, ListingPage, ObjectRef, ObjectSummary, PutAck, SseParams};

/// 🔧 How to reach S3. The bucket itself lives in `StoreConfig`, next to the
/// in-memory flavor, because both backends need to know which bucket they pretend to be.
#[derive(Debug, Deserialize, Clone)]
pub struct S3StoreConfig {
    /// 🌎 Defaults to "us-east-1" — the Florida of AWS regions. Everyone ends up there eventually.
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// 🔑 Static access key. Both halves or neither; half a credential is no credential.
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// 📡 Custom endpoint for S3-compatible services (and for wiremock, shh).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

impl Default for S3StoreConfig {
    fn default() -> Self {
        Self {
            region: default_s3_region(),
            access_key: None,
            secret_key: None,
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

pub(crate) fn default_s3_region() -> String {
    // -- 🏖️ If you don't choose a region, the region chooses you. And it chose Florida.
    "us-east-1".to_string()
}

/// 🪣 The SDK-backed store.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    /// 🚀 Builds the SDK client.
    ///
    /// Static credentials win when both halves are configured. Otherwise the
    /// default provider chain runs: env vars → ~/.aws/config → IAM role → hope.
    pub async fn new(config: &S3StoreConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                debug!("🔑 using static credentials from config");
                loader = loader.credentials_provider(Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                    None,
                    "bkt-static",
                ));
            }
            (None, None) => debug!("🔑 no static credentials, the default provider chain is up"),
            _ => anyhow::bail!(
                "💀 access_key and secret_key come as a pair. We got one. \
                 Like a single sock: technically clothing, practically useless."
            ),
        }

        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> Result<ListingPage> {
        let max_keys = i32::try_from(max_keys)
            .context("💀 max_keys does not fit in an i32. S3 caps it at 1000 anyway.")?;

        let response = self
            .client
            .list_objects()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(max_keys)
            .set_marker(marker.map(str::to_string))
            .send()
            .await
            .context(format!(
                "💀 ListObjects for s3://{bucket}/{prefix} failed. \
                 Check: bucket name, region, credentials, s3:ListBucket permission."
            ))?;

        let summaries: Vec<ObjectSummary> = response
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                Some(ObjectSummary {
                    object: ObjectRef::new(bucket, key),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    etag: object.e_tag().map(str::to_string),
                })
            })
            .collect();

        // -- 🧭 NextMarker only shows up for delimited listings; otherwise the last key is the bookmark
        let next_marker = match response.next_marker() {
            Some(next) => Some(next.to_string()),
            None if response.is_truncated().unwrap_or(false) => {
                summaries.last().map(|s| s.object.key.clone())
            }
            None => None,
        };

        trace!(
            "📄 S3 page: {} summaries under s3://{}/{}, next marker: {:?}",
            summaries.len(),
            bucket,
            prefix,
            next_marker
        );
        Ok(ListingPage {
            summaries,
            next_marker,
        })
    }

    async fn get(&self, object: &ObjectRef) -> Result<FetchedObject> {
        let response = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .context(format!(
                "💀 GetObject failed for {object}. Listed it, couldn't read it. \
                 Check: s3:GetObject and kms:Decrypt on the key."
            ))?;

        let bucket_key_enabled = response.bucket_key_enabled();
        let kms_key_id = response.ssekms_key_id().map(str::to_string);
        let content_length = response.content_length().map(|len| len.max(0) as u64);
        let body = response
            .body
            .collect()
            .await
            .context(format!("💀 the body of {object} stopped flowing halfway"))?
            .into_bytes()
            .to_vec();

        Ok(FetchedObject {
            body,
            content_length,
            bucket_key_enabled,
            kms_key_id,
        })
    }

    async fn put(
        &self,
        object: &ObjectRef,
        body: Vec<u8>,
        sse: Option<&SseParams>,
    ) -> Result<PutAck> {
        let content_length = body.len() as i64;
        let mut request = self
            .client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .content_length(content_length)
            .body(ByteStream::from(body));

        if let Some(sse) = sse {
            request = request
                .server_side_encryption(ServerSideEncryption::AwsKms)
                .ssekms_key_id(&sse.kms_key_id)
                .bucket_key_enabled(sse.bucket_key_enabled);
        }

        let response = request.send().await.context(format!(
            "💀 PutObject failed for {object}. \
             Check: s3:PutObject, kms:GenerateDataKey on the key, and whether the key exists at all."
        ))?;

        Ok(PutAck {
            etag: response.e_tag().map(str::to_string),
            bucket_key_enabled: response.bucket_key_enabled(),
            kms_key_id: response.ssekms_key_id().map(str::to_string),
        })
    }
}
