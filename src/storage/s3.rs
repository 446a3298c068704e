//! S3 implementation of [`ObjectStore`]

use super::error::{StorageError, StorageResult};
use super::types::{ListEntry, ListPage, PartRecord};
use super::{ObjectBody, ObjectStore};
use crate::credentials::CredentialBundle;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Provider name attached to credentials obtained by role assumption
const ASSUMED_ROLE_PROVIDER: &str = "bucketferry-assumed-role";

/// Connection settings for an [`S3Store`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3StoreConfig {
    /// AWS region (e.g., "us-east-1"); falls back to the default provider chain
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint URL (for S3-compatible services like MinIO)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Path-style addressing (required for some S3-compatible services)
    #[serde(default)]
    pub force_path_style: bool,

    /// Per-operation timeout in seconds; `None` keeps the SDK default
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Object store backed by AWS S3 or an S3-compatible service
///
/// Requests are always signed with SigV4; the client never falls back to an
/// unsigned or legacy signing mode.
#[derive(Clone)]
pub struct S3Store {
    client: AwsS3Client,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store").finish_non_exhaustive()
    }
}

impl S3Store {
    /// Build a store that uses the caller's ambient identity (environment,
    /// profile, instance role, ...)
    pub async fn from_env(config: &S3StoreConfig) -> StorageResult<Self> {
        let client = Self::build_aws_client(config, None).await?;
        Ok(Self { client })
    }

    /// Build a store that signs every request with an assumed-role bundle
    pub async fn with_credentials(
        config: &S3StoreConfig,
        bundle: &CredentialBundle,
    ) -> StorageResult<Self> {
        let credentials = Credentials::new(
            bundle.access_key_id(),
            bundle.secret_access_key().expose_secret(),
            Some(bundle.session_token().expose_secret().to_string()),
            bundle.expiry(),
            ASSUMED_ROLE_PROVIDER,
        );
        let client = Self::build_aws_client(config, Some(credentials)).await?;
        Ok(Self { client })
    }

    /// Wrap an existing SDK client
    pub fn from_client(client: AwsS3Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying AWS S3 client
    pub fn aws_client(&self) -> &AwsS3Client {
        &self.client
    }

    /// Build the AWS SDK S3 client from configuration
    async fn build_aws_client(
        config: &S3StoreConfig,
        credentials: Option<Credentials>,
    ) -> StorageResult<AwsS3Client> {
        if let Some(endpoint) = &config.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(StorageError::InvalidConfig(format!(
                    "Endpoint must be an http(s) URL: {}",
                    endpoint
                )));
            }
        }

        let mut aws_config_loader = aws_config::defaults(BehaviorVersion::latest());

        let region_provider = if let Some(region_str) = &config.region {
            RegionProviderChain::first_try(Region::new(region_str.clone()))
        } else {
            RegionProviderChain::default_provider()
        };
        aws_config_loader = aws_config_loader.region(region_provider);

        if let Some(credentials) = credentials {
            aws_config_loader = aws_config_loader.credentials_provider(credentials);
        }

        let aws_config = aws_config_loader.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        if let Some(seconds) = config.timeout_seconds {
            let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
                .operation_timeout(Duration::from_secs(seconds))
                .build();
            s3_config_builder = s3_config_builder.timeout_config(timeout_config);
        }

        Ok(AwsS3Client::from_conf(s3_config_builder.build()))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object_stream(&self, bucket: &str, key: &str) -> StorageResult<ObjectBody> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::from(e)
                }
            })?;

        debug!(
            bucket,
            key,
            content_length = response.content_length(),
            "Opened object stream"
        );

        Ok(Box::pin(response.body.into_async_read()))
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ListPage> {
        let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);

        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let response = request.send().await.map_err(StorageError::from)?;

        let entries = response
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?.to_string();
                Some(ListEntry {
                    key,
                    size: obj.size().map(|s| s.max(0) as u64),
                })
            })
            .collect();

        let next_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(|s| s.to_string())
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_token,
        })
    }

    async fn open_session(&self, bucket: &str, key: &str) -> StorageResult<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::from(e)
                    .context(format!("CreateMultipartUpload s3://{}/{}", bucket, key))
            })?;

        response
            .upload_id()
            .ok_or_else(|| StorageError::MultipartUpload("No upload ID returned".to_string()))
            .map(|s| s.to_string())
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<PartRecord> {
        let size = data.len();

        let response = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(StorageError::from)?;

        let etag = response
            .e_tag()
            .ok_or_else(|| StorageError::MultipartUpload("No ETag returned for part".to_string()))?
            .to_string();

        Ok(PartRecord::new(part_number, etag, size))
    }

    async fn complete_session(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> StorageResult<()> {
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        let multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(multipart_upload)
            .send()
            .await
            .map_err(|e| {
                StorageError::from(e).context(format!(
                    "CompleteMultipartUpload s3://{}/{} ({} parts)",
                    bucket,
                    key,
                    parts.len()
                ))
            })?;

        Ok(())
    }

    async fn abort_session(&self, bucket: &str, key: &str, upload_id: &str) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }
}
