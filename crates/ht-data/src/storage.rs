//! Remote object storage for staged partitions.
//!
//! Objects land at `{prefix}/{kind}/{file}` inside the configured bucket.
//! Uploads overwrite whatever is already there.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use ht_types::{HtResult, PartitionKind, StorageError};
use object_store::path::Path as ObjectPath;
use object_store::aws::{AmazonS3Builder, AwsCredentialProvider};
use object_store::{ObjectStore, ObjectStoreExt, PutPayload};
use serde::{Deserialize, Serialize};

/// Bucket plus key prefix, e.g. `s3://my-bucket/xgboost-iris`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub bucket: String,
    pub prefix: String,
}

impl StorageLocation {
    pub fn new(bucket: &str, prefix: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Parse an `s3://bucket[/prefix]` URI.
    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let rest = uri
            .strip_prefix("s3://")
            .ok_or_else(|| StorageError::InvalidLocation {
                location: uri.to_string(),
                reason: "expected an s3:// URI".to_string(),
            })?;

        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(StorageError::InvalidLocation {
                location: uri.to_string(),
                reason: "missing bucket name".to_string(),
            });
        }

        Ok(Self::new(bucket, prefix))
    }

    /// Object key for a partition file.
    pub fn object_key(&self, kind: PartitionKind, file: &str) -> String {
        if self.prefix.is_empty() {
            format!("{}/{}", kind, file)
        } else {
            format!("{}/{}/{}", self.prefix, kind, file)
        }
    }

    /// URI of the folder holding one partition, as consumed by a training channel.
    pub fn channel_uri(&self, kind: PartitionKind) -> String {
        if self.prefix.is_empty() {
            format!("s3://{}/{}/", self.bucket, kind)
        } else {
            format!("s3://{}/{}/{}/", self.bucket, self.prefix, kind)
        }
    }

    /// URI under which the service writes model artifacts.
    pub fn output_uri(&self) -> String {
        if self.prefix.is_empty() {
            format!("s3://{}/output", self.bucket)
        } else {
            format!("s3://{}/{}/output", self.bucket, self.prefix)
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "s3://{}", self.bucket)
        } else {
            write!(f, "s3://{}/{}", self.bucket, self.prefix)
        }
    }
}

/// What was written by a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub key: String,
    pub uri: String,
    pub size: u64,
}

/// Upload target backed by `object_store`.
pub struct RemoteStore {
    inner: Arc<dyn ObjectStore>,
    location: StorageLocation,
    credentials: Option<AwsCredentialProvider>,
}

impl fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStore")
            .field("location", &self.location)
            .finish()
    }
}

impl RemoteStore {
    /// S3 store using credentials and settings from the environment.
    pub fn s3(location: StorageLocation, region: Option<&str>) -> HtResult<Self> {
        let s3 = s3_builder(&location.bucket, region)
            .build()
            .map_err(|e| StorageError::Backend {
                message: format!("failed to create S3 client: {}", e),
            })?;

        Ok(Self {
            credentials: Some(Arc::clone(s3.credentials())),
            inner: Arc::new(s3),
            location,
        })
    }

    /// In-memory store for dry runs and tests.
    pub fn memory(location: StorageLocation) -> Self {
        Self {
            inner: Arc::new(object_store::memory::InMemory::new()),
            location,
            credentials: None,
        }
    }

    /// The credential chain the S3 client signs with; `None` for in-memory stores.
    pub fn credentials(&self) -> Option<AwsCredentialProvider> {
        self.credentials.clone()
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Put `bytes` at the partition's key, replacing any existing object.
    pub async fn upload(
        &self,
        kind: PartitionKind,
        file: &str,
        bytes: Vec<u8>,
    ) -> HtResult<UploadReceipt> {
        let key = self.location.object_key(kind, file);
        let size = bytes.len() as u64;
        let path = ObjectPath::from(key.as_str());

        self.inner
            .put(&path, PutPayload::from_bytes(Bytes::from(bytes)))
            .await
            .map_err(|e| map_store_error(&key, e))?;

        let uri = format!("s3://{}/{}", self.location.bucket, key);
        tracing::info!("Uploaded {} bytes to {}", size, uri);

        Ok(UploadReceipt { key, uri, size })
    }

    /// Check that an uploaded object exists with the uploaded size.
    pub async fn confirm(&self, receipt: &UploadReceipt) -> HtResult<()> {
        let path = ObjectPath::from(receipt.key.as_str());
        let found = match self.inner.head(&path).await {
            Ok(meta) => Some(meta.size as u64),
            Err(object_store::Error::NotFound { .. }) => None,
            Err(e) => return Err(map_store_error(&receipt.key, e).into()),
        };

        if found != Some(receipt.size) {
            return Err(StorageError::NotConfirmed {
                path: receipt.uri.clone(),
                expected: receipt.size,
                found,
            }
            .into());
        }

        tracing::debug!("Confirmed {} ({} bytes)", receipt.uri, receipt.size);
        Ok(())
    }

    /// Fetch an object's bytes by partition and file name.
    pub async fn download(&self, kind: PartitionKind, file: &str) -> HtResult<Vec<u8>> {
        let key = self.location.object_key(kind, file);
        let path = ObjectPath::from(key.as_str());
        let result = self
            .inner
            .get(&path)
            .await
            .map_err(|e| map_store_error(&key, e))?;
        let bytes = result.bytes().await.map_err(|e| map_store_error(&key, e))?;
        Ok(bytes.to_vec())
    }
}

fn s3_builder(bucket: &str, region: Option<&str>) -> AmazonS3Builder {
    let builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_allow_http(false);
    match region {
        Some(region) => builder.with_region(region),
        None => builder,
    }
}

/// Resolve AWS credentials from the environment the way the S3 store does:
/// static keys, web identity, container credentials, then the instance profile.
///
/// The bucket only satisfies the builder; nothing is read from it.
pub fn ambient_credentials(region: &str) -> HtResult<AwsCredentialProvider> {
    let s3 = s3_builder(CREDENTIALS_ONLY_BUCKET, Some(region))
        .build()
        .map_err(|e| StorageError::Backend {
            message: format!("failed to resolve AWS credentials: {}", e),
        })?;
    Ok(Arc::clone(s3.credentials()))
}

const CREDENTIALS_ONLY_BUCKET: &str = "hypertune-credentials";

fn map_store_error(key: &str, err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::PermissionDenied { source, .. }
        | object_store::Error::Unauthenticated { source, .. } => StorageError::AccessDenied {
            message: format!("{}: {}", key, source),
        },
        other => StorageError::UploadFailed {
            path: key.to_string(),
            message: other.to_string(),
        },
    }
}
