use crate::config::S3Config;
use crate::storage::blob_store::{validate_key, BlobStore};
use crate::storage::error::StorageError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Region, Client};
use bytes::Bytes;
use std::collections::BTreeSet;
use tracing::{debug, error, info};

/// S3-compatible implementation of the BlobStore trait
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Create a new S3Store from configuration and verify the bucket is reachable
    pub async fn new(config: &S3Config) -> Result<Self, StorageError> {
        info!(
            "Creating S3Store with config: endpoint={:?}, region={}, bucket={}, access_key={:?}",
            config.endpoint, config.region, config.bucket, config.access_key_id
        );

        let config_loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        // If access key and secret are provided, use them for credentials
        let aws_config = if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "StaticCredentialsProvider",
            );

            config_loader.credentials_provider(credentials).load().await
        } else {
            config_loader.load().await
        };

        let mut client_builder =
            aws_sdk_s3::config::Builder::from(&aws_config).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            info!("Setting custom endpoint: {}", endpoint);
            client_builder = client_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(client_builder.build());

        let store = Self {
            client,
            bucket: config.bucket.clone(),
        };

        #[cfg(test)]
        {
            store.ensure_bucket_exists().await?;
        }

        store.probe().await?;

        info!(
            "Using s3 service {} as storage (bucket {})",
            config.endpoint.as_deref().unwrap_or("aws"),
            config.bucket
        );
        Ok(store)
    }

    /// Check that the bucket exists and the credentials can reach it
    async fn probe(&self) -> Result<(), StorageError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                error!("Unable to access s3 bucket {}: {}", self.bucket, e);
                StorageError::ConnectionError(format!(
                    "Unable to access bucket {}: {}",
                    self.bucket,
                    e.code().unwrap_or("unknown")
                ))
            })?;
        Ok(())
    }

    #[cfg(test)]
    async fn ensure_bucket_exists(&self) -> Result<(), StorageError> {
        if self.probe().await.is_ok() {
            return Ok(());
        }

        info!("Creating bucket '{}'", self.bucket);
        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => match e.code() {
                Some("BucketAlreadyExists") | Some("BucketAlreadyOwnedByYou") => Ok(()),
                _ => Err(StorageError::ConnectionError(format!(
                    "Failed to create bucket '{}': {}",
                    self.bucket, e
                ))),
            },
        }
    }
}

fn is_missing_key<E: ProvideErrorMetadata, R>(e: &SdkError<E, R>) -> bool {
    matches!(e.code(), Some("NoSuchKey") | Some("KeyNotFound") | Some("NotFound"))
}

#[async_trait]
impl BlobStore for S3Store {
    async fn put(&self, key: &str, data: Bytes) -> Result<String, StorageError> {
        validate_key(key)?;
        let length = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                error!("Unable to write s3 file {}:{}: {}", self.bucket, key, e);
                StorageError::WriteError(key.to_string(), e.to_string())
            })?;

        info!(
            "New s3 file has been written: {}:{} ({} bytes)",
            self.bucket, key, length
        );
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        validate_key(key)?;
        debug!("Fetching object from S3: {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_missing_key(&e) {
                    StorageError::ObjectNotFound(key.to_string())
                } else if e.code() == Some("AccessDenied") {
                    StorageError::AccessDenied(key.to_string(), e.to_string())
                } else {
                    error!("Unable to read s3 file {}:{}: {}", self.bucket, key, e);
                    StorageError::ReadError(key.to_string(), e.to_string())
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::ReadError(key.to_string(), e.to_string()))?
            .into_bytes();

        debug!("Successfully fetched object from S3: {}", key);
        Ok(data)
    }

    async fn list(&self) -> Result<BTreeSet<String>, StorageError> {
        let mut keys = BTreeSet::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| {
                    error!("Unable to list s3 bucket {}: {}", self.bucket, e);
                    StorageError::ListError(e.to_string())
                })?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => {
                info!("S3 file {}:{} has been removed", self.bucket, key);
                Ok(())
            }
            Err(e) if is_missing_key(&e) => {
                info!(
                    "Won't remove s3 file {}:{} since it doesn't exist",
                    self.bucket, key
                );
                Ok(())
            }
            Err(e) => {
                error!("Unable to remove s3 file {}:{}: {}", self.bucket, key, e);
                Err(StorageError::DeleteError(key.to_string(), e.to_string()))
            }
        }
    }
}
