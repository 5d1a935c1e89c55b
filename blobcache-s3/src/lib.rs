//! # Object Store Client
//!
//! Thin wrapper over the S3 API: download for cache fills, plus the upload,
//! list, and delete operations the REST surface forwards. The engine never
//! sees this type directly; the filler captures it.

use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

use blobcache_common::{CacheError, CacheResult};

/// S3-compatible blob store client.
#[derive(Debug, Clone)]
pub struct BlobStore {
    client: aws_sdk_s3::Client,
}

impl BlobStore {
    /// Connects using the ambient AWS configuration.
    ///
    /// A custom endpoint switches to path-style addressing, which is what
    /// most S3-compatible stores expect.
    pub async fn connect(endpoint: Option<&str>) -> Self {
        let region = aws_config::meta::region::RegionProviderChain::default_provider()
            .or_else("us-east-1");
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if endpoint.is_some() {
            builder = builder.force_path_style(true);
        }
        BlobStore {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        }
    }

    /// Downloads an object's bytes. A missing key is `NotFound`; everything
    /// else is a transient backend failure.
    pub async fn download(&self, bucket: &str, key: &str) -> CacheResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let missing = matches!(
                    &err,
                    SdkError::ServiceError(service) if service.err().is_no_such_key()
                );
                if missing {
                    CacheError::NotFound
                } else {
                    CacheError::Backend(format!(
                        "{}",
                        aws_sdk_s3::error::DisplayErrorContext(&err)
                    ))
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|err| CacheError::Backend(err.to_string()))?;
        Ok(body.into_bytes())
    }

    /// Uploads one object.
    pub async fn upload(&self, bucket: &str, key: &str, body: Bytes) -> CacheResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| {
                CacheError::Backend(format!("{}", aws_sdk_s3::error::DisplayErrorContext(&err)))
            })?;
        Ok(())
    }

    /// Lists object keys under `prefix`, following continuation tokens.
    pub async fn list(&self, bucket: &str, prefix: Option<&str>) -> CacheResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket);
            if let Some(prefix) = prefix {
                request = request.prefix(prefix);
            }
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|err| {
                CacheError::Backend(format!("{}", aws_sdk_s3::error::DisplayErrorContext(&err)))
            })?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match output.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }

    /// Deletes one object. S3 reports success for missing keys, which suits
    /// invalidation semantics here.
    pub async fn delete(&self, bucket: &str, key: &str) -> CacheResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                CacheError::Backend(format!("{}", aws_sdk_s3::error::DisplayErrorContext(&err)))
            })?;
        tracing::debug!(bucket, key, "deleted from object store");
        Ok(())
    }
}
