//! Transient object staging used solely to hand large documents to the
//! OCR provider. No lifecycle policy is assumed here — the OCR client
//! deletes what it stages on every path, success or failure.

use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use models::CoreError;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StagedObject {
    pub bucket: String,
    pub key: String,
}

#[derive(Clone)]
pub struct BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket)
    }

    /// Stages `bytes` under `documents/{epochMillis}-{uuid}-{filename}` and
    /// returns where it landed.
    pub async fn put(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<StagedObject, CoreError> {
        let key = format!(
            "documents/{}-{}-{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4(),
            filename
        );

        let timer = observability::metrics::BLOB_PUT_DURATION_SECONDS
            .with_label_values(&[])
            .start_timer();
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(mime_type)
            .send()
            .await;
        timer.observe_duration();
        result.map_err(|e| CoreError::BlobIo(anyhow::anyhow!(e)))?;

        Ok(StagedObject {
            bucket: self.bucket.clone(),
            key,
        })
    }

    /// Idempotent: deleting a key that's already gone is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), CoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| CoreError::BlobIo(anyhow::anyhow!(e)))?;
        Ok(())
    }
}
