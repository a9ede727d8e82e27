use std::time::Duration;

use aws_sdk_textract::types::{Document, DocumentLocation, FeatureType, JobStatus, S3Object};
use crate::block::BlockType;
use aws_sdk_textract::primitives::Blob;
use blobstore::BlobStore;
use models::extraction::ExtractionResult;
use models::CoreError;
use tracing::{info, warn};

const INLINE_SIZE_LIMIT: usize = 10 * 1024 * 1024;
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const POLL_BUDGET: Duration = Duration::from_secs(300);

pub struct OcrClient {
    textract: aws_sdk_textract::Client,
    blobs: BlobStore,
}

impl OcrClient {
    pub fn new(textract: aws_sdk_textract::Client, blobs: BlobStore) -> Self {
        Self { textract, blobs }
    }

    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(
            aws_sdk_textract::Client::new(&config),
            BlobStore::from_env(bucket).await,
        )
    }

    /// Submits bytes directly. Falls back to a plain-text-only result when
    /// the provider rejects the document type rather than propagating.
    pub async fn extract_inline(
        &self,
        bytes: Vec<u8>,
    ) -> Result<ExtractionResult, CoreError> {
        if bytes.len() > INLINE_SIZE_LIMIT {
            return Err(CoreError::PayloadTooLarge(bytes.len()));
        }

        let resp = self
            .textract
            .analyze_document()
            .document(Document::builder().bytes(Blob::new(bytes)).build())
            .feature_types(FeatureType::Tables)
            .feature_types(FeatureType::Forms)
            .send()
            .await;

        match resp {
            Ok(output) => {
                let blocks = crate::textract::convert(output.blocks());
                Ok(crate::block::transform(&blocks))
            }
            Err(e) => {
                if is_unsupported_document(&e) {
                    warn!("textract rejected document type, falling back to text-only");
                    Err(CoreError::UnsupportedDocument)
                } else {
                    Err(CoreError::OcrFailed(e.to_string()))
                }
            }
        }
    }

    /// Plain-text detection: no tables/forms features, just LINE/WORD
    /// blocks. Used when the full analysis rejects a document type it
    /// still knows how to read text out of.
    pub async fn extract_text_only(&self, bytes: Vec<u8>) -> Result<ExtractionResult, CoreError> {
        if bytes.len() > INLINE_SIZE_LIMIT {
            return Err(CoreError::PayloadTooLarge(bytes.len()));
        }

        let resp = self
            .textract
            .detect_document_text()
            .document(Document::builder().bytes(Blob::new(bytes)).build())
            .send()
            .await
            .map_err(|e| CoreError::OcrFailed(e.to_string()))?;

        let blocks = crate::textract::convert(resp.blocks());
        let mut result = crate::block::transform(&blocks);
        result.text_confidence = Some(crate::block::mean_confidence(&blocks, BlockType::Line));
        Ok(result)
    }

    /// Uploads to blob staging, runs async analysis, polls to completion,
    /// and unconditionally deletes the staged object afterward.
    pub async fn extract_async(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<ExtractionResult, CoreError> {
        let staged = self.blobs.put(bytes, filename, mime_type).await?;
        let result = self.run_analysis(&staged.bucket, &staged.key).await;

        if let Err(e) = self.blobs.delete(&staged.key).await {
            warn!(error = ?e, key = %staged.key, "failed to delete staged blob, leaking a transient object");
        }

        result
    }

    async fn run_analysis(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<ExtractionResult, CoreError> {
        let start = self
            .textract
            .start_document_analysis()
            .document_location(
                DocumentLocation::builder()
                    .s3_object(S3Object::builder().bucket(bucket).name(key).build())
                    .build(),
            )
            .feature_types(FeatureType::Tables)
            .feature_types(FeatureType::Forms)
            .send()
            .await
            .map_err(|e| CoreError::OcrFailed(e.to_string()))?;

        let job_id = start
            .job_id()
            .ok_or_else(|| CoreError::OcrFailed("textract returned no job id".into()))?
            .to_string();

        let deadline = tokio::time::Instant::now() + POLL_BUDGET;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(CoreError::OcrTimeout);
            }

            let mut next_token: Option<String> = None;
            let mut all_blocks = Vec::new();
            loop {
                let mut req = self.textract.get_document_analysis().job_id(&job_id);
                if let Some(token) = &next_token {
                    req = req.next_token(token);
                }
                let page = req
                    .send()
                    .await
                    .map_err(|e| CoreError::OcrFailed(e.to_string()))?;

                match page.job_status() {
                    Some(JobStatus::Succeeded) => {
                        all_blocks.extend(page.blocks().to_vec());
                        next_token = page.next_token().map(str::to_string);
                        if next_token.is_none() {
                            let converted = crate::textract::convert(&all_blocks);
                            return Ok(crate::block::transform(&converted));
                        }
                    }
                    Some(JobStatus::Failed) => {
                        return Err(CoreError::OcrFailed(
                            page.status_message().unwrap_or("unknown").to_string(),
                        ));
                    }
                    Some(JobStatus::InProgress) | Some(JobStatus::PartialSuccess) | None => break,
                    _ => break,
                }
            }

            info!(job_id = %job_id, "ocr job still in progress, polling again");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

fn is_unsupported_document<E: std::fmt::Display>(e: &E) -> bool {
    e.to_string()
        .to_ascii_lowercase()
        .contains("unsupporteddocument")
}
