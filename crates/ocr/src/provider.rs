//! Trait behind [`OcrClient`](crate::OcrClient), so the attachment worker
//! can be driven against a fake OCR backend in tests instead of real
//! Textract calls.

use async_trait::async_trait;
use models::extraction::ExtractionResult;
use models::CoreError;

#[async_trait]
pub trait OcrProvider: Send + Sync {
    async fn extract_inline(&self, bytes: Vec<u8>) -> Result<ExtractionResult, CoreError>;

    async fn extract_text_only(&self, bytes: Vec<u8>) -> Result<ExtractionResult, CoreError>;

    async fn extract_async(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<ExtractionResult, CoreError>;
}

#[async_trait]
impl OcrProvider for crate::OcrClient {
    async fn extract_inline(&self, bytes: Vec<u8>) -> Result<ExtractionResult, CoreError> {
        crate::OcrClient::extract_inline(self, bytes).await
    }

    async fn extract_text_only(&self, bytes: Vec<u8>) -> Result<ExtractionResult, CoreError> {
        crate::OcrClient::extract_text_only(self, bytes).await
    }

    async fn extract_async(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<ExtractionResult, CoreError> {
        crate::OcrClient::extract_async(self, bytes, filename, mime_type).await
    }
}
