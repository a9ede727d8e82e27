//! Error kinds shared by every service boundary. Leaf-level plumbing
//! still uses `anyhow`; these variants are what callers are expected to
//! match on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("mailbox is not connected for this user")]
    NotConnected,

    #[error("mailbox provider rejected credentials: {0}")]
    Auth(String),

    #[error("no user found for the given identifier")]
    UserMissing,

    #[error("document exceeds the inline OCR size limit ({0} bytes)")]
    PayloadTooLarge(usize),

    #[error("OCR provider does not support this document type")]
    UnsupportedDocument,

    #[error("OCR polling exceeded its time budget")]
    OcrTimeout,

    #[error("OCR provider reported a terminal failure: {0}")]
    OcrFailed(String),

    #[error("blob staging I/O failed: {0}")]
    BlobIo(#[source] anyhow::Error),

    #[error("message was already processed by another worker")]
    DedupConflict,

    #[error("queue backend error: {0}")]
    QueueBackend(#[source] anyhow::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Whether the queue substrate should retry a job that failed with
    /// this error, or send it straight to the dead letter state.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            CoreError::OcrTimeout
                | CoreError::OcrFailed(_)
                | CoreError::BlobIo(_)
                | CoreError::QueueBackend(_)
        )
    }
}
