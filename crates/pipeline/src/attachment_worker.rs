//! Attachment Worker (C10): decodes one staged attachment, runs OCR, and
//! persists the outcome — success or failure — as an ExtractedDocument.

use std::sync::Arc;

use base64::Engine as _;
use models::extraction::{ExtractionOutcome, NewExtractedDocument};
use models::job::AttachmentExtractPayload;
use models::CoreError;
use ocr::OcrProvider;
use sqlx::PgPool;
use tracing::{info, warn};

const INLINE_ELIGIBLE_SIZE: usize = 10 * 1024 * 1024;

pub struct AttachmentWorker {
    pool: PgPool,
    ocr: Arc<dyn OcrProvider>,
}

impl AttachmentWorker {
    pub fn new(pool: PgPool, ocr: impl OcrProvider + 'static) -> Self {
        Self {
            pool,
            ocr: Arc::new(ocr),
        }
    }

    /// `attempts`/`max_attempts` come from the dequeued job: they let this
    /// worker tell a transient OCR failure the queue should still retry
    /// apart from a terminal one that should be recorded as an `error`
    /// document instead. Retriable errors with attempts remaining are
    /// propagated so the caller hands them to `Queue::fail`, which
    /// reschedules the job without ever reaching this function's
    /// persistence step — that's what keeps S4 (transient failure, then a
    /// successful retry) from ever producing a stray error document.
    pub async fn run(
        &self,
        attempts: i32,
        max_attempts: i32,
        payload: &AttachmentExtractPayload,
    ) -> Result<(), CoreError> {
        match self.ocr_outcome(payload).await {
            Err(e) if e.is_retriable() && attempts < max_attempts => {
                warn!(error = ?e, filename = %payload.filename, attempts, "OCR extraction failed, retrying");
                Err(e)
            }
            outcome => self.persist(payload, outcome).await.map(|_| ()),
        }
    }

    /// The operator-triggered synchronous path (`POST /api/process`): no
    /// queue backs this call, so there is nothing to retry against —
    /// every outcome, success or failure, is persisted on the first and
    /// only attempt. Returns the new document id.
    pub async fn run_once(
        &self,
        payload: &AttachmentExtractPayload,
    ) -> Result<uuid::Uuid, CoreError> {
        let outcome = self.ocr_outcome(payload).await;
        self.persist(payload, outcome).await
    }

    async fn ocr_outcome(
        &self,
        payload: &AttachmentExtractPayload,
    ) -> Result<models::extraction::ExtractionResult, CoreError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&payload.payload_b64)
            .map_err(|e| CoreError::Other(e.into()))?;

        observability::metrics::OCR_CALLS.inc();
        let timer = observability::metrics::OCR_DURATION_SECONDS
            .with_label_values(&[])
            .start_timer();
        let result = self.extract(bytes, payload).await;
        timer.observe_duration();

        if let Ok(result) = &result {
            observability::metrics::OCR_CONFIDENCE
                .with_label_values(&[])
                .observe(result.aggregate_confidence() as f64);
        }
        result
    }

    async fn persist(
        &self,
        payload: &AttachmentExtractPayload,
        result: Result<models::extraction::ExtractionResult, CoreError>,
    ) -> Result<uuid::Uuid, CoreError> {
        let outcome = match result {
            Ok(result) => ExtractionOutcome::Completed(result),
            Err(e) => {
                observability::metrics::OCR_ERRORS.inc();
                warn!(error = ?e, filename = %payload.filename, "OCR extraction failed terminally");
                ExtractionOutcome::Error(e.to_string())
            }
        };
        let is_error = matches!(outcome, ExtractionOutcome::Error(_));

        let id = store::extraction::save_extraction(
            &self.pool,
            NewExtractedDocument {
                user_id: payload.user_id,
                message_id: payload.message_id.clone(),
                subject: payload.subject.clone(),
                sender: payload.sender.clone(),
                message_date: payload.message_date,
                filename: payload.filename.clone(),
                mime_type: payload.mime_type.clone(),
                outcome,
            },
        )
        .await
        .map_err(CoreError::Other)?;

        if is_error {
            observability::metrics::PROCESSING_ERRORS
                .with_label_values(&["ocr"])
                .inc();
        } else {
            observability::metrics::ATTACHMENTS_EXTRACTED.inc();
            info!(filename = %payload.filename, message_id = %payload.message_id, "attachment extracted");
        }

        // a terminal OCR failure still produced a persisted error document,
        // so the job itself always completes rather than dead-lettering
        Ok(id)
    }

    async fn extract(
        &self,
        bytes: Vec<u8>,
        payload: &AttachmentExtractPayload,
    ) -> Result<models::extraction::ExtractionResult, CoreError> {
        if payload.mime_type == "application/pdf" {
            return self
                .ocr
                .extract_async(bytes, &payload.filename, &payload.mime_type)
                .await;
        }

        if bytes.len() <= INLINE_ELIGIBLE_SIZE {
            match self.ocr.extract_inline(bytes.clone()).await {
                Ok(result) => return Ok(result),
                Err(CoreError::UnsupportedDocument) => {
                    return self.ocr.extract_text_only(bytes).await;
                }
                Err(e) => return Err(e),
            }
        }

        self.ocr
            .extract_async(bytes, &payload.filename, &payload.mime_type)
            .await
    }
}
