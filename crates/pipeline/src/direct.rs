//! Synchronous sync+extract of one mailbox, driven by an operator call to
//! `POST /api/process` rather than a push notification. Shares the same
//! unread-listing, dedup and mark-read steps as the queued [`SyncWorker`],
//! but runs OCR inline through [`AttachmentWorker::run_once`] instead of
//! enqueuing `attachment-extract` jobs — there is no caller to poll a job
//! id, so the HTTP response carries the result directly.

use std::time::Instant;

use base64::Engine as _;
use mailboxclient::{ClientSource, MarkReadOutcome};
use models::job::AttachmentExtractPayload;
use models::CoreError;
use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::AttachmentWorker;

const MAX_MESSAGES_PER_RUN: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentResult {
    pub file_name: String,
    pub document_id: Option<Uuid>,
    pub error: Option<String>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessSummary {
    pub emails_processed: u32,
    pub documents_processed: u32,
    pub successful: u32,
    pub failed: u32,
    pub results: Vec<AttachmentResult>,
}

/// Resolves the target user (explicit id, or the sole connected mailbox
/// when `user_id` is `None`), then runs sync+extract against it
/// synchronously.
pub async fn process_mailbox(
    pool: &PgPool,
    clients: &dyn ClientSource,
    attachments: &AttachmentWorker,
    user_id: Option<Uuid>,
) -> Result<ProcessSummary, CoreError> {
    let user = match user_id {
        Some(id) => store::users::get_by_id(pool, id)
            .await
            .map_err(CoreError::Other)?
            .ok_or(CoreError::UserMissing)?,
        None => store::users::first_connected(pool)
            .await
            .map_err(CoreError::Other)?
            .ok_or(CoreError::NotConnected)?,
    };
    if !user.mailbox_connected {
        return Err(CoreError::NotConnected);
    }

    let provider = clients.client_for(user.id).await?;
    let messages = provider
        .list_unread_with_attachments(MAX_MESSAGES_PER_RUN)
        .await?;

    let mut summary = ProcessSummary::default();

    for message in messages {
        if message.attachments.is_empty() {
            // every attachment on this message was filtered as unsupported:
            // nothing to extract, and it must stay eligible to be picked up
            // again if it later gains one
            continue;
        }

        if store::extraction::is_message_processed(pool, &message.message_id)
            .await
            .map_err(CoreError::Other)?
        {
            continue;
        }

        let won_race =
            store::extraction::mark_message_processed(pool, &message.message_id, user.id)
                .await
                .map_err(CoreError::Other)?;
        if !won_race {
            continue;
        }

        summary.emails_processed += 1;

        let full = provider.fetch_message(&message.message_id).await?;
        for attachment in &full.attachments {
            let start = Instant::now();
            let bytes = match provider
                .fetch_attachment(&message.message_id, &attachment.attachment_id)
                .await
            {
                Ok(b) => b,
                Err(e) => {
                    summary.failed += 1;
                    summary.results.push(AttachmentResult {
                        file_name: attachment.filename.clone(),
                        document_id: None,
                        error: Some(e.to_string()),
                        duration_ms: start.elapsed().as_millis(),
                    });
                    continue;
                }
            };

            let payload = AttachmentExtractPayload {
                user_id: user.id,
                message_id: message.message_id.clone(),
                subject: full.subject.clone(),
                sender: full.sender.clone(),
                message_date: full.message_date,
                filename: attachment.filename.clone(),
                mime_type: attachment.mime_type.clone(),
                payload_b64: base64::engine::general_purpose::STANDARD.encode(&bytes),
            };

            summary.documents_processed += 1;
            match attachments.run_once(&payload).await {
                Ok(doc_id) => {
                    summary.successful += 1;
                    summary.results.push(AttachmentResult {
                        file_name: attachment.filename.clone(),
                        document_id: Some(doc_id),
                        error: None,
                        duration_ms: start.elapsed().as_millis(),
                    });
                }
                Err(e) => {
                    summary.failed += 1;
                    summary.results.push(AttachmentResult {
                        file_name: attachment.filename.clone(),
                        document_id: None,
                        error: Some(e.to_string()),
                        duration_ms: start.elapsed().as_millis(),
                    });
                }
            }
        }

        match provider.mark_read(&message.message_id).await {
            Ok(MarkReadOutcome::Ok) => {}
            Ok(MarkReadOutcome::PermissionDenied) => {
                warn!(message_id = %message.message_id, "mark_read denied by provider, continuing");
            }
            Err(e) => {
                warn!(error = ?e, message_id = %message.message_id, "mark_read failed, continuing");
            }
        }
    }

    Ok(summary)
}
