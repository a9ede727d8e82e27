//! Notification Webhook (C8): decodes a provider push envelope and
//! enqueues a mailbox-sync job. Never performs synchronous OCR or mailbox
//! I/O — that happens entirely in the sync/attachment workers.

use base64::Engine as _;
use chrono::Utc;
use models::job::{JobKind, MailboxSyncPayload};
use queue::Queue;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::sync_worker::SyncWorker;

#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
}

#[derive(Debug, Deserialize)]
pub struct PushMessage {
    pub data: String,
}

#[derive(Debug, Deserialize)]
struct DecodedPayload {
    #[serde(rename = "emailAddress")]
    mailbox_address: String,
    #[serde(rename = "historyId")]
    cursor: String,
}

/// Outcome returned to the HTTP layer — always a 200, per the provider's
/// redelivery contract; this only controls what gets logged and what the
/// response body reports back.
pub enum WebhookOutcome {
    Enqueued { job_id: Uuid },
    Malformed,
}

pub async fn handle_push(queue: &Queue, envelope: &PushEnvelope) -> WebhookOutcome {
    observability::metrics::NOTIFICATIONS_RECEIVED.inc();

    let Ok(decoded_bytes) = base64::engine::general_purpose::STANDARD.decode(&envelope.message.data)
    else {
        warn!("webhook payload was not valid base64, acking anyway");
        return WebhookOutcome::Malformed;
    };

    let Ok(payload) = serde_json::from_slice::<DecodedPayload>(&decoded_bytes) else {
        warn!("webhook payload did not match the expected envelope shape, acking anyway");
        return WebhookOutcome::Malformed;
    };

    let sync_payload = MailboxSyncPayload {
        mailbox_address: payload.mailbox_address,
        cursor_at_notification: payload.cursor,
        received_at: Utc::now(),
    };
    let dedup_key = sync_payload.dedup_key();

    match queue
        .enqueue(JobKind::MailboxSync, &sync_payload, &dedup_key, None)
        .await
    {
        Ok(id) => {
            info!(job_id = %id, dedup_key = %dedup_key, "enqueued mailbox-sync job");
            WebhookOutcome::Enqueued { job_id: id }
        }
        Err(e) => {
            warn!(error = ?e, "failed to enqueue mailbox-sync job, acking anyway");
            WebhookOutcome::Malformed
        }
    }
}

/// The legacy synchronous path: calls the sync worker directly instead of
/// enqueuing. Only wired up when `USE_QUEUE=false`, for local debugging.
pub async fn handle_push_direct(worker: &SyncWorker, envelope: &PushEnvelope) -> WebhookOutcome {
    observability::metrics::NOTIFICATIONS_RECEIVED.inc();

    let Ok(decoded_bytes) = base64::engine::general_purpose::STANDARD.decode(&envelope.message.data)
    else {
        return WebhookOutcome::Malformed;
    };
    let Ok(payload) = serde_json::from_slice::<DecodedPayload>(&decoded_bytes) else {
        return WebhookOutcome::Malformed;
    };

    let sync_payload = MailboxSyncPayload {
        mailbox_address: payload.mailbox_address,
        cursor_at_notification: payload.cursor,
        received_at: Utc::now(),
    };

    if let Err(e) = worker.run(&sync_payload).await {
        warn!(error = ?e, "synchronous mailbox sync failed");
    }
    // no queue backs this path, so there is no job id to report; the caller
    // only uses this variant to log/ack, never to poll a job
    WebhookOutcome::Enqueued { job_id: Uuid::nil() }
}
