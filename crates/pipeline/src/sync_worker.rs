//! Mailbox Sync Worker (C9): turns one mailbox-change notification into
//! ProcessedEmail rows and attachment-extract jobs.

use std::sync::Arc;

use base64::Engine as _;
use dashmap::DashSet;
use mailboxclient::{ClientSource, MarkReadOutcome};
use models::job::{AttachmentExtractPayload, JobKind, MailboxSyncPayload};
use models::CoreError;
use queue::Queue;
use sqlx::PgPool;
use tracing::{info, warn};

const MAX_MESSAGES_PER_RUN: usize = 10;

pub struct SyncWorker {
    pool: PgPool,
    clients: Arc<dyn ClientSource>,
    queue: Queue,
    in_flight: Arc<DashSet<String>>,
}

impl SyncWorker {
    pub fn new(pool: PgPool, clients: impl ClientSource + 'static, queue: Queue) -> Self {
        Self {
            pool,
            clients: Arc::new(clients),
            queue,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    pub async fn run(&self, payload: &MailboxSyncPayload) -> Result<(), CoreError> {
        let user = match store::users::get_by_mailbox_address(&self.pool, &payload.mailbox_address)
            .await
            .map_err(CoreError::Other)?
        {
            Some(u) if u.mailbox_connected => u,
            _ => {
                // unknown or disconnected mailbox: soft no-op, never retried
                return Ok(());
            }
        };

        let provider = self.clients.client_for(user.id).await?;
        let messages = provider
            .list_unread_with_attachments(MAX_MESSAGES_PER_RUN)
            .await?;

        for message in messages {
            if message.attachments.is_empty() {
                // every attachment on this message was filtered as
                // unsupported: nothing to extract, and it must stay
                // eligible to be picked up again if it later gains one
                continue;
            }

            if store::extraction::is_message_processed(&self.pool, &message.message_id)
                .await
                .map_err(CoreError::Other)?
            {
                observability::metrics::EMAILS_SKIPPED.inc();
                continue;
            }

            if !self.in_flight.insert(message.message_id.clone()) {
                // another task in this process already has the lock
                continue;
            }

            let outcome = self.process_message(&user.id, &message.message_id).await;
            self.in_flight.remove(&message.message_id);

            if let Err(e) = outcome {
                warn!(error = ?e, message_id = %message.message_id, "failed to process message");
            }
        }

        // best-effort, unconditional: the same push must never be
        // re-processed even if a message above failed outright
        if let Err(e) =
            store::users::advance_cursor(&self.pool, user.id, &payload.cursor_at_notification).await
        {
            warn!(error = ?e, user_id = %user.id, "failed to advance mailbox cursor");
        }

        Ok(())
    }

    async fn process_message(
        &self,
        user_id: &uuid::Uuid,
        message_id: &str,
    ) -> Result<(), CoreError> {
        // re-check under the lock: another worker may have won the race
        // between the pre-filter above and now
        if store::extraction::is_message_processed(&self.pool, message_id)
            .await
            .map_err(CoreError::Other)?
        {
            return Ok(());
        }

        let won_race = store::extraction::mark_message_processed(&self.pool, message_id, *user_id)
            .await
            .map_err(CoreError::Other)?;
        if !won_race {
            return Ok(());
        }

        let provider = self.clients.client_for(*user_id).await?;
        let message = provider.fetch_message(message_id).await?;

        let mut enqueues = Vec::new();
        for attachment in &message.attachments {
            let bytes = provider
                .fetch_attachment(message_id, &attachment.attachment_id)
                .await?;
            let attachment_payload = AttachmentExtractPayload {
                user_id: *user_id,
                message_id: message_id.to_string(),
                subject: message.subject.clone(),
                sender: message.sender.clone(),
                message_date: message.message_date,
                filename: attachment.filename.clone(),
                mime_type: attachment.mime_type.clone(),
                payload_b64: base64::engine::general_purpose::STANDARD.encode(&bytes),
            };
            enqueues.push(attachment_payload);
        }

        // issued without awaiting each other, per the fan-out contract
        let futures = enqueues.into_iter().map(|p| {
            let queue = self.queue.clone();
            async move {
                let dedup_key = p.dedup_key();
                if let Err(e) = queue
                    .enqueue(JobKind::AttachmentExtract, &p, &dedup_key, None)
                    .await
                {
                    warn!(error = ?e, dedup_key = %dedup_key, "failed to enqueue attachment job");
                }
            }
        });
        futures::future::join_all(futures).await;

        match provider.mark_read(message_id).await {
            Ok(MarkReadOutcome::Ok) => {}
            Ok(MarkReadOutcome::PermissionDenied) => {
                warn!(message_id, "mark_read denied by provider, continuing");
            }
            Err(e) => {
                warn!(error = ?e, message_id, "mark_read failed, continuing");
            }
        }

        observability::metrics::EMAILS_PROCESSED.inc();
        info!(message_id, user_id = %user_id, "message processed");
        Ok(())
    }
}
