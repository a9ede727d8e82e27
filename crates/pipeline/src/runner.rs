//! Polling worker loops over the queue substrate. `claim_next` already
//! gives safe concurrent claiming (`SELECT ... FOR UPDATE SKIP LOCKED`),
//! so each worker slot is just a task that claims, runs, and reports
//! back; no separate dispatcher thread or channel is needed the way the
//! reference system's `tascii` runtime uses one.

use std::time::Duration;

use models::job::{AttachmentExtractPayload, Job, JobKind, MailboxSyncPayload};
use queue::Queue;
use tracing::{error, warn};

use crate::{AttachmentWorker, SyncWorker};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Spawns `concurrency` mailbox-sync worker tasks, each polling the
/// queue for `mailbox-sync` jobs until the process shuts down.
pub fn spawn_sync_workers(
    queue: Queue,
    worker: std::sync::Arc<SyncWorker>,
    concurrency: usize,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..concurrency)
        .map(|slot| {
            let queue = queue.clone();
            let worker = worker.clone();
            tokio::spawn(async move { sync_loop(slot, queue, worker).await })
        })
        .collect()
}

/// Spawns `concurrency` attachment-extract worker tasks.
pub fn spawn_attachment_workers(
    queue: Queue,
    worker: std::sync::Arc<AttachmentWorker>,
    concurrency: usize,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..concurrency)
        .map(|slot| {
            let queue = queue.clone();
            let worker = worker.clone();
            tokio::spawn(async move { attachment_loop(slot, queue, worker).await })
        })
        .collect()
}

async fn sync_loop(slot: usize, queue: Queue, worker: std::sync::Arc<SyncWorker>) {
    loop {
        match queue.claim_next(JobKind::MailboxSync).await {
            Ok(Some(job)) => run_sync_job(&queue, &worker, job).await,
            Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
            Err(e) => {
                error!(slot, error = ?e, "sync worker failed to claim a job");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

async fn attachment_loop(slot: usize, queue: Queue, worker: std::sync::Arc<AttachmentWorker>) {
    loop {
        match queue.claim_next(JobKind::AttachmentExtract).await {
            Ok(Some(job)) => run_attachment_job(&queue, &worker, job).await,
            Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
            Err(e) => {
                error!(slot, error = ?e, "attachment worker failed to claim a job");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

async fn run_sync_job(queue: &Queue, worker: &SyncWorker, job: Job) {
    let payload: MailboxSyncPayload = match serde_json::from_value(job.payload.clone()) {
        Ok(p) => p,
        Err(e) => {
            warn!(job_id = %job.id, error = ?e, "malformed mailbox-sync payload, dead-lettering");
            let _ = queue.fail(&job, &e.to_string(), false).await;
            return;
        }
    };

    match worker.run(&payload).await {
        Ok(()) => {
            let _ = queue.complete(job.id).await;
        }
        Err(e) => {
            warn!(job_id = %job.id, error = ?e, "mailbox-sync job failed");
            let retriable = !matches!(e, models::CoreError::UserMissing | models::CoreError::NotConnected);
            let _ = queue.fail(&job, &e.to_string(), retriable).await;
        }
    }
}

async fn run_attachment_job(queue: &Queue, worker: &AttachmentWorker, job: Job) {
    let payload: AttachmentExtractPayload = match serde_json::from_value(job.payload.clone()) {
        Ok(p) => p,
        Err(e) => {
            warn!(job_id = %job.id, error = ?e, "malformed attachment-extract payload, dead-lettering");
            let _ = queue.fail(&job, &e.to_string(), false).await;
            return;
        }
    };

    match worker.run(job.attempts, job.max_attempts, &payload).await {
        Ok(()) => {
            let _ = queue.complete(job.id).await;
        }
        Err(e) => {
            warn!(job_id = %job.id, error = ?e, "attachment-extract job failed, will retry");
            let _ = queue.fail(&job, &e.to_string(), e.is_retriable()).await;
        }
    }
}
