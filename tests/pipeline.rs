//! End-to-end scenarios exercising the sync/attachment/watch pipeline
//! against fakes of the mailbox provider and OCR client, plus a real
//! Postgres schema. Skipped entirely when `DATABASE_URL` is unset.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use mailboxclient::{ClientSource, MailboxProvider, MarkReadOutcome};
use models::extraction::ExtractionResult;
use models::job::{JobKind, MailboxSyncPayload};
use models::mailbox::{AttachmentSummary, Message, MessageSummary, PushWatch};
use models::CoreError;
use ocr::OcrProvider;
use pipeline::webhook::{handle_push, PushEnvelope, PushMessage, WebhookOutcome};
use pipeline::{AttachmentWorker, SyncWorker};
use queue::Queue;
use sqlx::PgPool;
use uuid::Uuid;
use watch::WatchManager;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    Some(pool)
}

macro_rules! require_db {
    () => {
        match test_pool().await {
            Some(pool) => pool,
            None => {
                eprintln!("skipping: DATABASE_URL not set");
                return;
            }
        }
    };
}

async fn connected_user(pool: &PgPool, email: &str) -> models::user::User {
    let user = store::users::upsert_by_email(pool, email, None, None)
        .await
        .expect("create user");
    store::users::connect_mailbox(
        pool,
        user.id,
        "sealed-refresh",
        "sealed-access",
        Utc::now() + chrono::Duration::hours(1),
    )
    .await
    .expect("connect mailbox");
    store::users::get_by_id(pool, user.id)
        .await
        .expect("reload user")
        .expect("user exists")
}

/// A single-provider fake: one unread message, fixed attachment bytes,
/// and a configurable mark-read outcome.
struct FakeProviderState {
    messages: Vec<MessageSummary>,
    full: HashMap<String, Message>,
    attachments: HashMap<(String, String), Vec<u8>>,
    mark_read: MarkReadOutcome,
}

#[derive(Clone)]
struct FakeProvider(Arc<FakeProviderState>);

#[async_trait]
impl MailboxProvider for FakeProvider {
    async fn list_unread_with_attachments(
        &self,
        _limit: usize,
    ) -> Result<Vec<MessageSummary>, CoreError> {
        Ok(self.0.messages.clone())
    }

    async fn fetch_message(&self, message_id: &str) -> Result<Message, CoreError> {
        self.0
            .full
            .get(message_id)
            .cloned()
            .ok_or(CoreError::UserMissing)
    }

    async fn fetch_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, CoreError> {
        self.0
            .attachments
            .get(&(message_id.to_string(), attachment_id.to_string()))
            .cloned()
            .ok_or(CoreError::UserMissing)
    }

    async fn mark_read(&self, _message_id: &str) -> Result<MarkReadOutcome, CoreError> {
        Ok(self.0.mark_read)
    }

    async fn register_push_watch(
        &self,
        _topic: &str,
        _labels: &[String],
    ) -> Result<PushWatch, CoreError> {
        Ok(PushWatch {
            cursor: "watch-cursor".to_string(),
            expires_at: Utc::now() + chrono::Duration::days(7),
        })
    }

    async fn stop_push_watch(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

struct FakeClientSource(FakeProvider);

#[async_trait]
impl ClientSource for FakeClientSource {
    async fn client_for(&self, _user_id: Uuid) -> Result<Box<dyn MailboxProvider>, CoreError> {
        Ok(Box::new(self.0.clone()))
    }
}

/// Always succeeds with a fixed result, regardless of which OCR path is
/// taken.
struct AlwaysOkOcr(ExtractionResult);

#[async_trait]
impl OcrProvider for AlwaysOkOcr {
    async fn extract_inline(&self, _bytes: Vec<u8>) -> Result<ExtractionResult, CoreError> {
        Ok(self.0.clone())
    }
    async fn extract_text_only(&self, _bytes: Vec<u8>) -> Result<ExtractionResult, CoreError> {
        Ok(self.0.clone())
    }
    async fn extract_async(
        &self,
        _bytes: Vec<u8>,
        _filename: &str,
        _mime_type: &str,
    ) -> Result<ExtractionResult, CoreError> {
        Ok(self.0.clone())
    }
}

/// Fails the first call with a retriable timeout, succeeds on every call
/// after.
struct FlakyOcr {
    calls: AtomicUsize,
    result: ExtractionResult,
}

#[async_trait]
impl OcrProvider for FlakyOcr {
    async fn extract_inline(&self, bytes: Vec<u8>) -> Result<ExtractionResult, CoreError> {
        self.extract_async(bytes, "", "").await
    }
    async fn extract_text_only(&self, bytes: Vec<u8>) -> Result<ExtractionResult, CoreError> {
        self.extract_async(bytes, "", "").await
    }
    async fn extract_async(
        &self,
        _bytes: Vec<u8>,
        _filename: &str,
        _mime_type: &str,
    ) -> Result<ExtractionResult, CoreError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(CoreError::OcrTimeout)
        } else {
            Ok(self.result.clone())
        }
    }
}

fn single_attachment_message(message_id: &str, filename: &str, mime_type: &str) -> MessageSummary {
    MessageSummary {
        message_id: message_id.to_string(),
        subject: Some("Invoice".to_string()),
        sender: Some("billing@example.test".to_string()),
        message_date: Some(Utc::now()),
        attachments: vec![AttachmentSummary {
            attachment_id: "a1".to_string(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            size_bytes: 80 * 1024,
        }],
    }
}

/// S1 — happy path, single attachment: one ExtractedDocument with the
/// aggregate confidence spec.md works out by hand, one ProcessedEmail
/// row, the message marked read, and the cursor advanced.
#[tokio::test]
async fn s1_happy_path_single_attachment() {
    let pool = require_db!();
    let message_id = format!("m-{}", Uuid::new_v4());
    let user = connected_user(&pool, &format!("s1-{}@example.test", Uuid::new_v4())).await;

    let summary = single_attachment_message(&message_id, "invoice.pdf", "application/pdf");
    let full = Message {
        message_id: message_id.clone(),
        subject: summary.subject.clone(),
        sender: summary.sender.clone(),
        snippet: None,
        message_date: summary.message_date,
        attachments: summary.attachments.clone(),
    };
    let provider = FakeProvider(Arc::new(FakeProviderState {
        messages: vec![summary],
        full: HashMap::from([(message_id.clone(), full)]),
        attachments: HashMap::from([((message_id.clone(), "a1".to_string()), b"%PDF-1.4".to_vec())]),
        mark_read: MarkReadOutcome::Ok,
    }));

    let result = ExtractionResult {
        raw_text: "Total: $27,131.51".to_string(),
        key_values: vec![models::extraction::KeyValue {
            key: "Total".to_string(),
            value: "$27,131.51".to_string(),
            confidence: 96.2,
        }],
        tables: vec![models::extraction::Table {
            rows: vec![vec!["a".into(), "b".into()]; 3],
            confidence: 91.0,
        }],
        text_confidence: None,
    };

    let queue = Queue::new(pool.clone());
    let attachments = Arc::new(AttachmentWorker::new(pool.clone(), AlwaysOkOcr(result)));
    let sync_worker = SyncWorker::new(pool.clone(), FakeClientSource(provider), queue.clone());

    sync_worker
        .run(&MailboxSyncPayload {
            mailbox_address: user.email.clone(),
            cursor_at_notification: "42".to_string(),
            received_at: Utc::now(),
        })
        .await
        .expect("sync run succeeds");

    assert!(store::extraction::is_message_processed(&pool, &message_id)
        .await
        .unwrap());

    let job = queue
        .claim_next(JobKind::AttachmentExtract)
        .await
        .unwrap()
        .expect("attachment job enqueued");
    let job_payload: models::job::AttachmentExtractPayload =
        serde_json::from_value(job.payload.clone()).expect("job payload decodes");
    attachments
        .run(job.attempts, job.max_attempts, &job_payload)
        .await
        .expect("attachment extraction succeeds");

    let docs = store::extraction::list_recent(&pool, Some(user.id), None, 10)
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert!((docs[0].confidence - 93.6_f32).abs() < 0.01);

    let reloaded = store::users::get_by_id(&pool, user.id).await.unwrap().unwrap();
    assert_eq!(reloaded.mailbox_cursor.as_deref(), Some("42"));
}

/// S2 — duplicate push delivery: the second `enqueue` for the same
/// envelope returns the first job's id, and only one sync job exists.
#[tokio::test]
async fn s2_duplicate_push_delivery_dedups() {
    let pool = require_db!();
    let queue = Queue::new(pool.clone());

    let payload = serde_json::json!({ "emailAddress": "dup@example.test", "historyId": "42" });
    let data = base64::engine::general_purpose::STANDARD.encode(serde_json::to_vec(&payload).unwrap());
    let envelope = PushEnvelope {
        message: PushMessage { data },
    };

    let first = match handle_push(&queue, &envelope).await {
        WebhookOutcome::Enqueued { job_id } => job_id,
        WebhookOutcome::Malformed => panic!("expected a valid envelope"),
    };
    let second = match handle_push(&queue, &envelope).await {
        WebhookOutcome::Enqueued { job_id } => job_id,
        WebhookOutcome::Malformed => panic!("expected a valid envelope"),
    };
    assert_eq!(first, second);

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.get("mailbox_sync").unwrap().pending, 1);
}

/// S3 — concurrent workers race: two simultaneous attempts to mark the
/// same message processed only let one through.
#[tokio::test]
async fn s3_concurrent_mark_processed_only_one_wins() {
    let pool = require_db!();
    let message_id = format!("m-{}", Uuid::new_v4());
    let user = connected_user(&pool, &format!("s3-{}@example.test", Uuid::new_v4())).await;

    let (a, b) = tokio::join!(
        store::extraction::mark_message_processed(&pool, &message_id, user.id),
        store::extraction::mark_message_processed(&pool, &message_id, user.id),
    );
    let winners = [a.unwrap(), b.unwrap()].into_iter().filter(|w| *w).count();
    assert_eq!(winners, 1);
}

/// S4 — OCR transient failure then retry: the first attempt is retriable
/// and persists nothing; the second succeeds and leaves exactly one
/// `completed` document, never a stray `error` one.
#[tokio::test]
async fn s4_ocr_transient_failure_then_retry_succeeds() {
    let pool = require_db!();
    let user = connected_user(&pool, &format!("s4-{}@example.test", Uuid::new_v4())).await;

    let ocr = FlakyOcr {
        calls: AtomicUsize::new(0),
        result: ExtractionResult {
            raw_text: "ok".to_string(),
            key_values: vec![],
            tables: vec![],
            text_confidence: Some(88.0),
        },
    };
    let worker = AttachmentWorker::new(pool.clone(), ocr);

    let payload = models::job::AttachmentExtractPayload {
        user_id: user.id,
        message_id: format!("m-{}", Uuid::new_v4()),
        subject: None,
        sender: None,
        message_date: None,
        filename: "scan.png".to_string(),
        mime_type: "image/png".to_string(),
        payload_b64: base64::engine::general_purpose::STANDARD.encode(b"bytes"),
    };

    let first = worker.run(1, 2, &payload).await;
    assert!(first.is_err(), "first attempt should be retriable, not persisted");

    let before = store::extraction::list_recent(&pool, Some(user.id), None, 10)
        .await
        .unwrap();
    assert!(before.is_empty(), "no document should exist after the retriable failure");

    worker
        .run(2, 2, &payload)
        .await
        .expect("second attempt succeeds");

    let after = store::extraction::list_recent(&pool, Some(user.id), None, 10)
        .await
        .unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].status, models::extraction::ExtractionStatus::Completed);
}

/// S5 — watch about to expire: the renewal sweep strictly advances
/// `watchExpiry` to at least `now + 6 days`.
#[tokio::test]
async fn s5_watch_renewal_sweep_advances_expiry() {
    let pool = require_db!();
    let user = connected_user(&pool, &format!("s5-{}@example.test", Uuid::new_v4())).await;

    let soon = Utc::now() + chrono::Duration::minutes(30);
    store::users::set_watch(&pool, user.id, "old-cursor", soon)
        .await
        .unwrap();

    let provider = FakeProvider(Arc::new(FakeProviderState {
        messages: vec![],
        full: HashMap::new(),
        attachments: HashMap::new(),
        mark_read: MarkReadOutcome::Ok,
    }));
    let manager = WatchManager::new(pool.clone(), FakeClientSource(provider), "projects/t/topics/push".to_string());

    let (renewed, errors) = manager.renew_all().await.unwrap();
    assert_eq!(renewed, 1);
    assert!(errors.is_empty());

    let reloaded = store::users::get_by_id(&pool, user.id).await.unwrap().unwrap();
    let new_expiry = reloaded.watch_expiry.expect("watch still active");
    assert!(new_expiry > soon);
    assert!(new_expiry >= Utc::now() + chrono::Duration::days(6));
}

/// S6 — permission-denied on mark-read: the sync job still succeeds,
/// ProcessedEmail is still inserted, and the attachment job still gets
/// enqueued.
#[tokio::test]
async fn s6_permission_denied_mark_read_still_processes() {
    let pool = require_db!();
    let message_id = format!("m-{}", Uuid::new_v4());
    let user = connected_user(&pool, &format!("s6-{}@example.test", Uuid::new_v4())).await;

    let summary = single_attachment_message(&message_id, "invoice.pdf", "application/pdf");
    let full = Message {
        message_id: message_id.clone(),
        subject: summary.subject.clone(),
        sender: summary.sender.clone(),
        snippet: None,
        message_date: summary.message_date,
        attachments: summary.attachments.clone(),
    };
    let provider = FakeProvider(Arc::new(FakeProviderState {
        messages: vec![summary],
        full: HashMap::from([(message_id.clone(), full)]),
        attachments: HashMap::from([((message_id.clone(), "a1".to_string()), b"%PDF-1.4".to_vec())]),
        mark_read: MarkReadOutcome::PermissionDenied,
    }));

    let queue = Queue::new(pool.clone());
    let sync_worker = SyncWorker::new(pool.clone(), FakeClientSource(provider), queue.clone());

    sync_worker
        .run(&MailboxSyncPayload {
            mailbox_address: user.email.clone(),
            cursor_at_notification: "1".to_string(),
            received_at: Utc::now(),
        })
        .await
        .expect("sync run still reports success despite permission denial");

    assert!(store::extraction::is_message_processed(&pool, &message_id)
        .await
        .unwrap());

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.get("attachment_extract").unwrap().pending, 1);
}

/// Boundary: a message with 0 supported attachments is skipped before
/// any ProcessedEmail row is inserted.
#[tokio::test]
async fn boundary_zero_supported_attachments_is_skipped() {
    let pool = require_db!();
    let message_id = format!("m-{}", Uuid::new_v4());
    let user = connected_user(&pool, &format!("boundary-{}@example.test", Uuid::new_v4())).await;

    let summary = MessageSummary {
        message_id: message_id.clone(),
        subject: Some("Newsletter".to_string()),
        sender: None,
        message_date: Some(Utc::now()),
        attachments: vec![],
    };
    let provider = FakeProvider(Arc::new(FakeProviderState {
        messages: vec![summary],
        full: HashMap::new(),
        attachments: HashMap::new(),
        mark_read: MarkReadOutcome::Ok,
    }));

    let queue = Queue::new(pool.clone());
    let sync_worker = SyncWorker::new(pool.clone(), FakeClientSource(provider), queue.clone());

    sync_worker
        .run(&MailboxSyncPayload {
            mailbox_address: user.email.clone(),
            cursor_at_notification: "1".to_string(),
            received_at: Utc::now(),
        })
        .await
        .expect("sync run succeeds");

    assert!(!store::extraction::is_message_processed(&pool, &message_id)
        .await
        .unwrap());
}
