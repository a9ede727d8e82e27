use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    MailboxSync,
    AttachmentExtract,
}

/// Payload for a `mailbox-sync` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxSyncPayload {
    pub mailbox_address: String,
    pub cursor_at_notification: String,
    pub received_at: DateTime<Utc>,
}

impl MailboxSyncPayload {
    pub fn dedup_key(&self) -> String {
        format!(
            "sync:{}:{}",
            self.mailbox_address, self.cursor_at_notification
        )
    }
}

/// Payload for an `attachment-extract` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentExtractPayload {
    pub user_id: Uuid,
    pub message_id: String,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub message_date: Option<DateTime<Utc>>,
    pub filename: String,
    pub mime_type: String,
    /// Base64-encoded attachment bytes captured at sync time.
    pub payload_b64: String,
}

impl AttachmentExtractPayload {
    pub fn dedup_key(&self) -> String {
        format!("att:{}:{}", self.message_id, self.filename)
    }
}

/// A dequeued unit of work, deserialized and ready to hand to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub dedup_key: String,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
    pub trace_context: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}
