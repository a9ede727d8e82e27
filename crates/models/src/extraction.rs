use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Completed,
    Error,
}

/// A single key/value pair lifted from a KEY_VALUE_SET block pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    /// 0..=100, mean of the KEY and VALUE block confidences.
    pub confidence: f32,
}

/// A table as extracted by the OCR provider: rows of cell text, sorted by
/// row then column index. Rows are rectangular only when the source table
/// itself was; no padding is enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
    pub confidence: f32,
}

/// Canonical, provider-agnostic output of the OCR client (C3). Workers
/// persist this verbatim into `ExtractedDocument`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub raw_text: String,
    pub key_values: Vec<KeyValue>,
    pub tables: Vec<Table>,
    /// Set only by the plain-text-detection path (no KEY_VALUE_SET/TABLE
    /// blocks to average over): the mean LINE block confidence instead.
    #[serde(default)]
    pub text_confidence: Option<f32>,
}

impl ExtractionResult {
    /// Arithmetic mean of every KV and table confidence; 0 when both lists
    /// are empty, unless `text_confidence` was set by the plain-text
    /// fallback, in which case that takes its place. This is the single
    /// aggregate-confidence formula used everywhere a document's overall
    /// confidence is reported.
    pub fn aggregate_confidence(&self) -> f32 {
        if self.key_values.is_empty() && self.tables.is_empty() {
            if let Some(c) = self.text_confidence {
                return c;
            }
        }

        let mut sum = 0.0f32;
        let mut count = 0usize;
        for kv in &self.key_values {
            sum += kv.confidence;
            count += 1;
        }
        for t in &self.tables {
            sum += t.confidence;
            count += 1;
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }
}

/// One result per processed attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub id: Uuid,
    pub user_id: Uuid,

    pub message_id: String,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub message_date: Option<DateTime<Utc>>,

    pub filename: String,
    pub mime_type: String,

    pub raw_text: Option<String>,
    pub key_values: Vec<KeyValue>,
    pub tables: Vec<Table>,
    pub confidence: f32,

    pub status: ExtractionStatus,
    pub error_message: Option<String>,

    pub extracted_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
}

pub struct NewExtractedDocument {
    pub user_id: Uuid,
    pub message_id: String,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub message_date: Option<DateTime<Utc>>,
    pub filename: String,
    pub mime_type: String,
    pub outcome: ExtractionOutcome,
}

/// What the attachment worker learned from the OCR client: either a
/// normalized result, or the error it should record instead. A failed
/// extraction still produces a visible `error` document rather than
/// vanishing silently.
pub enum ExtractionOutcome {
    Completed(ExtractionResult),
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtractionStats {
    pub total: i64,
    pub completed: i64,
    pub errors: i64,
    pub avg_confidence: f32,
}

/// Idempotency marker keyed by provider message id. Message ids are
/// assumed globally unique across mailboxes, so the marker is keyed by
/// message id alone rather than by (user, message id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEmail {
    pub message_id: String,
    pub user_id: Uuid,
    pub processed_at: DateTime<Utc>,
}
