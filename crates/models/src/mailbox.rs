use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attachment metadata as seen before the bytes are fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentSummary {
    pub attachment_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSummary {
    pub message_id: String,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub message_date: Option<DateTime<Utc>>,
    pub attachments: Vec<AttachmentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub snippet: Option<String>,
    pub message_date: Option<DateTime<Utc>>,
    pub attachments: Vec<AttachmentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushWatch {
    pub cursor: String,
    pub expires_at: DateTime<Utc>,
}

const SUPPORTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/tiff",
];

const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "tif", "tiff"];

/// MIME OR extension is sufficient: an `application/octet-stream`
/// attachment named `invoice.PDF` is still accepted.
pub fn is_supported_attachment(mime_type: &str, filename: &str) -> bool {
    let mime_ok = SUPPORTED_MIME_TYPES
        .iter()
        .any(|m| m.eq_ignore_ascii_case(mime_type));

    let ext_ok = filename
        .rsplit('.')
        .next()
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|e| e.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false);

    mime_ok || ext_ok
}

impl AttachmentSummary {
    pub fn is_supported(&self) -> bool {
        is_supported_attachment(&self.mime_type, &self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_case_insensitive() {
        assert!(is_supported_attachment(
            "application/octet-stream",
            "invoice.PDF"
        ));
    }

    #[test]
    fn mime_or_extension_sufficient() {
        assert!(is_supported_attachment("image/png", "photo.bin"));
        assert!(is_supported_attachment("application/octet-stream", "scan.tiff"));
        assert!(!is_supported_attachment("text/plain", "notes.txt"));
    }
}
