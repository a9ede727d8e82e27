//! Gmail implementation of [`MailboxProvider`]. Talks to the Gmail REST
//! API directly over `reqwest`, the same client-building style the
//! reference system uses for its identity-provider calls.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use models::mailbox::{AttachmentSummary, Message, MessageSummary, PushWatch};
use models::CoreError;
use serde::Deserialize;
use serde_json::json;

use crate::provider::{MailboxProvider, MarkReadOutcome};

const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

pub struct GmailProvider {
    http: reqwest::Client,
    access_token: String,
}

impl GmailProvider {
    pub fn new(http: reqwest::Client, access_token: String) -> Self {
        Self { http, access_token }
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.access_token)
    }
}

#[derive(Deserialize)]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageId>,
}

#[derive(Deserialize)]
struct MessageId {
    id: String,
}

#[derive(Deserialize)]
struct GmailMessage {
    id: String,
    payload: Option<GmailPart>,
    #[serde(rename = "internalDate")]
    internal_date: Option<String>,
    snippet: Option<String>,
}

#[derive(Deserialize, Default)]
struct GmailPart {
    #[serde(default)]
    headers: Vec<GmailHeader>,
    #[serde(default)]
    parts: Vec<GmailPart>,
    filename: Option<String>,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    body: Option<GmailBody>,
}

#[derive(Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct GmailBody {
    #[serde(rename = "attachmentId")]
    attachment_id: Option<String>,
    size: Option<u64>,
}

fn header<'a>(headers: &'a [GmailHeader], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn collect_attachments(part: &GmailPart, out: &mut Vec<AttachmentSummary>) {
    if let (Some(filename), Some(body)) = (&part.filename, &part.body) {
        if !filename.is_empty() {
            if let Some(attachment_id) = &body.attachment_id {
                out.push(AttachmentSummary {
                    attachment_id: attachment_id.clone(),
                    filename: filename.clone(),
                    mime_type: part.mime_type.clone().unwrap_or_default(),
                    size_bytes: body.size.unwrap_or(0),
                });
            }
        }
    }
    for child in &part.parts {
        collect_attachments(child, out);
    }
}

fn to_message(raw: GmailMessage) -> Message {
    let payload = raw.payload.unwrap_or_default();
    let mut attachments = Vec::new();
    collect_attachments(&payload, &mut attachments);

    let message_date = raw
        .internal_date
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

    Message {
        message_id: raw.id,
        subject: header(&payload.headers, "Subject").map(str::to_string),
        sender: header(&payload.headers, "From").map(str::to_string),
        snippet: raw.snippet,
        message_date,
        attachments,
    }
}

#[async_trait]
impl MailboxProvider for GmailProvider {
    async fn list_unread_with_attachments(
        &self,
        limit: usize,
    ) -> Result<Vec<MessageSummary>, CoreError> {
        let resp = self
            .auth(self.http.get(format!("{API_BASE}/messages")))
            .query(&[
                ("q", "is:unread has:attachment"),
                ("maxResults", &limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| CoreError::Other(e.into()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CoreError::Auth("access token rejected".into()));
        }
        let listed: ListMessagesResponse = resp
            .error_for_status()
            .map_err(|e| CoreError::Other(e.into()))?
            .json()
            .await
            .map_err(|e| CoreError::Other(e.into()))?;

        let mut out = Vec::with_capacity(listed.messages.len());
        for m in listed.messages {
            let full = self.fetch_message(&m.id).await?;
            out.push(MessageSummary {
                message_id: full.message_id,
                subject: full.subject,
                sender: full.sender,
                message_date: full.message_date,
                attachments: full
                    .attachments
                    .into_iter()
                    .filter(|a| a.is_supported())
                    .collect(),
            });
        }
        Ok(out)
    }

    async fn fetch_message(&self, message_id: &str) -> Result<Message, CoreError> {
        let resp = self
            .auth(self.http.get(format!("{API_BASE}/messages/{message_id}")))
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| CoreError::Other(e.into()))?
            .error_for_status()
            .map_err(|e| CoreError::Other(e.into()))?;

        let raw: GmailMessage = resp.json().await.map_err(|e| CoreError::Other(e.into()))?;
        Ok(to_message(raw))
    }

    async fn fetch_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, CoreError> {
        #[derive(Deserialize)]
        struct AttachmentBody {
            data: String,
        }

        let resp = self
            .auth(self.http.get(format!(
                "{API_BASE}/messages/{message_id}/attachments/{attachment_id}"
            )))
            .send()
            .await
            .map_err(|e| CoreError::Other(e.into()))?
            .error_for_status()
            .map_err(|e| CoreError::Other(e.into()))?;

        let body: AttachmentBody = resp.json().await.map_err(|e| CoreError::Other(e.into()))?;
        use base64::Engine as _;
        base64::engine::general_purpose::URL_SAFE
            .decode(body.data.replace('-', "+").replace('_', "/"))
            .map_err(|e| CoreError::Other(anyhow::anyhow!("bad attachment encoding: {e}")))
    }

    async fn mark_read(&self, message_id: &str) -> Result<MarkReadOutcome, CoreError> {
        let resp = self
            .auth(
                self.http
                    .post(format!("{API_BASE}/messages/{message_id}/modify")),
            )
            .json(&json!({ "removeLabelIds": ["UNREAD"] }))
            .send()
            .await
            .map_err(|e| CoreError::Other(e.into()))?;

        if resp.status() == reqwest::StatusCode::FORBIDDEN {
            return Ok(MarkReadOutcome::PermissionDenied);
        }
        resp.error_for_status()
            .map_err(|e| CoreError::Other(e.into()))?;
        Ok(MarkReadOutcome::Ok)
    }

    async fn register_push_watch(
        &self,
        topic: &str,
        labels: &[String],
    ) -> Result<PushWatch, CoreError> {
        #[derive(Deserialize)]
        struct WatchResponse {
            #[serde(rename = "historyId")]
            history_id: String,
            expiration: String,
        }

        let resp = self
            .auth(self.http.post(format!("{API_BASE}/watch")))
            .json(&json!({ "topicName": topic, "labelIds": labels }))
            .send()
            .await
            .map_err(|e| CoreError::Other(e.into()))?
            .error_for_status()
            .map_err(|e| CoreError::Other(e.into()))?;

        let watch: WatchResponse = resp.json().await.map_err(|e| CoreError::Other(e.into()))?;
        let expires_at: DateTime<Utc> = watch
            .expiration
            .parse::<i64>()
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(|| Utc::now() + chrono::Duration::days(7));

        Ok(PushWatch {
            cursor: watch.history_id,
            expires_at,
        })
    }

    async fn stop_push_watch(&self) -> Result<(), CoreError> {
        let resp = self
            .auth(self.http.post(format!("{API_BASE}/stop")))
            .send()
            .await
            .map_err(|e| CoreError::Other(e.into()))?;
        // provider-side failure here doesn't block local disconnect
        let _ = resp.error_for_status();
        Ok(())
    }
}
