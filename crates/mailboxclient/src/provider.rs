use async_trait::async_trait;
use models::mailbox::{Message, MessageSummary, PushWatch};
use models::CoreError;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReadOutcome {
    Ok,
    PermissionDenied,
}

/// Provider-agnostic mailbox operations. `GmailProvider` is the only
/// implementation today; the trait exists so the sync/attachment workers
/// never talk to a concrete SDK directly.
#[async_trait]
pub trait MailboxProvider: Send + Sync {
    async fn list_unread_with_attachments(
        &self,
        limit: usize,
    ) -> Result<Vec<MessageSummary>, CoreError>;

    async fn fetch_message(&self, message_id: &str) -> Result<Message, CoreError>;

    async fn fetch_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, CoreError>;

    async fn mark_read(&self, message_id: &str) -> Result<MarkReadOutcome, CoreError>;

    async fn register_push_watch(
        &self,
        topic: &str,
        labels: &[String],
    ) -> Result<PushWatch, CoreError>;

    async fn stop_push_watch(&self) -> Result<(), CoreError>;
}

/// Resolves an authenticated [`MailboxProvider`] for a user. The trait
/// behind `ClientFactory` so workers can be driven against a fake
/// provider in tests instead of real OAuth/Gmail calls.
#[async_trait]
pub trait ClientSource: Send + Sync {
    async fn client_for(&self, user_id: Uuid) -> Result<Box<dyn MailboxProvider>, CoreError>;
}
