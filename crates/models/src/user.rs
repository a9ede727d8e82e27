use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity record for a mailbox owner. Governing invariants:
/// `mailbox_connected ⇒ encrypted_refresh_token.is_some()`, and
/// `!mailbox_connected ⇒` every token/watch field is `None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub image_url: Option<String>,

    pub mailbox_connected: bool,
    pub encrypted_refresh_token: Option<String>,
    pub encrypted_access_token: Option<String>,
    pub access_token_expiry: Option<DateTime<Utc>>,

    /// Opaque, monotonically-advancing cursor supplied by the mailbox
    /// provider. Advanced last-writer-wins by the sync worker.
    pub mailbox_cursor: Option<String>,
    pub watch_expiry: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            display_name: None,
            image_url: None,
            mailbox_connected: false,
            encrypted_refresh_token: None,
            encrypted_access_token: None,
            access_token_expiry: None,
            mailbox_cursor: None,
            watch_expiry: None,
            created_at: Utc::now(),
        }
    }

    /// Derived view: a watch is active iff it hasn't expired yet.
    pub fn watch_active(&self, now: DateTime<Utc>) -> bool {
        self.watch_expiry.is_some_and(|exp| exp > now)
    }

    pub fn assert_invariants(&self) {
        if self.mailbox_connected {
            debug_assert!(self.encrypted_refresh_token.is_some());
        } else {
            debug_assert!(self.encrypted_refresh_token.is_none());
            debug_assert!(self.encrypted_access_token.is_none());
            debug_assert!(self.access_token_expiry.is_none());
            debug_assert!(self.mailbox_cursor.is_none());
            debug_assert!(self.watch_expiry.is_none());
        }
    }
}
