//! Builds an authenticated [`MailboxProvider`] for a user, refreshing the
//! OAuth access token first when it's near expiry. Concurrent callers for
//! the same user share one refresh attempt instead of racing the token
//! endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use models::CoreError;
use once_cell::sync::Lazy;
use serde::Deserialize;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::gmail::GmailProvider;
use crate::provider::{ClientSource, MailboxProvider};

const REFRESH_SKEW: chrono::Duration = chrono::Duration::seconds(60);
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

static REFRESH_LOCKS: Lazy<DashMap<Uuid, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

fn lock_for(user_id: Uuid) -> Arc<Mutex<()>> {
    REFRESH_LOCKS
        .entry(user_id)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Clone)]
pub struct ClientFactory {
    pool: PgPool,
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl ClientFactory {
    pub fn new(pool: PgPool, client_id: String, client_secret: String) -> Self {
        Self {
            pool,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build reqwest client"),
            client_id,
            client_secret,
        }
    }

    /// Returns a provider authenticated for `user_id`, refreshing the
    /// access token first if it's missing or about to expire.
    pub async fn client_for(
        &self,
        user_id: Uuid,
    ) -> Result<Box<dyn MailboxProvider>, CoreError> {
        let user = store::users::get_by_id(&self.pool, user_id)
            .await
            .map_err(CoreError::Other)?
            .ok_or(CoreError::UserMissing)?;

        if !user.mailbox_connected {
            return Err(CoreError::NotConnected);
        }
        let encrypted_refresh = user
            .encrypted_refresh_token
            .as_deref()
            .ok_or(CoreError::NotConnected)?;

        let needs_refresh = match (&user.encrypted_access_token, user.access_token_expiry) {
            (Some(_), Some(expiry)) => expiry <= Utc::now() + REFRESH_SKEW,
            _ => true,
        };

        let access_token = if needs_refresh {
            let guard = lock_for(user_id);
            let _permit = guard.lock().await;

            // re-read: another task may have refreshed while we waited
            let fresh = store::users::get_by_id(&self.pool, user_id)
                .await
                .map_err(CoreError::Other)?
                .ok_or(CoreError::UserMissing)?;

            match (&fresh.encrypted_access_token, fresh.access_token_expiry) {
                (Some(tok), Some(expiry)) if expiry > Utc::now() + REFRESH_SKEW => {
                    vault::open_string(tok).map_err(|e| CoreError::Auth(e.to_string()))?
                }
                _ => {
                    let refresh_token = vault::open_string(encrypted_refresh)
                        .map_err(|e| CoreError::Auth(e.to_string()))?;
                    self.refresh_access_token(user_id, &refresh_token).await?
                }
            }
        } else {
            let encrypted = user
                .encrypted_access_token
                .as_deref()
                .ok_or(CoreError::NotConnected)?;
            vault::open_string(encrypted).map_err(|e| CoreError::Auth(e.to_string()))?
        };

        Ok(Box::new(GmailProvider::new(self.http.clone(), access_token)))
    }

    async fn refresh_access_token(
        &self,
        user_id: Uuid,
        refresh_token: &str,
    ) -> Result<String, CoreError> {
        let resp = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| CoreError::Other(e.into()))?;

        if resp.status() == reqwest::StatusCode::BAD_REQUEST
            || resp.status() == reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(CoreError::Auth("refresh token rejected by provider".into()));
        }
        let token: TokenResponse = resp
            .error_for_status()
            .map_err(|e| CoreError::Other(e.into()))?
            .json()
            .await
            .map_err(|e| CoreError::Other(e.into()))?;

        let expiry = Utc::now() + chrono::Duration::seconds(token.expires_in);
        let sealed = vault::seal_string(&token.access_token);
        store::users::set_access_token(&self.pool, user_id, &sealed, expiry)
            .await
            .map_err(CoreError::Other)?;

        Ok(token.access_token)
    }
}

#[async_trait]
impl ClientSource for ClientFactory {
    async fn client_for(&self, user_id: Uuid) -> Result<Box<dyn MailboxProvider>, CoreError> {
        ClientFactory::client_for(self, user_id).await
    }
}
