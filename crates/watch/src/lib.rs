//! Per-user push watch lifecycle, plus the background renewal sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mailboxclient::ClientSource;
use models::CoreError;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

const INBOX_LABEL: &str = "INBOX";
const RENEWAL_HORIZON: chrono::Duration = chrono::Duration::hours(48);
const SWEEP_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);
const SWEEP_INITIAL_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, serde::Serialize)]
pub struct WatchStatusView {
    pub active: bool,
    pub cursor: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub human_delta: Option<String>,
}

pub struct WatchManager {
    pool: PgPool,
    clients: Arc<dyn ClientSource>,
    topic: String,
}

impl WatchManager {
    pub fn new(pool: PgPool, clients: impl ClientSource + 'static, topic: String) -> Self {
        Self {
            pool,
            clients: Arc::new(clients),
            topic,
        }
    }

    pub async fn start(&self, user_id: Uuid) -> Result<WatchStatusView, CoreError> {
        let provider = self.clients.client_for(user_id).await?;
        let watch = provider
            .register_push_watch(&self.topic, &[INBOX_LABEL.to_string()])
            .await?;

        store::users::set_watch(&self.pool, user_id, &watch.cursor, watch.expires_at)
            .await
            .map_err(CoreError::Other)?;
        observability::metrics::ACTIVE_WATCHES.inc();

        self.status(user_id).await
    }

    /// Best-effort and idempotent: local state clears even if the
    /// provider call fails or the watch was already gone.
    pub async fn stop(&self, user_id: Uuid) -> Result<(), CoreError> {
        if let Ok(provider) = self.clients.client_for(user_id).await {
            if let Err(e) = provider.stop_push_watch().await {
                warn!(error = ?e, %user_id, "provider rejected stop_push_watch, clearing locally anyway");
            }
        }

        let was_active = store::users::get_by_id(&self.pool, user_id)
            .await
            .map_err(CoreError::Other)?
            .is_some_and(|u| u.watch_active(Utc::now()));

        store::users::clear_watch(&self.pool, user_id)
            .await
            .map_err(CoreError::Other)?;
        if was_active {
            observability::metrics::ACTIVE_WATCHES.dec();
        }
        Ok(())
    }

    pub async fn renew(&self, user_id: Uuid) -> Result<WatchStatusView, CoreError> {
        self.stop(user_id).await?;
        self.start(user_id).await
    }

    pub async fn status(&self, user_id: Uuid) -> Result<WatchStatusView, CoreError> {
        let user = store::users::get_by_id(&self.pool, user_id)
            .await
            .map_err(CoreError::Other)?
            .ok_or(CoreError::UserMissing)?;

        let now = Utc::now();
        let active = user.watch_active(now);
        Ok(WatchStatusView {
            active,
            cursor: user.mailbox_cursor,
            expires_at: user.watch_expiry,
            human_delta: user.watch_expiry.map(|exp| human_delta(exp, now)),
        })
    }

    /// Runs forever: once after a short startup delay, then every 12h.
    /// Individual renewal failures are logged and never abort the sweep.
    pub async fn run_sweep(&self) {
        tokio::time::sleep(SWEEP_INITIAL_DELAY).await;
        loop {
            self.sweep_once().await;
            tokio::time::sleep(SWEEP_INTERVAL).await;
        }
    }

    pub async fn sweep_once(&self) {
        if let Err(e) = self.renew_all().await {
            error!(error = ?e, "watch renewal sweep failed to list due users");
        }
    }

    /// Renews every watch due to expire within [`RENEWAL_HORIZON`], used by
    /// both the background sweep and the operator-triggered
    /// `renew-all` endpoint. Returns the count renewed and the per-user
    /// error messages for whatever failed, rather than aborting on the
    /// first failure.
    pub async fn renew_all(&self) -> Result<(usize, Vec<String>), CoreError> {
        let threshold = Utc::now() + RENEWAL_HORIZON;
        let due = store::users::list_due_for_renewal(&self.pool, threshold)
            .await
            .map_err(CoreError::Other)?;

        info!(count = due.len(), "renewing watches due to expire");
        let mut renewed = 0usize;
        let mut errors = Vec::new();
        for user in due {
            match self.renew(user.id).await {
                Ok(_) => renewed += 1,
                Err(e) => {
                    warn!(error = ?e, user_id = %user.id, "failed to renew watch");
                    errors.push(format!("{}: {e}", user.id));
                }
            }
        }
        Ok((renewed, errors))
    }
}

fn human_delta(expiry: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = expiry - now;
    if delta.num_seconds() <= 0 {
        "expired".to_string()
    } else if delta.num_hours() < 1 {
        format!("{}m", delta.num_minutes())
    } else if delta.num_hours() < 48 {
        format!("{}h", delta.num_hours())
    } else {
        format!("{}d", delta.num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_delta_picks_the_coarsest_useful_unit() {
        let now = Utc::now();
        assert_eq!(human_delta(now + chrono::Duration::minutes(30), now), "30m");
        assert_eq!(human_delta(now + chrono::Duration::hours(5), now), "5h");
        assert_eq!(human_delta(now + chrono::Duration::days(3), now), "3d");
        assert_eq!(human_delta(now - chrono::Duration::minutes(1), now), "expired");
    }
}
