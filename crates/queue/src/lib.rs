//! Queue Substrate (C6): a durable, at-least-once job queue on top of the
//! same Postgres instance as the rest of the system, rather than adding a
//! second network dependency (Redis). `SELECT ... FOR UPDATE SKIP LOCKED`
//! gives safe concurrent claiming across worker processes; see
//! `DESIGN.md` for the reasoning and the `REDIS_*` env vars this replaces.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use models::job::{Job, JobKind, JobState, QueueCounts};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base: std::time::Duration,
    pub cap: std::time::Duration,
}

impl RetryPolicy {
    pub const SYNC: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        base: std::time::Duration::from_secs(5),
        cap: std::time::Duration::from_secs(300),
    };
    pub const ATTACHMENT: RetryPolicy = RetryPolicy {
        max_attempts: 2,
        base: std::time::Duration::from_secs(5),
        cap: std::time::Duration::from_secs(300),
    };

    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::MailboxSync => Self::SYNC,
            JobKind::AttachmentExtract => Self::ATTACHMENT,
        }
    }

    /// Exponential backoff: `base * 2^(attempt-1)`, capped at `cap`.
    pub fn backoff_for_attempt(&self, attempt: i32) -> std::time::Duration {
        let exp = attempt.saturating_sub(1).clamp(0, 20) as u32;
        let scaled = self.base.saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX));
        scaled.min(self.cap)
    }
}

pub const COMPLETED_RETENTION_COUNT: i64 = 100;
pub const FAILED_RETENTION_COUNT: i64 = 500;

fn completed_retention_age() -> ChronoDuration {
    ChronoDuration::hours(24)
}
fn failed_retention_age() -> ChronoDuration {
    ChronoDuration::days(7)
}

#[derive(Clone)]
pub struct Queue {
    pool: PgPool,
}

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    kind: String,
    dedup_key: String,
    payload: serde_json::Value,
    state: String,
    attempts: i32,
    max_attempts: i32,
    run_at: DateTime<Utc>,
    trace_context: Option<String>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

fn kind_str(kind: JobKind) -> &'static str {
    match kind {
        JobKind::MailboxSync => "mailbox_sync",
        JobKind::AttachmentExtract => "attachment_extract",
    }
}

fn parse_state(s: &str) -> JobState {
    match s {
        "pending" => JobState::Pending,
        "active" => JobState::Active,
        "completed" => JobState::Completed,
        _ => JobState::Failed,
    }
}

fn parse_kind(s: &str) -> JobKind {
    match s {
        "attachment_extract" => JobKind::AttachmentExtract,
        _ => JobKind::MailboxSync,
    }
}

impl From<JobRow> for Job {
    fn from(r: JobRow) -> Self {
        Job {
            id: r.id,
            kind: parse_kind(&r.kind),
            dedup_key: r.dedup_key,
            payload: r.payload,
            state: parse_state(&r.state),
            attempts: r.attempts,
            max_attempts: r.max_attempts,
            run_at: r.run_at,
            trace_context: r.trace_context,
            last_error: r.last_error,
            created_at: r.created_at,
        }
    }
}

impl Queue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new job, or returns the id of an existing job with the
    /// same dedup key if one is already enqueued. This is what makes
    /// redelivering the same push notification, or retrying the same
    /// attachment twice, collapse to a single logical job.
    pub async fn enqueue<P: Serialize>(
        &self,
        kind: JobKind,
        payload: &P,
        dedup_key: &str,
        trace_context: Option<&str>,
    ) -> Result<Uuid, anyhow::Error> {
        let policy = RetryPolicy::for_kind(kind);
        let id = Uuid::new_v4();
        let payload_json = serde_json::to_value(payload)?;

        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            insert into queue_jobs (id, kind, dedup_key, payload, max_attempts, trace_context)
            values ($1, $2, $3, $4, $5, $6)
            on conflict (dedup_key) do nothing
            returning id
            "#,
        )
        .bind(id)
        .bind(kind_str(kind))
        .bind(dedup_key)
        .bind(&payload_json)
        .bind(policy.max_attempts)
        .bind(trace_context)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = inserted {
            return Ok(id);
        }

        let (existing,): (Uuid,) =
            sqlx::query_as("select id from queue_jobs where dedup_key = $1")
                .bind(dedup_key)
                .fetch_one(&self.pool)
                .await?;
        Ok(existing)
    }

    /// Atomically claims the next runnable job of `kind`, marking it
    /// active. `SKIP LOCKED` means concurrent workers (same or different
    /// process) never block on each other and never double-claim.
    pub async fn claim_next(&self, kind: JobKind) -> Result<Option<Job>, anyhow::Error> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            update queue_jobs
            set state = 'active', attempts = attempts + 1
            where id = (
                select id from queue_jobs
                where kind = $1 and state = 'pending' and run_at <= now()
                order by run_at
                for update skip locked
                limit 1
            )
            returning *
            "#,
        )
        .bind(kind_str(kind))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    pub async fn complete(&self, job_id: Uuid) -> Result<(), anyhow::Error> {
        sqlx::query(
            "update queue_jobs set state = 'completed', completed_at = now() where id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fails a job: retries with exponential backoff while attempts remain
    /// and the error is retriable, otherwise moves it to the terminal
    /// `failed` (dead-letter) state. Never retried automatically past
    /// `max_attempts`.
    pub async fn fail(
        &self,
        job: &Job,
        error_message: &str,
        retriable: bool,
    ) -> Result<(), anyhow::Error> {
        let policy = RetryPolicy::for_kind(job.kind);

        if retriable && job.attempts < job.max_attempts {
            let delay = policy.backoff_for_attempt(job.attempts);
            let run_at = Utc::now() + ChronoDuration::from_std(delay).unwrap_or_default();
            sqlx::query(
                "update queue_jobs set state = 'pending', run_at = $2, last_error = $3 where id = $1",
            )
            .bind(job.id)
            .bind(run_at)
            .bind(error_message)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "update queue_jobs set state = 'failed', last_error = $2, completed_at = now() where id = $1",
            )
            .bind(job.id)
            .bind(error_message)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn counts(&self) -> Result<std::collections::HashMap<String, QueueCounts>, anyhow::Error> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "select kind, state, count(*) from queue_jobs group by kind, state",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out: std::collections::HashMap<String, QueueCounts> = std::collections::HashMap::new();
        for (kind, state, count) in rows {
            let entry = out.entry(kind).or_default();
            match state.as_str() {
                "pending" => entry.pending = count,
                "active" => entry.active = count,
                "completed" => entry.completed = count,
                _ => entry.failed = count,
            }
        }
        Ok(out)
    }

    /// Retention sweep: completed jobs keep the newest 100 or 24h, failed
    /// jobs keep the newest 500 or 7d. Deletes whichever rows fall outside
    /// *both* the count and age bounds for their kind+state.
    pub async fn purge_retained(&self) -> Result<u64, anyhow::Error> {
        let mut total = 0u64;
        for kind in [JobKind::MailboxSync, JobKind::AttachmentExtract] {
            total += self
                .purge_state(kind, "completed", COMPLETED_RETENTION_COUNT, completed_retention_age())
                .await?;
            total += self
                .purge_state(kind, "failed", FAILED_RETENTION_COUNT, failed_retention_age())
                .await?;
        }
        Ok(total)
    }

    async fn purge_state(
        &self,
        kind: JobKind,
        state: &str,
        keep_count: i64,
        max_age: ChronoDuration,
    ) -> Result<u64, anyhow::Error> {
        let cutoff = Utc::now() - max_age;
        let result = sqlx::query(
            r#"
            delete from queue_jobs
            where id in (
                select id from (
                    select id, row_number() over (order by completed_at desc) as rn
                    from queue_jobs
                    where kind = $1 and state = $2
                ) ranked
                where ranked.rn > $3
            )
            or (kind = $1 and state = $2 and completed_at < $4)
            "#,
        )
        .bind(kind_str(kind))
        .bind(state)
        .bind(keep_count)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy::SYNC;
        assert_eq!(p.backoff_for_attempt(1), std::time::Duration::from_secs(5));
        assert_eq!(p.backoff_for_attempt(2), std::time::Duration::from_secs(10));
        assert_eq!(p.backoff_for_attempt(3), std::time::Duration::from_secs(20));
        assert_eq!(p.backoff_for_attempt(20), p.cap);
    }

    #[test]
    fn default_policies_have_expected_attempt_counts() {
        assert_eq!(RetryPolicy::SYNC.max_attempts, 3);
        assert_eq!(RetryPolicy::ATTACHMENT.max_attempts, 2);
    }
}
