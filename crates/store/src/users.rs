use chrono::{DateTime, Utc};
use models::user::User;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    display_name: Option<String>,
    image_url: Option<String>,
    mailbox_connected: bool,
    encrypted_refresh_token: Option<String>,
    encrypted_access_token: Option<String>,
    access_token_expiry: Option<DateTime<Utc>>,
    mailbox_cursor: Option<String>,
    watch_expiry: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            email: r.email,
            display_name: r.display_name,
            image_url: r.image_url,
            mailbox_connected: r.mailbox_connected,
            encrypted_refresh_token: r.encrypted_refresh_token,
            encrypted_access_token: r.encrypted_access_token,
            access_token_expiry: r.access_token_expiry,
            mailbox_cursor: r.mailbox_cursor,
            watch_expiry: r.watch_expiry,
            created_at: r.created_at,
        }
    }
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, anyhow::Error> {
    let row = sqlx::query_as::<_, UserRow>("select * from users where id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Into::into))
}

pub async fn get_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, anyhow::Error> {
    let row = sqlx::query_as::<_, UserRow>("select * from users where email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Into::into))
}

/// A mailbox-sync job only has the provider's mailbox address to go on;
/// in this deployment shape that's the user's email address.
pub async fn get_by_mailbox_address(
    pool: &PgPool,
    mailbox_address: &str,
) -> Result<Option<User>, anyhow::Error> {
    get_by_email(pool, mailbox_address).await
}

/// Upsert used by `/api/user/sync`: creates the user on first sign-in,
/// otherwise refreshes display info without touching mailbox state.
pub async fn upsert_by_email(
    pool: &PgPool,
    email: &str,
    display_name: Option<&str>,
    image_url: Option<&str>,
) -> Result<User, anyhow::Error> {
    let row = sqlx::query_as::<_, UserRow>(
        r#"
        insert into users (id, email, display_name, image_url)
        values ($1, $2, $3, $4)
        on conflict (email) do update
            set display_name = coalesce(excluded.display_name, users.display_name),
                image_url = coalesce(excluded.image_url, users.image_url)
        returning *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(display_name)
    .bind(image_url)
    .fetch_one(pool)
    .await?;
    Ok(row.into())
}

/// Called after the OAuth callback exchanges a code for tokens.
pub async fn connect_mailbox(
    pool: &PgPool,
    user_id: Uuid,
    encrypted_refresh_token: &str,
    encrypted_access_token: &str,
    access_token_expiry: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    sqlx::query(
        r#"
        update users
        set mailbox_connected = true,
            encrypted_refresh_token = $2,
            encrypted_access_token = $3,
            access_token_expiry = $4
        where id = $1
        "#,
    )
    .bind(user_id)
    .bind(encrypted_refresh_token)
    .bind(encrypted_access_token)
    .bind(access_token_expiry)
    .execute(pool)
    .await?;
    Ok(())
}

/// Refreshed access token, persisted by the Mailbox Client Factory (C2)
/// after a successful synchronous refresh.
pub async fn set_access_token(
    pool: &PgPool,
    user_id: Uuid,
    encrypted_access_token: &str,
    expiry: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    sqlx::query(
        "update users set encrypted_access_token = $2, access_token_expiry = $3 where id = $1",
    )
    .bind(user_id)
    .bind(encrypted_access_token)
    .bind(expiry)
    .execute(pool)
    .await?;
    Ok(())
}

/// Disconnects a mailbox: every token/watch field goes back to null, not
/// just `mailbox_connected`.
pub async fn disconnect_mailbox(pool: &PgPool, user_id: Uuid) -> Result<(), anyhow::Error> {
    sqlx::query(
        r#"
        update users
        set mailbox_connected = false,
            encrypted_refresh_token = null,
            encrypted_access_token = null,
            access_token_expiry = null,
            mailbox_cursor = null,
            watch_expiry = null
        where id = $1
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_watch(
    pool: &PgPool,
    user_id: Uuid,
    cursor: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    sqlx::query("update users set mailbox_cursor = $2, watch_expiry = $3 where id = $1")
        .bind(user_id)
        .bind(cursor)
        .bind(expires_at)
        .execute(pool)
        .await?;
    Ok(())
}

/// `stop()` is best-effort and idempotent: always clears the locally-held
/// watch state even if the provider call failed or the watch was already
/// gone.
pub async fn clear_watch(pool: &PgPool, user_id: Uuid) -> Result<(), anyhow::Error> {
    sqlx::query("update users set mailbox_cursor = null, watch_expiry = null where id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Last-writer-wins cursor advance — never conditioned on the cursor
/// already stored.
pub async fn advance_cursor(
    pool: &PgPool,
    user_id: Uuid,
    cursor: &str,
) -> Result<(), anyhow::Error> {
    sqlx::query("update users set mailbox_cursor = $2 where id = $1")
        .bind(user_id)
        .bind(cursor)
        .execute(pool)
        .await?;
    Ok(())
}

/// Picks an arbitrary connected user — used by the operator-triggered
/// `/api/process` endpoint when no `userId` is given, on the assumption
/// that a deployment invoking it bare has exactly one mailbox connected.
pub async fn first_connected(pool: &PgPool) -> Result<Option<User>, anyhow::Error> {
    let row = sqlx::query_as::<_, UserRow>(
        "select * from users where mailbox_connected = true order by created_at limit 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Into::into))
}

/// Every mailbox-connected user, for the watch-list admin endpoint.
pub async fn list_connected(pool: &PgPool) -> Result<Vec<User>, anyhow::Error> {
    let rows = sqlx::query_as::<_, UserRow>(
        "select * from users where mailbox_connected = true order by created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Selects every connected user whose watch expires before `threshold`,
/// for the renewal sweep.
pub async fn list_due_for_renewal(
    pool: &PgPool,
    threshold: DateTime<Utc>,
) -> Result<Vec<User>, anyhow::Error> {
    let rows = sqlx::query_as::<_, UserRow>(
        r#"
        select * from users
        where mailbox_connected = true
          and (watch_expiry is null or watch_expiry < $1)
        "#,
    )
    .bind(threshold)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_active_derivation() {
        let mut u = User::new("a@example.test");
        let now = Utc::now();
        assert!(!u.watch_active(now));
        u.watch_expiry = Some(now + chrono::Duration::hours(1));
        assert!(u.watch_active(now));
        u.watch_expiry = Some(now - chrono::Duration::hours(1));
        assert!(!u.watch_active(now));
    }
}
