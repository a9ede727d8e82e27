use chrono::{DateTime, Utc};
use models::extraction::{
    ExtractedDocument, ExtractionOutcome, ExtractionStats, ExtractionStatus, KeyValue,
    NewExtractedDocument, Table,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(FromRow)]
struct DocRow {
    id: Uuid,
    user_id: Uuid,
    message_id: String,
    subject: Option<String>,
    sender: Option<String>,
    message_date: Option<DateTime<Utc>>,
    filename: String,
    mime_type: String,
    raw_text: Option<String>,
    key_values: serde_json::Value,
    tables: serde_json::Value,
    confidence: f32,
    status: String,
    error_message: Option<String>,
    extracted_at: DateTime<Utc>,
    notified_at: Option<DateTime<Utc>>,
}

impl TryFrom<DocRow> for ExtractedDocument {
    type Error = anyhow::Error;

    fn try_from(r: DocRow) -> Result<Self, Self::Error> {
        let key_values: Vec<KeyValue> = serde_json::from_value(r.key_values)?;
        let tables: Vec<Table> = serde_json::from_value(r.tables)?;
        let status = match r.status.as_str() {
            "completed" => ExtractionStatus::Completed,
            _ => ExtractionStatus::Error,
        };
        Ok(ExtractedDocument {
            id: r.id,
            user_id: r.user_id,
            message_id: r.message_id,
            subject: r.subject,
            sender: r.sender,
            message_date: r.message_date,
            filename: r.filename,
            mime_type: r.mime_type,
            raw_text: r.raw_text,
            key_values,
            tables,
            confidence: r.confidence,
            status,
            error_message: r.error_message,
            extracted_at: r.extracted_at,
            notified_at: r.notified_at,
        })
    }
}

pub async fn save_extraction(
    pool: &PgPool,
    doc: NewExtractedDocument,
) -> Result<Uuid, anyhow::Error> {
    let id = Uuid::new_v4();

    let (status, raw_text, key_values, tables, confidence, error_message) = match doc.outcome {
        ExtractionOutcome::Completed(result) => {
            let confidence = result.aggregate_confidence();
            (
                ExtractionStatus::Completed,
                Some(result.raw_text),
                result.key_values,
                result.tables,
                confidence,
                None,
            )
        }
        ExtractionOutcome::Error(msg) => (
            ExtractionStatus::Error,
            None,
            Vec::new(),
            Vec::new(),
            0.0,
            Some(msg),
        ),
    };

    sqlx::query(
        r#"
        insert into extracted_documents
            (id, user_id, message_id, subject, sender, message_date, filename, mime_type,
             raw_text, key_values, tables, confidence, status, error_message)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(id)
    .bind(doc.user_id)
    .bind(&doc.message_id)
    .bind(&doc.subject)
    .bind(&doc.sender)
    .bind(doc.message_date)
    .bind(&doc.filename)
    .bind(&doc.mime_type)
    .bind(&raw_text)
    .bind(serde_json::to_value(&key_values)?)
    .bind(serde_json::to_value(&tables)?)
    .bind(confidence)
    .bind(status.to_string())
    .bind(&error_message)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn mark_notified(pool: &PgPool, id: Uuid) -> Result<(), anyhow::Error> {
    sqlx::query("update extracted_documents set notified_at = now() where id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn is_message_processed(pool: &PgPool, message_id: &str) -> Result<bool, anyhow::Error> {
    let exists: Option<(i32,)> =
        sqlx::query_as("select 1 from processed_emails where message_id = $1")
            .bind(message_id)
            .fetch_optional(pool)
            .await?;
    Ok(exists.is_some())
}

/// Idempotent upsert: never returns an error on conflict. Returns `true`
/// when this call performed the insert, i.e. won the race against any
/// concurrent worker processing the same message.
pub async fn mark_message_processed(
    pool: &PgPool,
    message_id: &str,
    user_id: Uuid,
) -> Result<bool, anyhow::Error> {
    let inserted: Option<(String,)> = sqlx::query_as(
        r#"
        insert into processed_emails (message_id, user_id)
        values ($1, $2)
        on conflict (message_id) do nothing
        returning message_id
        "#,
    )
    .bind(message_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(inserted.is_some())
}

pub async fn list_recent(
    pool: &PgPool,
    user_id: Option<Uuid>,
    status: Option<ExtractionStatus>,
    limit: i64,
) -> Result<Vec<ExtractedDocument>, anyhow::Error> {
    let status_str = status.map(|s| s.to_string());
    let rows = sqlx::query_as::<_, DocRow>(
        r#"
        select * from extracted_documents
        where ($1::uuid is null or user_id = $1)
          and ($2::text is null or status = $2)
        order by extracted_at desc
        limit $3
        "#,
    )
    .bind(user_id)
    .bind(status_str)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

pub async fn get_by_id(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<ExtractedDocument>, anyhow::Error> {
    let row = sqlx::query_as::<_, DocRow>("select * from extracted_documents where id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(TryInto::try_into).transpose()
}

pub async fn delete_one(pool: &PgPool, id: Uuid) -> Result<bool, anyhow::Error> {
    let result = sqlx::query("delete from extracted_documents where id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_many(pool: &PgPool, ids: &[Uuid]) -> Result<u64, anyhow::Error> {
    let result = sqlx::query("delete from extracted_documents where id = any($1)")
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn stats(pool: &PgPool, user_id: Option<Uuid>) -> Result<ExtractionStats, anyhow::Error> {
    let row: (i64, i64, i64, Option<f64>) = sqlx::query_as(
        r#"
        select
            count(*) as total,
            count(*) filter (where status = 'completed') as completed,
            count(*) filter (where status = 'error') as errors,
            avg(confidence) filter (where status = 'completed') as avg_confidence
        from extracted_documents
        where $1::uuid is null or user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(ExtractionStats {
        total: row.0,
        completed: row.1,
        errors: row.2,
        avg_confidence: row.3.unwrap_or(0.0) as f32,
    })
}
