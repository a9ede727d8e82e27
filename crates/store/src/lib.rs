//! Persistence layer (C5 Extraction Store, plus the User and queue tables
//! that back C2/C7/C6). One `Store` wraps the Postgres pool; everything
//! else is a free function over `&PgPool`, following the reference
//! system's "free function over an explicit pool handle" shape in
//! `dal::web` rather than its generic `DBTable` machinery — that
//! machinery is nightly-feature gated and far more general than four
//! tables need (see DESIGN.md).

pub mod extraction;
pub mod users;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Clone)]
pub struct Store {
    pub pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, anyhow::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}
