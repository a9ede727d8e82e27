//! Shared re-exports and small cross-cutting helpers used by every crate
//! in the workspace. Mirrors the `common::prelude` pattern: crates depend
//! on `common` instead of pinning their own copies of these dependencies.

pub mod prelude {
    pub use anyhow::{self, anyhow, Context};
    pub use async_trait::async_trait;
    pub use base64;
    pub use chrono::{self, DateTime, Duration, Utc};
    pub use futures;
    pub use itertools::{self, Itertools};
    pub use once_cell;
    pub use serde::{self, Deserialize, Serialize};
    pub use serde_json::{self, json};
    pub use tokio;
    pub use tracing::{self, debug, error, info, instrument, trace, warn};
    pub use uuid::{self, Uuid};
}

use axum::http::StatusCode;

/// Converts an `anyhow::Error` into an axum response body, logging the
/// full error chain server-side while keeping the client-facing message
/// generic. Grounded on `dal::web::ResultWithCode` from the reference
/// system this crate is adapted from.
pub trait ResultWithCode<V>: Sized {
    fn log_error<S>(self, code: StatusCode, outward_message: S) -> Result<V, (StatusCode, String)>
    where
        S: Into<String>;

    fn log_server_error<S>(self, outward_message: S) -> Result<V, (StatusCode, String)>
    where
        S: Into<String>,
    {
        self.log_error(StatusCode::INTERNAL_SERVER_ERROR, outward_message)
    }
}

impl<V> ResultWithCode<V> for Result<V, anyhow::Error> {
    fn log_error<S>(self, code: StatusCode, outward_message: S) -> Result<V, (StatusCode, String)>
    where
        S: Into<String>,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::error!(error = ?e, "request failed");
                Err((code, outward_message.into()))
            }
        }
    }
}

impl<V> ResultWithCode<V> for Option<V> {
    fn log_error<S>(self, code: StatusCode, outward_message: S) -> Result<V, (StatusCode, String)>
    where
        S: Into<String>,
    {
        match self {
            Some(v) => Ok(v),
            None => Err((code, outward_message.into())),
        }
    }
}

/// Clock seam so tests can freeze time instead of reaching for `Utc::now()`
/// deep inside watch/queue logic.
pub fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
