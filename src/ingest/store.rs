use async_trait::async_trait;
use thiserror::Error;

use super::event::SensorRecord;

/// A failure inside one store adapter. Never escapes the ingestion core.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Connection(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("http error: {0}")]
    Http(reqwest::Error),

    #[error("write rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connection(e.to_string())
        } else {
            Self::Http(e)
        }
    }
}

/// Commits one reading as a row of the relational measurement log.
///
/// Implementations perform the insert in a single unit of work and release
/// any connection they acquired before returning, on every path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn commit_reading(&self, record: &SensorRecord) -> Result<(), AdapterError>;
}

/// Commits one reading as a tagged point in the time-series store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn commit_point(&self, record: &SensorRecord) -> Result<(), AdapterError>;
}
