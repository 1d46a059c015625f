use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::store::AdapterError;

/// The two stores every reading is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Relational,
    TimeSeries,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Relational, Backend::TimeSeries];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::TimeSeries => "time_series",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one commit attempt against one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    Success,
    Failure { reason: String },
}

impl WriteOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }
}

impl From<Result<(), AdapterError>> for WriteOutcome {
    fn from(result: Result<(), AdapterError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// Per-store verdict of one ingestion. No combined verdict is derived from
/// the pair; a mixed result is an ordinary outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DualWriteResult {
    pub relational: WriteOutcome,
    pub time_series: WriteOutcome,
}

#[cfg(test)]
impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[cfg(test)]
impl DualWriteResult {
    pub fn outcome(&self, backend: Backend) -> &WriteOutcome {
        match backend {
            Backend::Relational => &self.relational,
            Backend::TimeSeries => &self.time_series,
        }
    }
}
