use thiserror::Error;

use crate::models::FetchStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("item {0} not found")]
    NotFound(String),

    #[error("database failed integrity check: {0}")]
    Corrupt(String),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("writer gate poisoned")]
    Poisoned,

    #[error("store task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Task(e.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("http {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("blocked or challenged: {0}")]
    Blocked(String),
}

impl FetchError {
    pub fn status(&self) -> FetchStatus {
        match self {
            FetchError::Network(_) => FetchStatus::NetworkError,
            FetchError::Http { .. } => FetchStatus::HttpError,
            FetchError::Blocked(_) => FetchStatus::Blocked,
        }
    }
}
