use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Ok,
    NoPrice,
    NetworkError,
    HttpError,
    Blocked,
}

impl FetchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchStatus::Ok => "ok",
            FetchStatus::NoPrice => "no_price",
            FetchStatus::NetworkError => "network_error",
            FetchStatus::HttpError => "http_error",
            FetchStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<FetchStatus> {
        match s {
            "ok" => Some(FetchStatus::Ok),
            "no_price" => Some(FetchStatus::NoPrice),
            "network_error" => Some(FetchStatus::NetworkError),
            "http_error" => Some(FetchStatus::HttpError),
            "blocked" => Some(FetchStatus::Blocked),
            _ => None,
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub id: i64,
    pub item_id: String,
    pub checked_at: DateTime<Utc>,

    // None => extraction failed (never stored as 0)
    pub price: Option<f64>,
    pub status: FetchStatus,
    pub raw_text: Option<String>,
}

/// A sample about to be appended. The store assigns the row id.
#[derive(Debug, Clone)]
pub struct NewSample {
    pub item_id: String,
    pub checked_at: DateTime<Utc>,
    pub price: Option<f64>,
    pub status: FetchStatus,
    pub raw_text: Option<String>,
}
