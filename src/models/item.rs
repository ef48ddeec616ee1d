use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PriceSample;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub id: String,
    pub name: String,
    pub url: String,
    pub target_price: f64,

    // None => never alerted
    pub last_alert_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One dashboard line: the item plus its most recent sample, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardRow {
    #[serde(flatten)]
    pub item: TrackedItem,
    pub latest: Option<PriceSample>,
}
