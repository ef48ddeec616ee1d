//! Alert deduplication.
//!
//! Per item there are two logical states, `Quiet` and `Cooldown`, derived
//! from `last_alert_at` and the clock; nothing but `last_alert_at` is
//! persisted. Evaluating never mutates anything, the caller advances
//! `last_alert_at` once a send is confirmed.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::TrackedItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Quiet,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoPrice,
    NoTarget,
    AboveTarget,
    CoolingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    Fire,
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy)]
pub struct AlertPolicy {
    cooldown: Duration,
}

impl AlertPolicy {
    pub fn new(cooldown: std::time::Duration) -> Self {
        let cooldown = Duration::from_std(cooldown).unwrap_or_else(|_| Duration::days(36_500));
        Self { cooldown }
    }

    pub fn state(&self, item: &TrackedItem, now: DateTime<Utc>) -> AlertState {
        match item.last_alert_at {
            Some(last) if now - last <= self.cooldown => AlertState::Cooldown,
            _ => AlertState::Quiet,
        }
    }

    pub fn evaluate(&self, item: &TrackedItem, price: Option<f64>, now: DateTime<Utc>) -> AlertDecision {
        let price = match price {
            Some(p) if p.is_finite() && p > 0.0 => p,
            _ => return AlertDecision::Skip(SkipReason::NoPrice),
        };

        if !(item.target_price.is_finite() && item.target_price > 0.0) {
            return AlertDecision::Skip(SkipReason::NoTarget);
        }

        if price > item.target_price {
            return AlertDecision::Skip(SkipReason::AboveTarget);
        }

        match self.state(item, now) {
            AlertState::Quiet => AlertDecision::Fire,
            AlertState::Cooldown => AlertDecision::Skip(SkipReason::CoolingDown),
        }
    }
}
