//! Library entrypoint for pricewatch.
//!
//! Exposes the engine (store, extractor, policy, notifier, scheduler) and
//! the HTTP layer so integration tests under `tests/` can drive them
//! directly.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod models;

pub mod services;

pub mod controllers;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub store: services::store::Store,
    pub settings: config::Settings,
    pub scheduler: services::scheduler::SchedulerHandle,
    pub notifier: Arc<dyn services::notifier::Notifier>,
    pub events_tx: tokio::sync::broadcast::Sender<String>,
}
