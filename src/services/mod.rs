pub mod db_init;
pub mod store;

pub mod extractor;
pub mod fetcher;
pub mod alert_policy;
pub mod notifier;
pub mod scheduler;
