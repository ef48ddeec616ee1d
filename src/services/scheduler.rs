//! The monitoring loop.
//!
//! `Idle -> Ticking -> Idle` until cancelled. A tick snapshots the item list
//! once and feeds it to at most `max_concurrent_fetches` workers; each item
//! goes fetch -> extract -> record -> evaluate -> notify -> mark alerted.
//! Per-item failures stay with that item.
//!
//! Every fetch, scheduled or on-demand, takes one of `max_concurrent_fetches`
//! slots and keeps it for `politeness_delay` after the response arrives.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::Utc;
use tokio::{
    sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore},
    task::JoinSet,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Settings,
    error::{FetchError, StoreError},
    models::{FetchStatus, NewSample, PriceSample, TrackedItem},
};

use super::{
    alert_policy::{AlertDecision, AlertPolicy, SkipReason},
    extractor::{extract_title, PriceExtractor},
    fetcher::{FetchedPage, PageFetcher},
    notifier::{format_alert, Notifier, NotifyOutcome},
    store::Store,
};

const FETCH_NOW_QUEUE: usize = 64;

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub poll_interval: Duration,
    pub alert_cooldown: Duration,
    pub fetch_timeout: Duration,
    pub max_concurrent_fetches: usize,
    pub politeness_delay: Duration,
    pub currency_symbol: String,
}

impl SchedulerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval,
            alert_cooldown: settings.alert_cooldown,
            fetch_timeout: settings.request_timeout,
            max_concurrent_fetches: settings.max_concurrent_fetches,
            politeness_delay: settings.politeness_delay,
            currency_symbol: settings.currency_symbol.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    NotEligible(SkipReason),
    Sent,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ItemReport {
    pub sample: PriceSample,
    pub alert: AlertOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub checked: usize,
    pub priced: usize,
    pub missed: usize,
    pub errors: usize,
    pub alerts_sent: usize,
}

impl TickSummary {
    fn merge(&mut self, other: TickSummary) {
        self.checked += other.checked;
        self.priced += other.priced;
        self.missed += other.missed;
        self.errors += other.errors;
        self.alerts_sent += other.alerts_sent;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchNowStatus {
    Queued,
    NotFound,
    Stopped,
}

type Gate = Arc<tokio::sync::Mutex<()>>;

/// One async lock per item id. A gate is held from re-reading the item until
/// `last_alert_at` is written, so a scheduled and an on-demand check of the
/// same item cannot both alert inside one cooldown. Other items never wait.
#[derive(Clone, Default)]
struct AlertGates {
    gates: Arc<Mutex<HashMap<String, Gate>>>,
}

impl AlertGates {
    fn get(&self, item_id: &str) -> Gate {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(item_id.to_string()).or_default())
    }

    /// Drops the map entry once no other check holds or waits on it.
    fn release(&self, item_id: &str, gate: Gate) {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        // map + ours; clones are only made under this lock
        if Arc::strong_count(&gate) == 2 {
            gates.remove(item_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.gates.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Everything one item's trip through the pipeline needs. Cheap to clone.
#[derive(Clone)]
struct Pipeline {
    store: Store,
    fetcher: Arc<dyn PageFetcher>,
    notifier: Arc<dyn Notifier>,
    extractor: PriceExtractor,
    policy: AlertPolicy,
    fetch_timeout: Duration,
    fetch_slots: Arc<Semaphore>,
    politeness_delay: Duration,
    currency_symbol: Arc<str>,
    events_tx: broadcast::Sender<String>,
    alert_gates: AlertGates,
}

impl Pipeline {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let permit = Arc::clone(&self.fetch_slots)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Network("fetch slots closed".to_string()))?;

        let res = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(url)).await {
            Ok(res) => res,
            Err(_) => Err(FetchError::Network(format!(
                "timed out after {}s",
                self.fetch_timeout.as_secs_f32()
            ))),
        };

        hold_for(permit, self.politeness_delay);
        res
    }

    async fn process_item(&self, item: &TrackedItem) -> Result<ItemReport, StoreError> {
        let checked_at = Utc::now();
        let fetched = self.fetch(&item.url).await;

        let (price, status, raw_text, title) = match fetched {
            Ok(page) => {
                // name still defaulted to the url
                let title = (item.name == item.url)
                    .then(|| extract_title(&page.content))
                    .flatten();

                match self.extractor.extract_match(&item.url, &page.content) {
                    Some(m) => (Some(m.value), FetchStatus::Ok, Some(m.raw), title),
                    None => {
                        tracing::info!(item_id = %item.id, url = %item.url, "no price found on page");
                        (None, FetchStatus::NoPrice, None, title)
                    }
                }
            }
            Err(e) => {
                tracing::warn!(item_id = %item.id, url = %item.url, "fetch failed: {e}");
                (None, e.status(), Some(e.to_string()), None)
            }
        };

        let sample = self
            .store
            .record_sample(NewSample {
                item_id: item.id.clone(),
                checked_at,
                price,
                status,
                raw_text,
            })
            .await?;
        let _ = self.events_tx.send("pricesUpdated".to_string());

        if let Some(title) = title {
            match self.store.fill_default_name(&item.id, &title).await {
                Ok(true) => {
                    tracing::info!(item_id = %item.id, name = %title, "item named from page title");
                    let _ = self.events_tx.send("itemsUpdated".to_string());
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(item_id = %item.id, "could not store page title: {e}"),
            }
        }

        let alert = self.maybe_alert(&item.id, sample.price).await?;

        Ok(ItemReport { sample, alert })
    }

    async fn maybe_alert(&self, item_id: &str, price: Option<f64>) -> Result<AlertOutcome, StoreError> {
        // most checks end here without touching the gate
        let item = self.load_item(item_id).await?;
        if let AlertDecision::Skip(reason) = self.policy.evaluate(&item, price, Utc::now()) {
            return Ok(AlertOutcome::NotEligible(reason));
        }

        let gate = self.alert_gates.get(item_id);
        let outcome = {
            let _held = gate.lock().await;
            self.alert_gated(item_id, price).await
        };
        self.alert_gates.release(item_id, gate);
        outcome
    }

    async fn load_item(&self, item_id: &str) -> Result<TrackedItem, StoreError> {
        self.store
            .get_item(item_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))
    }

    async fn alert_gated(&self, item_id: &str, price: Option<f64>) -> Result<AlertOutcome, StoreError> {
        // another check of this item may have alerted while we waited
        let item = self.load_item(item_id).await?;

        let price = match (self.policy.evaluate(&item, price, Utc::now()), price) {
            (AlertDecision::Fire, Some(p)) => p,
            (AlertDecision::Skip(reason), _) => return Ok(AlertOutcome::NotEligible(reason)),
            (AlertDecision::Fire, None) => return Ok(AlertOutcome::NotEligible(SkipReason::NoPrice)),
        };

        let text = format_alert(&item, price, &self.currency_symbol);
        match self.notifier.send(&text).await {
            NotifyOutcome::Sent(detail) => {
                self.store.set_last_alert_at(&item.id, Utc::now()).await?;
                tracing::info!(item_id = %item.id, price, target = item.target_price, "alert sent: {detail}");
                let _ = self.events_tx.send("alertFired".to_string());
                Ok(AlertOutcome::Sent)
            }
            NotifyOutcome::Skipped(reason) => {
                tracing::info!(item_id = %item.id, price, "alert due but notifier not configured: {reason}");
                Ok(AlertOutcome::Skipped(reason))
            }
            NotifyOutcome::Failed(detail) => {
                tracing::warn!(item_id = %item.id, price, "alert send failed: {detail}");
                Ok(AlertOutcome::Failed(detail))
            }
        }
    }
}

#[derive(Clone)]
pub struct SchedulerHandle {
    store: Store,
    fetch_now_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    /// Queue an out-of-band check for one item.
    pub async fn trigger_fetch_now(&self, item_id: &str) -> Result<FetchNowStatus, StoreError> {
        if self.store.get_item(item_id).await?.is_none() {
            return Ok(FetchNowStatus::NotFound);
        }
        if self.cancel.is_cancelled() {
            return Ok(FetchNowStatus::Stopped);
        }

        match self.fetch_now_tx.send(item_id.to_string()).await {
            Ok(()) => Ok(FetchNowStatus::Queued),
            Err(_) => Ok(FetchNowStatus::Stopped),
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

pub struct Scheduler {
    pipeline: Pipeline,
    options: SchedulerOptions,
    cancel: CancellationToken,
    fetch_now_tx: mpsc::Sender<String>,
    fetch_now_rx: mpsc::Receiver<String>,
}

impl Scheduler {
    pub fn new(
        store: Store,
        fetcher: Arc<dyn PageFetcher>,
        notifier: Arc<dyn Notifier>,
        options: SchedulerOptions,
        events_tx: broadcast::Sender<String>,
    ) -> Self {
        let (fetch_now_tx, fetch_now_rx) = mpsc::channel(FETCH_NOW_QUEUE);
        let options = SchedulerOptions {
            max_concurrent_fetches: options.max_concurrent_fetches.max(1),
            ..options
        };

        let pipeline = Pipeline {
            store,
            fetcher,
            notifier,
            extractor: PriceExtractor::default(),
            policy: AlertPolicy::new(options.alert_cooldown),
            fetch_timeout: options.fetch_timeout,
            fetch_slots: Arc::new(Semaphore::new(options.max_concurrent_fetches)),
            politeness_delay: options.politeness_delay,
            currency_symbol: Arc::from(options.currency_symbol.as_str()),
            events_tx,
            alert_gates: AlertGates::default(),
        };

        Self {
            pipeline,
            options,
            cancel: CancellationToken::new(),
            fetch_now_tx,
            fetch_now_rx,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            store: self.pipeline.store.clone(),
            fetch_now_tx: self.fetch_now_tx.clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub async fn process_item(&self, item: &TrackedItem) -> Result<ItemReport, StoreError> {
        self.pipeline.process_item(item).await
    }

    /// One pass over every tracked item.
    pub async fn tick(&self) -> TickSummary {
        run_tick(&self.pipeline, &self.options, &self.cancel).await
    }

    /// Runs until the cancellation token fires. Checks already in flight
    /// are allowed to finish so their writes land.
    pub async fn run(self) {
        let Scheduler {
            pipeline,
            options,
            cancel,
            fetch_now_tx: _keep_open,
            mut fetch_now_rx,
        } = self;

        tracing::info!(
            interval_secs = options.poll_interval.as_secs(),
            workers = options.max_concurrent_fetches,
            "scheduler started"
        );

        let mut on_demand: JoinSet<()> = JoinSet::new();

        'ticks: loop {
            if cancel.is_cancelled() {
                break;
            }

            let started = Instant::now();
            {
                let tick = run_tick(&pipeline, &options, &cancel);
                tokio::pin!(tick);

                loop {
                    tokio::select! {
                        summary = &mut tick => {
                            tracing::info!(
                                checked = summary.checked,
                                priced = summary.priced,
                                missed = summary.missed,
                                errors = summary.errors,
                                alerts = summary.alerts_sent,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "tick finished"
                            );
                            break;
                        }
                        Some(id) = fetch_now_rx.recv() => spawn_fetch_now(&pipeline, &mut on_demand, id),
                    }
                }
            }

            while let Some(res) = on_demand.try_join_next() {
                log_on_demand_join(res);
            }

            let idle = tokio::time::sleep(options.poll_interval.saturating_sub(started.elapsed()));
            tokio::pin!(idle);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break 'ticks,
                    _ = &mut idle => break,
                    Some(id) = fetch_now_rx.recv() => spawn_fetch_now(&pipeline, &mut on_demand, id),
                }
            }
        }

        while let Some(res) = on_demand.join_next().await {
            log_on_demand_join(res);
        }
        tracing::info!("scheduler stopped");
    }
}

async fn run_tick(pipeline: &Pipeline, options: &SchedulerOptions, cancel: &CancellationToken) -> TickSummary {
    let items = match pipeline.store.list_items().await {
        Ok(items) => items,
        Err(e) => {
            tracing::error!("tick skipped, could not list items: {e}");
            return TickSummary {
                errors: 1,
                ..TickSummary::default()
            };
        }
    };

    if items.is_empty() {
        tracing::debug!("no items tracked");
        return TickSummary::default();
    }

    let workers = options.max_concurrent_fetches.min(items.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let mut set = JoinSet::new();

    for _ in 0..workers {
        set.spawn(worker(pipeline.clone(), Arc::clone(&queue), cancel.clone()));
    }

    let mut total = TickSummary::default();
    while let Some(res) = set.join_next().await {
        match res {
            Ok(part) => total.merge(part),
            Err(e) => tracing::error!("scheduler worker died: {e}"),
        }
    }
    total
}

async fn worker(
    pipeline: Pipeline,
    queue: Arc<Mutex<VecDeque<TrackedItem>>>,
    cancel: CancellationToken,
) -> TickSummary {
    let mut summary = TickSummary::default();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        let Some(item) = next else {
            break;
        };
        summary.checked += 1;

        // own task so a panic in one item's pipeline stays with that item
        let p = pipeline.clone();
        let item_id = item.id.clone();
        let res = tokio::spawn(async move { p.process_item(&item).await }).await;

        match res {
            Ok(Ok(report)) => {
                if report.sample.price.is_some() {
                    summary.priced += 1;
                } else {
                    summary.missed += 1;
                }
                if report.alert == AlertOutcome::Sent {
                    summary.alerts_sent += 1;
                }
            }
            Ok(Err(e)) => {
                summary.errors += 1;
                tracing::warn!(item_id = %item_id, "item check failed: {e}");
            }
            Err(e) => {
                summary.errors += 1;
                tracing::error!(item_id = %item_id, "item check panicked: {e}");
            }
        }
    }

    summary
}

/// Keep a fetch slot busy for `delay` after its fetch returned.
fn hold_for(permit: OwnedSemaphorePermit, delay: Duration) {
    if delay.is_zero() {
        return;
    }
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        drop(permit);
    });
}

fn spawn_fetch_now(pipeline: &Pipeline, on_demand: &mut JoinSet<()>, item_id: String) {
    let p = pipeline.clone();
    on_demand.spawn(async move {
        match p.store.get_item(&item_id).await {
            Ok(Some(item)) => match p.process_item(&item).await {
                Ok(report) => tracing::info!(
                    item_id = %item_id,
                    price = ?report.sample.price,
                    status = %report.sample.status,
                    "on-demand check done"
                ),
                Err(e) => tracing::warn!(item_id = %item_id, "on-demand check failed: {e}"),
            },
            Ok(None) => tracing::debug!(item_id = %item_id, "on-demand check for a deleted item"),
            Err(e) => tracing::warn!(item_id = %item_id, "on-demand check could not load item: {e}"),
        }
    });
}

fn log_on_demand_join(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        tracing::error!("on-demand check panicked: {e}");
    }
}
