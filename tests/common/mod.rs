#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use pricewatch::{
    error::FetchError,
    services::{
        fetcher::{FetchedPage, PageFetcher},
        notifier::{Notifier, NotifyOutcome},
        scheduler::SchedulerOptions,
        store::Store,
    },
};
use tempfile::TempDir;

pub fn temp_store() -> (Store, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(dir.path().join("prices.db")).expect("open store");
    (store, dir)
}

pub fn options(cooldown: Duration) -> SchedulerOptions {
    SchedulerOptions {
        poll_interval: Duration::from_secs(3600),
        alert_cooldown: cooldown,
        fetch_timeout: Duration::from_millis(300),
        max_concurrent_fetches: 5,
        politeness_delay: Duration::ZERO,
        currency_symbol: "₹".to_string(),
    }
}

pub fn page(html: &str) -> Step {
    Step::Page(html.to_string())
}

#[derive(Clone)]
pub enum Step {
    Page(String),
    Fail(FetchError),
    Hang(Duration),
}

/// Replays scripted responses in order, whatever the URL.
#[derive(Default)]
pub struct ScriptedFetcher {
    steps: Mutex<VecDeque<Step>>,
    pub calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Page(content)) => Ok(FetchedPage {
                content,
                http_status: 200,
            }),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Hang(d)) => {
                tokio::time::sleep(d).await;
                Ok(FetchedPage {
                    content: "₹ 1".to_string(),
                    http_status: 200,
                })
            }
            None => Err(FetchError::Network("script exhausted".to_string())),
        }
    }
}

/// Always serves the same page; tracks how many fetches overlap and when
/// each one started.
pub struct SlowFetcher {
    pub html: String,
    pub delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub starts: Mutex<Vec<Instant>>,
}

impl SlowFetcher {
    pub fn new(html: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            html: html.to_string(),
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            starts: Mutex::new(Vec::new()),
        })
    }

    pub fn fetches(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    /// Time between consecutive fetch starts.
    pub fn gaps(&self) -> Vec<Duration> {
        let starts = self.starts.lock().unwrap();
        starts.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl PageFetcher for SlowFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedPage, FetchError> {
        self.starts.lock().unwrap().push(Instant::now());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(FetchedPage {
            content: self.html.clone(),
            http_status: 200,
        })
    }
}

/// Records every message; answers with a configurable outcome.
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
    outcome: Mutex<NotifyOutcome>,
    delay: Duration,
}

impl RecordingNotifier {
    pub fn sending() -> Arc<Self> {
        Self::with(NotifyOutcome::Sent("ok".to_string()), Duration::ZERO)
    }

    pub fn with(outcome: NotifyOutcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
            outcome: Mutex::new(outcome),
            delay,
        })
    }

    pub fn set_outcome(&self, outcome: NotifyOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> NotifyOutcome {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.messages.lock().unwrap().push(text.to_string());
        self.outcome.lock().unwrap().clone()
    }
}
