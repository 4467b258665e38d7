//! Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use shelf_harvester::harvest::{
    DelayRange, Extractor, FailureKind, FetchFailure, FetchOutcome, HarvestContext,
    HarvestSettings, PageFetcher, ProxyEndpoint, ProxyProbe, Record,
};
use shelf_harvester::monitoring::{AlertSink, MetricsSink};
use shelf_harvester::storage::{
    CategoryCount, RecordStore, SqliteStorage, StorageError, StorageResult, StoredRecord,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ORIGIN: &str = "https://shop.test";

/// Builds a results page with one container per (asin, name) pair
pub fn results_page(items: &[(&str, &str)]) -> String {
    let mut html = String::from("<html><body><div class=\"s-main-slot\">");
    for (asin, name) in items {
        html.push_str(&format!(
            r#"<div data-component-type="s-search-result">
                <h2><a href="/dp/{asin}"><span>{name}</span></a></h2>
                <span class="a-price"><span class="a-offscreen">₹1,499</span></span>
                <span class="a-icon-alt">4.2 out of 5 stars</span>
                <span aria-label="2,310 ratings">2,310</span>
            </div>"#
        ));
    }
    html.push_str("</div></body></html>");
    html
}

pub fn success(markup: String) -> FetchOutcome {
    FetchOutcome::Success(markup)
}

pub fn timeout() -> FetchOutcome {
    FetchOutcome::Failure(FetchFailure::new(FailureKind::Timeout, "timed out"))
}

/// A call made to a fake fetcher
#[derive(Debug, Clone, PartialEq)]
pub struct FetchCall {
    pub url: String,
    pub proxy: Option<String>,
}

/// Fetcher replaying a fixed script of outcomes, one per call
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<FetchOutcome>>,
    calls: Mutex<Vec<FetchCall>>,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<FetchOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.url).collect()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&ProxyEndpoint>,
        _timeout: Duration,
    ) -> FetchOutcome {
        self.calls.lock().unwrap().push(FetchCall {
            url: url.to_string(),
            proxy: proxy.map(|p| p.address.clone()),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                FetchOutcome::Failure(FetchFailure::new(FailureKind::Navigation, "script exhausted"))
            })
    }
}

/// Metrics sink keeping every event as a string
#[derive(Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<String>>,
}

impl RecordingMetrics {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl MetricsSink for RecordingMetrics {
    fn record_request(&self, status: &str, category: &str) {
        self.push(format!("request:{}:{}", status, category));
    }

    fn record_products(&self, count: usize, category: &str) {
        self.push(format!("products:{}:{}", category, count));
    }

    fn record_error(&self, error_type: &str) {
        self.push(format!("error:{}", error_type));
    }

    fn record_database_operation(&self, operation: &str) {
        self.push(format!("db:{}", operation));
    }

    fn set_active_proxies(&self, count: usize) {
        self.push(format!("proxies:{}", count));
    }

    fn observe_duration(&self, category: &str, _duration: Duration) {
        self.push(format!("duration:{}", category));
    }
}

/// Alert sink collecting subjects and messages
#[derive(Default)]
pub struct RecordingAlerts {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingAlerts {
    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn notify(&self, subject: &str, message: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), message.to_string()));
    }
}

/// Probe answering from a fixed set of live addresses
pub struct FixedProbe {
    alive: HashSet<String>,
}

impl FixedProbe {
    pub fn new(alive: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            alive: alive.iter().map(|s| s.to_string()).collect(),
        })
    }
}

#[async_trait]
impl ProxyProbe for FixedProbe {
    async fn probe(&self, address: &str, _timeout: Duration) -> bool {
        self.alive.contains(address)
    }
}

/// Store whose writes always fail
pub struct BrokenStore;

impl RecordStore for BrokenStore {
    fn save_records(&self, _records: &[Record], _category: &str) -> StorageResult<usize> {
        Err(StorageError::Database("disk full".to_string()))
    }

    fn recent_records(&self, _limit: usize) -> StorageResult<Vec<StoredRecord>> {
        Err(StorageError::Database("disk full".to_string()))
    }

    fn count_records(&self) -> StorageResult<u64> {
        Err(StorageError::Database("disk full".to_string()))
    }

    fn count_observed_since(&self, _since: chrono::DateTime<chrono::Utc>) -> StorageResult<u64> {
        Err(StorageError::Database("disk full".to_string()))
    }

    fn category_counts(&self) -> StorageResult<Vec<CategoryCount>> {
        Err(StorageError::Database("disk full".to_string()))
    }
}

pub fn fast_settings(proxies: &[&str]) -> HarvestSettings {
    HarvestSettings {
        max_retries: 3,
        backoff_base: Duration::from_millis(1),
        page_delay: DelayRange::from_millis(0, 2),
        fetch_timeout: Duration::from_secs(1),
        proxy_endpoints: proxies.iter().map(|s| s.to_string()).collect(),
        probe_timeout: Duration::from_millis(50),
    }
}

/// Test fixture bundling a context with handles to its fakes
pub struct Harness {
    pub ctx: HarvestContext,
    pub storage: Arc<SqliteStorage>,
    pub metrics: Arc<RecordingMetrics>,
    pub alerts: Arc<RecordingAlerts>,
}

pub fn harness(fetcher: Arc<dyn PageFetcher>, settings: HarvestSettings) -> Harness {
    harness_with_probe(fetcher, settings, FixedProbe::new(&[]))
}

pub fn harness_with_probe(
    fetcher: Arc<dyn PageFetcher>,
    settings: HarvestSettings,
    probe: Arc<dyn ProxyProbe>,
) -> Harness {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let metrics = Arc::new(RecordingMetrics::default());
    let alerts = Arc::new(RecordingAlerts::default());

    let ctx = HarvestContext {
        fetcher,
        extractor: Arc::new(Extractor::for_site(ORIGIN).unwrap()),
        storage: storage.clone(),
        metrics: metrics.clone(),
        alerts: alerts.clone(),
        probe,
        settings: Arc::new(settings),
    };

    Harness {
        ctx,
        storage,
        metrics,
        alerts,
    }
}
