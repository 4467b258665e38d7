//! Harvest session
//!
//! A session walks the pages of one job strictly in order. Each page is
//! fetched with a bounded number of attempts, exponential backoff between
//! attempts and, when the job asks for it, proxy failover. Records from a
//! successful page are written to storage before the next page is requested,
//! so a failure later in the session never loses earlier pages.

use crate::config::Config;
use crate::harvest::extractor::Extractor;
use crate::harvest::fetcher::{FailureKind, FetchFailure, FetchOutcome, PageFetcher};
use crate::harvest::proxy::{ProxyEndpoint, ProxyPool, ProxyProbe};
use crate::harvest::record::Record;
use crate::harvest::state::SessionState;
use crate::monitoring::{AlertSink, MetricsSink};
use crate::queue::{HarvestResult, HarvestStatus, Job};
use crate::storage::RecordStore;
use crate::HarvestError;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Inclusive range a randomized delay is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    /// Draws a uniformly distributed delay from the range
    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if min == max {
            return self.min;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// Tunables for a harvest session
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    /// Fetch attempts per page, including the first
    pub max_retries: u32,
    /// Wait after the first failed attempt; doubles after each further failure
    pub backoff_base: Duration,
    /// Pause before every page after the first
    pub page_delay: DelayRange,
    pub fetch_timeout: Duration,
    pub proxy_endpoints: Vec<String>,
    pub probe_timeout: Duration,
}

impl HarvestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.harvest.max_retries,
            backoff_base: config.harvest.backoff_base(),
            page_delay: DelayRange::from_millis(
                config.harvest.page_delay_min_ms,
                config.harvest.page_delay_max_ms,
            ),
            fetch_timeout: config.browser.fetch_timeout(),
            proxy_endpoints: config.proxy.endpoints.clone(),
            probe_timeout: Duration::from_millis(config.proxy.probe_timeout_ms),
        }
    }
}

/// Collaborators shared by every session in the process
#[derive(Clone)]
pub struct HarvestContext {
    pub fetcher: Arc<dyn PageFetcher>,
    pub extractor: Arc<Extractor>,
    pub storage: Arc<dyn RecordStore>,
    pub metrics: Arc<dyn MetricsSink>,
    pub alerts: Arc<dyn AlertSink>,
    pub probe: Arc<dyn ProxyProbe>,
    pub settings: Arc<HarvestSettings>,
}

/// Builds the URL of page `n` of a paginated listing
///
/// Page 1 is the target URL verbatim. Later pages append a `page` query
/// parameter, joined with `&` if the target already has a query string.
///
/// # Example
///
/// ```
/// use shelf_harvester::harvest::page_url;
///
/// assert_eq!(page_url("https://shop.test/s?k=tea", 2), "https://shop.test/s?k=tea&page=2");
/// assert_eq!(page_url("https://shop.test/tea", 3), "https://shop.test/tea?page=3");
/// ```
pub fn page_url(target: &str, page: u32) -> String {
    if page <= 1 {
        return target.to_string();
    }
    let separator = if target.contains('?') { '&' } else { '?' };
    format!("{}{}page={}", target, separator, page)
}

/// One fetch attempt, logged and then discarded
#[derive(Debug)]
pub struct FetchAttempt<'a> {
    pub url: &'a str,
    pub proxy: Option<&'a str>,
    pub attempt_number: u32,
    pub outcome: &'a FetchOutcome,
    pub duration: Duration,
}

impl FetchAttempt<'_> {
    fn log(&self) {
        let via = self.proxy.unwrap_or("direct");
        match self.outcome {
            FetchOutcome::Success(markup) => tracing::debug!(
                "Attempt {} for {} via {} succeeded in {:?} ({} bytes)",
                self.attempt_number,
                self.url,
                via,
                self.duration,
                markup.len()
            ),
            FetchOutcome::Failure(failure) => tracing::warn!(
                "Attempt {} for {} via {} failed after {:?}: {} ({})",
                self.attempt_number,
                self.url,
                via,
                self.duration,
                failure.message,
                failure.kind
            ),
        }
    }
}

/// What happened to one page
#[derive(Debug, Clone, PartialEq)]
pub enum PageResult {
    /// The page was fetched; `stored` is false if the storage write failed
    Extracted { records: usize, stored: bool },

    /// Every attempt failed; the last failure is kept
    Exhausted(FetchFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    pub page: u32,
    pub url: String,
    pub attempts: u32,
    pub result: PageResult,
}

/// Summary of a finished (or aborted) session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub job: Job,
    pub records: Vec<Record>,
    pub pages: Vec<PageOutcome>,
    pub final_state: SessionState,
    pub elapsed: Duration,
}

impl SessionReport {
    pub fn records_found(&self) -> usize {
        self.records.len()
    }

    /// `Completed` if any page produced a record, `Failed` otherwise
    pub fn status(&self) -> HarvestStatus {
        HarvestStatus::from_record_count(self.records.len())
    }

    pub fn is_aborted(&self) -> bool {
        self.final_state == SessionState::Aborted
    }

    /// Pages whose retries were exhausted
    pub fn failed_pages(&self) -> Vec<u32> {
        self.pages
            .iter()
            .filter(|p| matches!(p.result, PageResult::Exhausted(_)))
            .map(|p| p.page)
            .collect()
    }

    pub fn to_result(&self) -> HarvestResult {
        HarvestResult {
            job: self.job.clone(),
            records_found: self.records.len(),
            status: self.status(),
            finished_at: Utc::now(),
        }
    }
}

/// Runs jobs against the shared collaborators
pub struct HarvestSession {
    ctx: HarvestContext,
    shutdown: CancellationToken,
}

impl HarvestSession {
    pub fn new(ctx: HarvestContext, shutdown: CancellationToken) -> Self {
        Self { ctx, shutdown }
    }

    pub fn context(&self) -> &HarvestContext {
        &self.ctx
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Harvests every page of a job
    ///
    /// Pages whose retries run out are recorded and skipped. When shutdown
    /// is requested the session stops at its next pause, after any fetch in
    /// flight has finished, and reports what it found so far.
    ///
    /// # Returns
    ///
    /// * `Ok(SessionReport)` - The session ran to `Done` or `Aborted`
    /// * `Err(HarvestError)` - The job is invalid or the session state
    ///   machine was driven out of order
    pub async fn run(&self, job: &Job) -> crate::Result<SessionReport> {
        job.validate()?;

        let mut run = SessionRun::new(self, job);
        let started = Instant::now();

        tracing::info!(
            "Starting harvest of '{}' ({} page(s), proxy: {})",
            job.category,
            job.page_limit,
            job.use_proxy
        );
        self.ctx.metrics.record_request("started", &job.category);

        run.execute().await?;

        let elapsed = started.elapsed();
        let report = run.into_report(elapsed);

        self.ctx
            .metrics
            .observe_duration(&job.category, report.elapsed);
        self.ctx
            .metrics
            .record_request(&report.status().to_string(), &job.category);

        tracing::info!(
            "Harvest of '{}' {} in {:.1}s: {} record(s), {} failed page(s)",
            job.category,
            report.final_state,
            elapsed.as_secs_f64(),
            report.records_found(),
            report.failed_pages().len()
        );

        Ok(report)
    }
}

/// How the retry loop for one page ended
enum PageFetch {
    Markup(String),
    Exhausted(FetchFailure),
    /// Shutdown arrived during a backoff pause
    Interrupted,
}

/// Mutable state of one job's run
struct SessionRun<'a> {
    session: &'a HarvestSession,
    job: &'a Job,
    state: SessionState,
    proxies: Option<ProxyPool>,
    current_proxy: Option<ProxyEndpoint>,
    records: Vec<Record>,
    pages: Vec<PageOutcome>,
}

impl<'a> SessionRun<'a> {
    fn new(session: &'a HarvestSession, job: &'a Job) -> Self {
        let ctx = &session.ctx;
        let proxies = job.use_proxy.then(|| {
            ProxyPool::new(
                ctx.settings.proxy_endpoints.iter().cloned(),
                ctx.probe.clone(),
                ctx.settings.probe_timeout,
            )
        });

        Self {
            session,
            job,
            state: SessionState::Idle,
            proxies,
            current_proxy: None,
            records: Vec::new(),
            pages: Vec::new(),
        }
    }

    fn ctx(&self) -> &HarvestContext {
        &self.session.ctx
    }

    fn advance(&mut self, next: SessionState) -> crate::Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!("Session '{}': {} -> {}", self.job.category, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Sleeps unless shutdown is requested first; returns false on shutdown
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.session.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn execute(&mut self) -> crate::Result<()> {
        if self.proxies.is_some() {
            self.rotate_proxy().await;
            if let Some(proxy) = &self.current_proxy {
                tracing::info!("Using proxy {}", proxy.address);
            }
        }

        for page in 1..=self.job.page_limit {
            if self.session.shutdown.is_cancelled() {
                return self.advance(SessionState::Aborted);
            }

            if page > 1 {
                let delay = self.ctx().settings.page_delay.sample();
                tracing::debug!("Waiting {:?} before page {}", delay, page);
                if !self.pause(delay).await {
                    return self.advance(SessionState::Aborted);
                }
            }

            self.advance(SessionState::FetchingPage(page))?;
            let url = page_url(&self.job.target_url, page);
            tracing::info!("Fetching page {} of '{}': {}", page, self.job.category, url);

            let (fetched, attempts) = self.fetch_with_retries(&url).await;
            let result = match fetched {
                PageFetch::Markup(markup) => {
                    self.advance(SessionState::Extracting(page))?;
                    self.extract_and_store(page, &markup)
                }
                PageFetch::Exhausted(failure) => {
                    tracing::warn!(
                        "Giving up on page {} of '{}' after {} attempt(s): {}",
                        page,
                        self.job.category,
                        attempts,
                        failure.message
                    );
                    self.ctx().metrics.record_error("page_exhausted");
                    PageResult::Exhausted(failure)
                }
                PageFetch::Interrupted => {
                    tracing::info!(
                        "Shutdown during retries of page {} of '{}' after {} attempt(s)",
                        page,
                        self.job.category,
                        attempts
                    );
                    return self.advance(SessionState::Aborted);
                }
            };

            self.pages.push(PageOutcome {
                page,
                url,
                attempts,
                result,
            });
        }

        self.advance(SessionState::Done)
    }

    /// Attempts one page until it succeeds or the retry budget is spent
    ///
    /// Returns how the page ended, with the number of attempts made.
    async fn fetch_with_retries(&mut self, url: &str) -> (PageFetch, u32) {
        let max_retries = self.ctx().settings.max_retries.max(1);
        let timeout = self.ctx().settings.fetch_timeout;
        let mut backoff = self.ctx().settings.backoff_base;
        let mut last_failure = FetchFailure::new(FailureKind::Navigation, "no attempt made");

        for attempt in 1..=max_retries {
            let fetcher = self.ctx().fetcher.clone();
            let started = Instant::now();
            let outcome = fetcher.fetch(url, self.current_proxy.as_ref(), timeout).await;

            FetchAttempt {
                url,
                proxy: self.current_proxy.as_ref().map(|p| p.address.as_str()),
                attempt_number: attempt,
                outcome: &outcome,
                duration: started.elapsed(),
            }
            .log();

            let failure = match outcome {
                FetchOutcome::Success(markup) => {
                    self.ctx()
                        .metrics
                        .record_request("success", &self.job.category);
                    return (PageFetch::Markup(markup), attempt);
                }
                FetchOutcome::Failure(failure) => failure,
            };

            self.ctx()
                .metrics
                .record_request("failed", &self.job.category);
            self.ctx().metrics.record_error(failure.kind.as_str());
            last_failure = failure;

            if attempt == max_retries {
                return (PageFetch::Exhausted(last_failure), attempt);
            }

            if self.proxies.is_some() {
                if let Some(pool) = self.proxies.as_mut() {
                    if let Some(failed) = self.current_proxy.take() {
                        tracing::debug!("Marking proxy {} dead", failed.address);
                        pool.mark_dead(&failed);
                    }
                }
                self.rotate_proxy().await;
            }

            tracing::debug!("Backing off {:?} before attempt {}", backoff, attempt + 1);
            if !self.pause(backoff).await {
                return (PageFetch::Interrupted, attempt);
            }
            backoff = backoff.saturating_mul(2);
        }

        (PageFetch::Exhausted(last_failure), max_retries)
    }

    /// Picks the next live proxy; leaves the session unproxied if none remain
    async fn rotate_proxy(&mut self) {
        let Some(pool) = self.proxies.as_mut() else {
            return;
        };

        self.current_proxy = pool.select().await;
        let live = pool.live_count();
        self.session.ctx.metrics.set_active_proxies(live);

        if self.current_proxy.is_none() {
            let err = HarvestError::ProxyUnavailable;
            tracing::warn!("{}; continuing without proxy", err);
            self.session.ctx.metrics.record_error(err.kind());
        }
    }

    /// Extracts a page's records and hands them to storage right away
    fn extract_and_store(&mut self, page: u32, markup: &str) -> PageResult {
        let session = self.session;
        let ctx = &session.ctx;
        let category = self.job.category.as_str();

        let listings = ctx.extractor.extract(markup);
        if listings.is_empty() {
            tracing::info!(
                "{} ({} item container(s) on page)",
                HarvestError::ExtractionEmpty { page },
                ctx.extractor.count_containers(markup)
            );
            return PageResult::Extracted {
                records: 0,
                stored: true,
            };
        }

        let observed_at = Utc::now();
        let records: Vec<Record> = listings
            .into_iter()
            .map(|listing| listing.into_record(category, observed_at))
            .collect();
        let count = records.len();

        tracing::info!("Page {} of '{}' yielded {} record(s)", page, category, count);
        ctx.metrics.record_products(count, category);

        let stored = match ctx.storage.save_records(&records, category) {
            Ok(saved) => {
                tracing::debug!("Stored {} record(s) from page {}", saved, page);
                ctx.metrics.record_database_operation("save_records");
                true
            }
            Err(e) => {
                let err = HarvestError::StorageWrite(e);
                tracing::warn!("Page {} of '{}': {}", page, category, err);
                ctx.metrics.record_database_operation("save_records_failed");
                ctx.metrics.record_error(err.kind());
                false
            }
        };

        self.records.extend(records);
        PageResult::Extracted {
            records: count,
            stored,
        }
    }

    fn into_report(self, elapsed: Duration) -> SessionReport {
        SessionReport {
            job: self.job.clone(),
            records: self.records,
            pages: self.pages,
            final_state: self.state,
            elapsed,
        }
    }
}
