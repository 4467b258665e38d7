//! Proxy pool with per-session liveness tracking
//!
//! A pool is built for one harvest session and dropped with it. Candidates are
//! shuffled once at construction and then probed in that order, so selection
//! is uniformly random among the endpoints that have not failed yet.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Liveness classification of a proxy endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyStatus {
    /// Not probed yet in this session
    Untested,

    /// Passed a probe and has not failed a fetch since
    Healthy,

    /// Failed a probe or a fetch; never selected again in this session
    Dead,
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Untested => "untested",
            Self::Healthy => "healthy",
            Self::Dead => "dead",
        };
        write!(f, "{}", s)
    }
}

/// A network egress address fetches may be routed through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub address: String,
    pub status: ProxyStatus,
}

impl ProxyEndpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            status: ProxyStatus::Untested,
        }
    }
}

/// Lightweight liveness check for a proxy endpoint
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    /// Returns true if a request routed through `address` succeeds within `timeout`
    async fn probe(&self, address: &str, timeout: Duration) -> bool;
}

/// Probes a proxy by requesting a known URL through it
#[derive(Debug, Clone)]
pub struct HttpProxyProbe {
    probe_url: String,
}

impl HttpProxyProbe {
    pub fn new(probe_url: impl Into<String>) -> Self {
        Self {
            probe_url: probe_url.into(),
        }
    }
}

#[async_trait]
impl ProxyProbe for HttpProxyProbe {
    async fn probe(&self, address: &str, timeout: Duration) -> bool {
        let proxy = match reqwest::Proxy::all(address) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("Rejecting proxy {}: {}", address, e);
                return false;
            }
        };

        let client = match reqwest::Client::builder()
            .proxy(proxy)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!("Failed to build probe client for {}: {}", address, e);
                return false;
            }
        };

        match client.get(&self.probe_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Proxy {} failed probe: {}", address, e);
                false
            }
        }
    }
}

/// Candidate proxies for one session
pub struct ProxyPool {
    endpoints: Vec<ProxyEndpoint>,
    probe: Arc<dyn ProxyProbe>,
    probe_timeout: Duration,
}

impl ProxyPool {
    /// Creates a pool from candidate addresses, shuffling them once
    ///
    /// # Arguments
    ///
    /// * `addresses` - Candidate proxy addresses; duplicates are dropped
    /// * `probe` - Liveness check used by [`ProxyPool::select`]
    /// * `probe_timeout` - Upper bound for each probe
    pub fn new<I, S>(addresses: I, probe: Arc<dyn ProxyProbe>, probe_timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut endpoints: Vec<ProxyEndpoint> = Vec::new();
        for address in addresses {
            let address = address.into();
            if !endpoints.iter().any(|e| e.address == address) {
                endpoints.push(ProxyEndpoint::new(address));
            }
        }

        endpoints.shuffle(&mut rand::rng());

        Self {
            endpoints,
            probe,
            probe_timeout,
        }
    }

    /// Returns a healthy endpoint, probing untested ones in shuffled order
    ///
    /// Endpoints that fail their probe are marked dead. Returns `None` when
    /// the pool is empty or every endpoint is dead; the caller then fetches
    /// without a proxy.
    pub async fn select(&mut self) -> Option<ProxyEndpoint> {
        for index in 0..self.endpoints.len() {
            match self.endpoints[index].status {
                ProxyStatus::Dead => continue,
                ProxyStatus::Healthy => return Some(self.endpoints[index].clone()),
                ProxyStatus::Untested => {
                    let candidate = self.endpoints[index].clone();
                    if self.test(&candidate, self.probe_timeout).await {
                        tracing::debug!("Proxy {} passed probe", candidate.address);
                        self.endpoints[index].status = ProxyStatus::Healthy;
                        return Some(self.endpoints[index].clone());
                    }

                    tracing::debug!("Proxy {} failed probe, marking dead", candidate.address);
                    self.endpoints[index].status = ProxyStatus::Dead;
                }
            }
        }

        None
    }

    /// Marks an endpoint dead for the rest of the session
    pub fn mark_dead(&mut self, endpoint: &ProxyEndpoint) {
        if let Some(entry) = self
            .endpoints
            .iter_mut()
            .find(|e| e.address == endpoint.address)
        {
            entry.status = ProxyStatus::Dead;
        }
    }

    /// Runs one liveness probe without changing the endpoint's status
    pub async fn test(&self, endpoint: &ProxyEndpoint, timeout: Duration) -> bool {
        self.probe.probe(&endpoint.address, timeout).await
    }

    pub fn status_of(&self, address: &str) -> Option<ProxyStatus> {
        self.endpoints
            .iter()
            .find(|e| e.address == address)
            .map(|e| e.status)
    }

    /// Number of endpoints not yet proven dead
    pub fn live_count(&self) -> usize {
        self.endpoints
            .iter()
            .filter(|e| e.status != ProxyStatus::Dead)
            .count()
    }

    pub fn healthy_count(&self) -> usize {
        self.endpoints
            .iter()
            .filter(|e| e.status == ProxyStatus::Healthy)
            .count()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl fmt::Debug for ProxyPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyPool")
            .field("endpoints", &self.endpoints)
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Probe answering from a fixed set of live addresses
    struct FixedProbe {
        alive: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FixedProbe {
        fn new(alive: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                alive: alive.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProxyProbe for FixedProbe {
        async fn probe(&self, address: &str, _timeout: Duration) -> bool {
            self.calls.lock().unwrap().push(address.to_string());
            self.alive.contains(address)
        }
    }

    fn pool(addresses: &[&str], probe: Arc<FixedProbe>) -> ProxyPool {
        ProxyPool::new(
            addresses.iter().copied(),
            probe,
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn test_empty_pool_selects_nothing() {
        let mut pool = pool(&[], FixedProbe::new(&[]));
        assert!(pool.is_empty());
        assert!(pool.select().await.is_none());
    }

    #[tokio::test]
    async fn test_select_skips_failed_probes() {
        let probe = FixedProbe::new(&["http://10.0.0.3:8080"]);
        let mut pool = pool(
            &["http://10.0.0.1:3128", "http://10.0.0.2:80", "http://10.0.0.3:8080"],
            probe.clone(),
        );

        let selected = pool.select().await.unwrap();
        assert_eq!(selected.address, "http://10.0.0.3:8080");
        assert_eq!(selected.status, ProxyStatus::Healthy);
        assert_eq!(pool.healthy_count(), 1);

        // Every endpoint probed before the healthy one is now dead
        for address in probe.calls() {
            if address != "http://10.0.0.3:8080" {
                assert_eq!(pool.status_of(&address), Some(ProxyStatus::Dead));
            }
        }
    }

    #[tokio::test]
    async fn test_healthy_endpoint_is_reused_without_probing() {
        let probe = FixedProbe::new(&["http://10.0.0.1:3128"]);
        let mut pool = pool(&["http://10.0.0.1:3128"], probe.clone());

        pool.select().await.unwrap();
        pool.select().await.unwrap();

        assert_eq!(probe.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_dead_moves_to_next_endpoint() {
        let probe = FixedProbe::new(&["http://10.0.0.1:3128", "http://10.0.0.2:80"]);
        let mut pool = pool(&["http://10.0.0.1:3128", "http://10.0.0.2:80"], probe);

        let first = pool.select().await.unwrap();
        pool.mark_dead(&first);

        let second = pool.select().await.unwrap();
        assert_ne!(first.address, second.address);

        pool.mark_dead(&second);
        assert!(pool.select().await.is_none());
        assert_eq!(pool.live_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_does_not_change_status() {
        let probe = FixedProbe::new(&[]);
        let pool = pool(&["http://10.0.0.1:3128"], probe);
        let endpoint = ProxyEndpoint::new("http://10.0.0.1:3128");

        assert!(!pool.test(&endpoint, Duration::from_millis(10)).await);
        assert_eq!(
            pool.status_of("http://10.0.0.1:3128"),
            Some(ProxyStatus::Untested)
        );
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let pool = pool(
            &["http://10.0.0.1:3128", "http://10.0.0.1:3128"],
            FixedProbe::new(&[]),
        );
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_selection_is_randomized() {
        let addresses: Vec<String> = (1..=8).map(|i| format!("http://10.0.0.{}:80", i)).collect();
        let refs: Vec<&str> = addresses.iter().map(String::as_str).collect();

        let mut seen = HashSet::new();
        for _ in 0..40 {
            let mut pool = pool(&refs, FixedProbe::new(&refs));
            seen.insert(pool.select().await.unwrap().address);
        }

        assert!(seen.len() > 1);
    }
}
