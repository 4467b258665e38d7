//! Page fetcher implementation
//!
//! This module renders one page per call in a headless browser:
//! - A fresh browser is launched for every attempt (optionally behind a proxy)
//! - A fixed desktop user agent and viewport are applied
//! - The page is loaded, given a short settle period for client-side
//!   rendering, and its markup is returned
//! - The browser is closed on every exit path
//!
//! A fetch is a single attempt. Retries, backoff and proxy failover belong to
//! the harvest session.

use crate::config::BrowserConfig;
use crate::harvest::proxy::ProxyEndpoint;
use async_trait::async_trait;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, BrowserConfig as LaunchConfig};
use futures::StreamExt;
use std::fmt;
use std::time::Duration;

/// Reason a fetch attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The attempt exceeded its time budget
    Timeout,

    /// Navigation or page rendering failed
    Navigation,

    /// The rendering session could not be started
    Browser,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "fetch_timeout",
            Self::Navigation => "fetch_navigation",
            Self::Browser => "browser_launch",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details of a failed fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of a single fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Fully rendered page markup
    Success(String),

    /// The attempt failed; the caller decides whether to retry
    Failure(FetchFailure),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Retrieves rendered markup for a URL in a single attempt
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&ProxyEndpoint>,
        timeout: Duration,
    ) -> FetchOutcome;
}

/// Headless Chromium fetcher
#[derive(Debug, Clone)]
pub struct BrowserFetcher {
    user_agent: String,
    viewport_width: u32,
    viewport_height: u32,
    settle: Duration,
    chrome_executable: Option<String>,
}

impl BrowserFetcher {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            viewport_width: config.viewport_width,
            viewport_height: config.viewport_height,
            settle: config.settle(),
            chrome_executable: config.chrome_executable.clone(),
        }
    }

    fn launch_config(
        &self,
        proxy: Option<&ProxyEndpoint>,
        timeout: Duration,
    ) -> Result<LaunchConfig, String> {
        let viewport = Viewport {
            width: self.viewport_width,
            height: self.viewport_height,
            ..Viewport::default()
        };

        let mut builder = LaunchConfig::builder()
            .no_sandbox()
            .request_timeout(timeout)
            .window_size(self.viewport_width, self.viewport_height)
            .viewport(viewport)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--lang=en-US")
            .arg(format!("--user-agent={}", self.user_agent));

        if let Some(proxy) = proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy.address));
        }

        if let Some(executable) = &self.chrome_executable {
            builder = builder.chrome_executable(executable);
        }

        builder.build()
    }

    /// Opens the page, waits for it to load and settle, and returns its markup
    async fn render(&self, browser: &Browser, url: &str) -> Result<String, String> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| format!("Failed to open page: {}", e))?;

        page.set_user_agent(self.user_agent.as_str())
            .await
            .map_err(|e| format!("Failed to set user agent: {}", e))?;

        page.goto(url)
            .await
            .map_err(|e| format!("Navigation failed: {}", e))?;

        tokio::time::sleep(self.settle).await;

        page.content()
            .await
            .map_err(|e| format!("Failed to read page content: {}", e))
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&ProxyEndpoint>,
        timeout: Duration,
    ) -> FetchOutcome {
        let config = match self.launch_config(proxy, timeout) {
            Ok(c) => c,
            Err(e) => return FetchOutcome::Failure(FetchFailure::new(FailureKind::Browser, e)),
        };

        let (mut browser, mut handler) = match Browser::launch(config).await {
            Ok(pair) => pair,
            Err(e) => {
                return FetchOutcome::Failure(FetchFailure::new(
                    FailureKind::Browser,
                    format!("Failed to launch browser: {}", e),
                ))
            }
        };

        // Drive browser events until the connection closes
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let rendered = tokio::time::timeout(timeout, self.render(&browser, url)).await;

        if let Err(e) = browser.close().await {
            tracing::debug!("Browser close failed for {}: {}", url, e);
        }
        if let Err(e) = browser.wait().await {
            tracing::debug!("Browser process wait failed for {}: {}", url, e);
        }
        handler_task.abort();

        match rendered {
            Ok(Ok(markup)) => FetchOutcome::Success(markup),
            Ok(Err(message)) => {
                FetchOutcome::Failure(FetchFailure::new(FailureKind::Navigation, message))
            }
            Err(_) => FetchOutcome::Failure(FetchFailure::new(
                FailureKind::Timeout,
                format!("No rendered content within {}ms", timeout.as_millis()),
            )),
        }
    }
}
