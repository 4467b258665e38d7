//! Operator alerts
//!
//! Alerts are fire-and-forget: delivery failures are logged and never
//! propagate into the harvest that raised them.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;

const SUBJECT_PREFIX: &str = "[Shelf Harvester Alert]";

/// One notification for an operator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub subject: String,
    pub body: String,
    pub raised_at: String,
}

impl Alert {
    pub fn new(subject: &str, message: &str) -> Self {
        let raised_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        Self {
            subject: format!("{} {}", SUBJECT_PREFIX, subject),
            body: format!(
                "Alert Time: {}\n\n{}\n\nPlease check the harvester.",
                raised_at, message
            ),
            raised_at,
        }
    }
}

/// Receives operator notifications
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, subject: &str, message: &str);
}

/// Writes alerts to the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerts;

#[async_trait]
impl AlertSink for LogAlerts {
    async fn notify(&self, subject: &str, message: &str) {
        tracing::warn!("ALERT {}: {}", subject, message);
    }
}

/// Posts alerts as JSON to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct WebhookAlerts {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlerts {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlerts {
    async fn notify(&self, subject: &str, message: &str) {
        let alert = Alert::new(subject, message);

        match self.client.post(&self.url).json(&alert).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!("Alert sent: {}", subject);
            }
            Ok(response) => {
                tracing::error!(
                    "Alert endpoint rejected '{}' with status {}",
                    subject,
                    response.status()
                );
            }
            Err(e) => {
                tracing::error!("Failed to send alert '{}': {}", subject, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_formatting() {
        let alert = Alert::new("Harvest failed", "No records for laptops");

        assert_eq!(alert.subject, "[Shelf Harvester Alert] Harvest failed");
        assert!(alert.body.starts_with("Alert Time: "));
        assert!(alert.body.contains("No records for laptops"));
    }
}
