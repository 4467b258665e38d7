//! Direct harvesting of configured categories, bypassing the queue

use crate::config::CategoryEntry;
use crate::harvest::session::{DelayRange, HarvestSession, SessionReport};
use crate::queue::Job;

/// Options shared by every category in a direct run
#[derive(Debug, Clone, Copy)]
pub struct DirectRun {
    pub page_limit: u32,
    pub use_proxy: bool,
    /// Pause between consecutive categories
    pub category_delay: DelayRange,
}

/// Harvests categories one after another
///
/// A category whose job is rejected is logged and skipped. Stops early,
/// keeping the reports gathered so far, when shutdown is requested.
///
/// # Arguments
///
/// * `session` - Session used for every category
/// * `categories` - Categories in the order they should be harvested
/// * `options` - Page limit, proxy use and inter-category delay
pub async fn harvest_categories(
    session: &HarvestSession,
    categories: &[CategoryEntry],
    options: DirectRun,
) -> Vec<SessionReport> {
    let shutdown = session.shutdown_token();
    let mut reports = Vec::with_capacity(categories.len());

    for (index, category) in categories.iter().enumerate() {
        if shutdown.is_cancelled() {
            break;
        }

        if index > 0 {
            let delay = options.category_delay.sample();
            tracing::info!("Waiting {:.1}s before next category", delay.as_secs_f64());
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Harvesting category: {}", category.name);
        let job = Job::new(
            category.url.clone(),
            category.name.clone(),
            options.page_limit,
            options.use_proxy,
        );

        match session.run(&job).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::error!("Skipping category '{}': {}", category.name, e);
                session.context().metrics.record_error(e.kind());
            }
        }
    }

    let total: usize = reports.iter().map(SessionReport::records_found).sum();
    tracing::info!(
        "Harvested {} record(s) across {} categor{}",
        total,
        reports.len(),
        if reports.len() == 1 { "y" } else { "ies" }
    );

    reports
}
