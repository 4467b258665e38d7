//! Integration tests for the harvest session
//!
//! Fetching is scripted; storage is an in-memory SQLite database.

mod common;

use common::*;
use shelf_harvester::harvest::{page_url, HarvestSession, PageResult, SessionState};
use shelf_harvester::queue::{HarvestStatus, Job};
use shelf_harvester::storage::RecordStore;
use shelf_harvester::HarvestError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TARGET: &str = "https://shop.test/s?k=tea";

fn job(pages: u32) -> Job {
    Job::new(TARGET, "tea", pages, false)
}

#[tokio::test]
async fn test_retry_produces_one_set_of_records() {
    let fetcher = ScriptedFetcher::new(vec![
        timeout(),
        success(results_page(&[("T1", "Green Tea"), ("T2", "Black Tea")])),
    ]);
    let h = harness(fetcher.clone(), fast_settings(&[]));
    let session = HarvestSession::new(h.ctx.clone(), CancellationToken::new());

    let report = session.run(&job(1)).await.unwrap();

    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(report.records_found(), 2);
    assert_eq!(report.pages[0].attempts, 2);
    assert_eq!(h.storage.count_records().unwrap(), 2);
    assert_eq!(report.status(), HarvestStatus::Completed);
    assert_eq!(report.final_state, SessionState::Done);
}

#[tokio::test]
async fn test_pages_are_fetched_in_order() {
    let fetcher = ScriptedFetcher::new(vec![
        success(results_page(&[("A1", "One")])),
        success(results_page(&[("A2", "Two")])),
        success(results_page(&[("A3", "Three")])),
    ]);
    let h = harness(fetcher.clone(), fast_settings(&[]));
    let session = HarvestSession::new(h.ctx.clone(), CancellationToken::new());

    let report = session.run(&job(3)).await.unwrap();

    let expected: Vec<String> = (1..=3).map(|n| page_url(TARGET, n)).collect();
    assert_eq!(fetcher.urls(), expected);
    assert_eq!(fetcher.urls()[1], "https://shop.test/s?k=tea&page=2");

    let names: Vec<&str> = report.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["One", "Two", "Three"]);
}

#[tokio::test]
async fn test_exhausted_page_does_not_end_session() {
    let fetcher = ScriptedFetcher::new(vec![
        timeout(),
        timeout(),
        timeout(),
        success(results_page(&[("B1", "Oolong")])),
    ]);
    let h = harness(fetcher.clone(), fast_settings(&[]));
    let session = HarvestSession::new(h.ctx.clone(), CancellationToken::new());

    let report = session.run(&job(2)).await.unwrap();

    assert_eq!(fetcher.calls().len(), 4);
    assert_eq!(report.failed_pages(), vec![1]);
    assert_eq!(report.pages[0].attempts, 3);
    assert!(matches!(report.pages[0].result, PageResult::Exhausted(_)));
    assert_eq!(report.records_found(), 1);
    assert_eq!(report.status(), HarvestStatus::Completed);
    assert_eq!(h.metrics.count("error:page_exhausted"), 1);
    assert_eq!(h.metrics.count("error:fetch_timeout"), 3);
}

#[tokio::test]
async fn test_no_records_means_failed() {
    let fetcher = ScriptedFetcher::new(vec![timeout(), timeout(), timeout()]);
    let h = harness(fetcher, fast_settings(&[]));
    let session = HarvestSession::new(h.ctx.clone(), CancellationToken::new());

    let report = session.run(&job(1)).await.unwrap();

    assert_eq!(report.status(), HarvestStatus::Failed);
    assert_eq!(report.to_result().records_found, 0);
    assert_eq!(h.storage.count_records().unwrap(), 0);
    assert_eq!(h.metrics.count("request:failed:tea"), 4);
}

#[tokio::test]
async fn test_empty_page_does_not_stop_pagination() {
    let fetcher = ScriptedFetcher::new(vec![
        success(results_page(&[])),
        success(results_page(&[("C1", "Chai")])),
    ]);
    let h = harness(fetcher.clone(), fast_settings(&[]));
    let session = HarvestSession::new(h.ctx.clone(), CancellationToken::new());

    let report = session.run(&job(2)).await.unwrap();

    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(
        report.pages[0].result,
        PageResult::Extracted {
            records: 0,
            stored: true
        }
    );
    assert_eq!(report.records_found(), 1);
}

#[tokio::test]
async fn test_earlier_pages_are_stored_before_later_failures() {
    let fetcher = ScriptedFetcher::new(vec![
        success(results_page(&[("D1", "Darjeeling"), ("D2", "Assam")])),
        timeout(),
        timeout(),
        timeout(),
    ]);
    let h = harness(fetcher, fast_settings(&[]));
    let session = HarvestSession::new(h.ctx.clone(), CancellationToken::new());

    let report = session.run(&job(2)).await.unwrap();

    assert_eq!(report.failed_pages(), vec![2]);
    assert_eq!(h.storage.count_records().unwrap(), 2);
    assert_eq!(h.metrics.count("db:save_records"), 1);
}

#[tokio::test]
async fn test_storage_failure_does_not_abort_session() {
    let fetcher = ScriptedFetcher::new(vec![
        success(results_page(&[("E1", "Earl Grey")])),
        success(results_page(&[("E2", "Jasmine")])),
    ]);
    let mut h = harness(fetcher.clone(), fast_settings(&[]));
    h.ctx.storage = Arc::new(BrokenStore);
    let session = HarvestSession::new(h.ctx.clone(), CancellationToken::new());

    let report = session.run(&job(2)).await.unwrap();

    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(report.records_found(), 2);
    assert_eq!(
        report.pages[0].result,
        PageResult::Extracted {
            records: 1,
            stored: false
        }
    );
    assert_eq!(h.metrics.count("error:storage_write"), 2);
}

#[tokio::test]
async fn test_failed_fetch_switches_proxy() {
    let proxies = ["http://10.0.0.1:3128", "http://10.0.0.2:3128"];
    let fetcher = ScriptedFetcher::new(vec![
        timeout(),
        success(results_page(&[("F1", "Matcha")])),
    ]);
    let h = harness_with_probe(fetcher.clone(), fast_settings(&proxies), FixedProbe::new(&proxies));
    let session = HarvestSession::new(h.ctx.clone(), CancellationToken::new());

    let report = session
        .run(&Job::new(TARGET, "tea", 1, true))
        .await
        .unwrap();

    let calls = fetcher.calls();
    assert_eq!(calls.len(), 2);
    let first = calls[0].proxy.clone().unwrap();
    let second = calls[1].proxy.clone().unwrap();
    assert_ne!(first, second);
    assert!(proxies.contains(&first.as_str()));
    assert_eq!(report.records_found(), 1);
}

#[tokio::test]
async fn test_no_live_proxy_falls_back_to_direct() {
    let fetcher = ScriptedFetcher::new(vec![success(results_page(&[("G1", "Genmaicha")]))]);
    let h = harness_with_probe(
        fetcher.clone(),
        fast_settings(&["http://10.0.0.9:3128"]),
        FixedProbe::new(&[]),
    );
    let session = HarvestSession::new(h.ctx.clone(), CancellationToken::new());

    let report = session
        .run(&Job::new(TARGET, "tea", 1, true))
        .await
        .unwrap();

    assert_eq!(fetcher.calls()[0].proxy, None);
    assert_eq!(report.records_found(), 1);
    assert_eq!(h.metrics.count("error:proxy_unavailable"), 1);
    assert!(h.metrics.events().contains(&"proxies:0".to_string()));
}

#[tokio::test]
async fn test_proxies_unused_when_job_does_not_ask() {
    let fetcher = ScriptedFetcher::new(vec![success(results_page(&[("H1", "Hojicha")]))]);
    let h = harness_with_probe(
        fetcher.clone(),
        fast_settings(&["http://10.0.0.1:3128"]),
        FixedProbe::new(&["http://10.0.0.1:3128"]),
    );
    let session = HarvestSession::new(h.ctx.clone(), CancellationToken::new());

    session.run(&job(1)).await.unwrap();

    assert_eq!(fetcher.calls()[0].proxy, None);
}

#[tokio::test]
async fn test_cancelled_before_start_aborts_without_fetching() {
    let fetcher = ScriptedFetcher::new(vec![]);
    let h = harness(fetcher.clone(), fast_settings(&[]));
    let token = CancellationToken::new();
    token.cancel();
    let session = HarvestSession::new(h.ctx.clone(), token);

    let report = session.run(&job(3)).await.unwrap();

    assert!(report.is_aborted());
    assert!(fetcher.calls().is_empty());
    assert_eq!(report.status(), HarvestStatus::Failed);
}

#[tokio::test]
async fn test_cancel_interrupts_backoff() {
    let fetcher = ScriptedFetcher::new(vec![timeout()]);
    let mut settings = fast_settings(&[]);
    settings.backoff_base = Duration::from_secs(30);
    let h = harness(fetcher.clone(), settings);
    let token = CancellationToken::new();
    let session = HarvestSession::new(h.ctx.clone(), token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(5), session.run(&job(2)))
        .await
        .expect("session should stop promptly")
        .unwrap();
    canceller.await.unwrap();

    assert!(report.is_aborted());
    assert_eq!(fetcher.calls().len(), 1);
}

#[tokio::test]
async fn test_cancel_during_backoff_on_last_page_aborts() {
    let fetcher = ScriptedFetcher::new(vec![timeout()]);
    let mut settings = fast_settings(&[]);
    settings.backoff_base = Duration::from_secs(30);
    let h = harness(fetcher.clone(), settings);
    let token = CancellationToken::new();
    let session = HarvestSession::new(h.ctx.clone(), token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(5), session.run(&job(1)))
        .await
        .expect("session should stop promptly")
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(report.final_state, SessionState::Aborted);
    assert!(report.failed_pages().is_empty());
    assert!(report.pages.is_empty());
    assert!(!h
        .metrics
        .events()
        .contains(&"error:page_exhausted".to_string()));
    assert_eq!(fetcher.calls().len(), 1);
}

#[tokio::test]
async fn test_invalid_job_is_rejected() {
    let h = harness(ScriptedFetcher::new(vec![]), fast_settings(&[]));
    let session = HarvestSession::new(h.ctx.clone(), CancellationToken::new());

    let err = session
        .run(&Job::new(TARGET, "tea", 0, false))
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::InvalidJob(_)));
}

#[tokio::test]
async fn test_session_metrics() {
    let fetcher = ScriptedFetcher::new(vec![success(results_page(&[("M1", "Mint")]))]);
    let h = harness(fetcher, fast_settings(&[]));
    let session = HarvestSession::new(h.ctx.clone(), CancellationToken::new());

    session.run(&job(1)).await.unwrap();

    let events = h.metrics.events();
    assert_eq!(events.first().map(String::as_str), Some("request:started:tea"));
    assert!(events.contains(&"request:success:tea".to_string()));
    assert!(events.contains(&"products:tea:1".to_string()));
    assert!(events.contains(&"duration:tea".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("request:completed:tea"));
}
