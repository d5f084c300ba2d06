//! Direct channel against a wiremock demo site.

mod common;

use assert_json_diff::assert_json_eq;
use common::{catalogue, mount_api_site, mount_listing_page, mount_login, product_json, test_config};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tablehaul::acquisition::http_client::HttpClient;
use tablehaul::acquisition::{AcquisitionStrategy, DirectChannel};
use tablehaul::error::{AuthFailure, NavigationFailure};
use tablehaul::progress::{self, RunEventKind, Stage};
use tablehaul::{Runner, ScrapeError};
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn read_output(path: &std::path::Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn three_pages_yield_every_record_once() {
    let server = MockServer::start().await;
    let products = catalogue(24);
    mount_api_site(&server, &products, 10).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("products.json");
    let summary = Runner::new(test_config(&server.uri(), &output))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.records, 24);
    assert_eq!(summary.pages, 3);
    assert_eq!(summary.duplicates, 0);
    assert_eq!(summary.strategy, "api");

    let expected: Vec<Value> = products.iter().map(product_json).collect();
    assert_json_eq!(read_output(&output), Value::Array(expected));
}

#[tokio::test]
async fn last_page_reports_no_next() {
    let server = MockServer::start().await;
    mount_api_site(&server, &catalogue(24), 10).await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), &dir.path().join("out.json"));

    let mut channel = DirectChannel::new(config.clone()).unwrap();
    assert_ok!(channel.authenticate().await);
    let mut handle = channel.navigate(&config.navigation).await.unwrap();

    let mut sizes = Vec::new();
    loop {
        let page = channel.read_page(&handle).await.unwrap();
        sizes.push(page.rows.len());
        if !page.has_next {
            break;
        }
        channel.advance(&mut handle, &page).await.unwrap();
    }
    assert_eq!(sizes, vec![10, 10, 4]);
    assert_eq!(handle.page, 3);
    channel.close().await;
}

#[tokio::test]
async fn records_repeated_across_pages_are_kept_once() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let products = catalogue(16);
    let first: Vec<Value> = products[..10].iter().map(product_json).collect();
    let second: Vec<Value> = products[8..].iter().map(product_json).collect();
    mount_listing_page(&server, 1, 2, first).await;
    mount_listing_page(&server, 2, 2, second).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("products.json");
    let summary = Runner::new(test_config(&server.uri(), &output))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.duplicates, 2);
    assert_eq!(summary.records, 10 + 8 - 2);

    let written = read_output(&output);
    let ids: Vec<u64> = written
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids.len(), summary.records);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    assert_eq!(ids, (1..=16).collect::<Vec<u64>>());
}

#[tokio::test]
async fn listing_requires_the_login_cookie() {
    let server = MockServer::start().await;
    mount_api_site(&server, &catalogue(4), 10).await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), &dir.path().join("out.json"));

    let mut anonymous = DirectChannel::new(config.clone()).unwrap();
    let handle = anonymous.navigate(&config.navigation).await.unwrap();
    let err = anonymous.read_page(&handle).await.unwrap_err();
    assert!(matches!(err, ScrapeError::SessionExpired { .. }), "{err:?}");

    let mut channel = DirectChannel::new(config.clone()).unwrap();
    assert_ok!(channel.authenticate().await);
    let handle = channel.navigate(&config.navigation).await.unwrap();
    let page = channel.read_page(&handle).await.unwrap();
    assert_eq!(page.rows.len(), 4);
    assert!(!page.has_next);
    channel.close().await;
}

#[tokio::test]
async fn wrong_password_fails_without_output() {
    let server = MockServer::start().await;
    mount_api_site(&server, &catalogue(24), 10).await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("products.json");
    let mut config = test_config(&server.uri(), &output);
    config.credentials.password = "letmein".into();

    let err = Runner::new(config).run().await.unwrap_err();
    match err {
        ScrapeError::Auth {
            username, failure, ..
        } => {
            assert_eq!(username, "demo");
            assert_eq!(
                failure,
                AuthFailure::Rejected("Invalid username or password".into())
            );
        }
        other => panic!("expected auth error, got {other:?}"),
    }
    assert!(!output.exists());
}

#[tokio::test]
async fn expired_session_is_renewed_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_api_site(&server, &catalogue(24), 10).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("products.json");
    let summary = Runner::new(test_config(&server.uri(), &output))
        .run()
        .await
        .unwrap();
    assert_eq!(summary.reauthentications, 1);
    assert_eq!(summary.records, 24);
}

#[tokio::test]
async fn session_that_keeps_expiring_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_api_site(&server, &catalogue(24), 10).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("products.json");
    let err = Runner::new(test_config(&server.uri(), &output))
        .run()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScrapeError::Auth {
            failure: AuthFailure::Flow(_),
            ..
        }
    ));
    assert!(!output.exists());
}

#[tokio::test]
async fn persistent_server_errors_become_pagination_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(503))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_api_site(&server, &catalogue(24), 10).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("products.json");
    let config = test_config(&server.uri(), &output);
    let client = HttpClient::new(2_000)
        .unwrap()
        .with_retries(0, Duration::ZERO);
    let channel = DirectChannel::with_client(config.clone(), client);

    let err = Runner::new(config)
        .run_with(Box::new(channel))
        .await
        .unwrap_err();
    match err {
        ScrapeError::Pagination { page, reason } => {
            assert_eq!(page, 2);
            assert!(reason.contains("3 attempt"), "{reason}");
        }
        other => panic!("expected pagination error, got {other:?}"),
    }
    assert!(!output.exists());
}

#[tokio::test]
async fn missing_listing_endpoint_is_navigation_error() {
    let server = MockServer::start().await;
    mount_api_site(&server, &catalogue(4), 10).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server.uri(), &dir.path().join("out.json"));
    config.api.path = "/api/v2/products".into();

    let err = assert_err!(Runner::new(config).run().await);
    assert!(matches!(
        err,
        ScrapeError::Navigation {
            failure: NavigationFailure::InvalidTarget(_),
            ..
        }
    ));
}

#[tokio::test]
async fn run_reports_progress() {
    let server = MockServer::start().await;
    mount_api_site(&server, &catalogue(12), 5).await;
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = progress::channel(64);

    let summary = Runner::new(test_config(&server.uri(), &dir.path().join("out.json")))
        .with_events(tx)
        .run()
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.run_id, summary.run_id);
        events.push(event.event);
    }
    let started: Vec<Stage> = events
        .iter()
        .filter_map(|e| match e {
            RunEventKind::StageStarted { stage } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        started,
        vec![Stage::Authenticate, Stage::Navigate, Stage::Collect, Stage::Export]
    );
    let totals: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            RunEventKind::PageCollected { total, .. } => Some(*total),
            _ => None,
        })
        .collect();
    assert_eq!(totals, vec![5, 10, 12]);
    assert!(matches!(
        events.last(),
        Some(RunEventKind::RunComplete { records: 12, pages: 3, .. })
    ));
}
