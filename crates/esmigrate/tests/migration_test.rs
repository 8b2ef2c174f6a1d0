//! End-to-end migration tests against mocked clusters.
//!
//! Run with: `cargo test --test migration_test`

#![allow(clippy::pedantic)]

mod common;

use std::collections::HashSet;
use std::io::Write;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use common::*;
use esmigrate::{
    Error, Migration, MigrationConfig, MigrationOptions, StreamEnd, WriteFailurePolicy,
};

fn options(indices: &str) -> MigrationOptions {
    MigrationOptions {
        indices: indices.to_string(),
        page_size: 200,
        workers: 2,
        bulk_size_mb: 1,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_legacy_to_current_moves_every_document_once() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_cluster(&source, "1.7.5", "green").await;
    mount_cluster(&target, "5.2.0", "green").await;
    mount_legacy_scroll(&source, "logs", vec![hits("logs", 0, 200), hits("logs", 200, 200)]).await;
    mount_bulk_ok(&target).await;

    let migration = Migration::new(config(&source, &target, options("logs"))).unwrap();
    let stats = migration.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(stats.stream_end, StreamEnd::Completed);
    assert_eq!(stats.total_hits, 400);
    assert_eq!(stats.read, 400);
    assert_eq!(stats.written, 400);
    assert!(stats.is_clean());

    let bodies = bulk_bodies(&target).await;
    assert_eq!(bodies.len() as u64, stats.batches);
    for body in &bodies {
        assert!(!body.is_empty(), "empty bulk request sent");
        assert!(body.len() <= 1_000_000);
        assert!(body.ends_with('\n'));
    }
    let headers = bulk_headers(&bodies);
    let ids: HashSet<String> = headers
        .iter()
        .map(|h| h["_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(headers.len(), 400);
    assert_eq!(ids.len(), 400, "duplicate documents written");
}

#[tokio::test]
async fn test_current_to_legacy_with_target_index() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_cluster(&source, "5.6.16", "green").await;
    mount_cluster(&target, "2.4.6", "yellow").await;
    mount_current_scroll(
        &source,
        "logs-*",
        vec![hits("logs-a", 0, 50), hits("logs-b", 50, 50)],
    )
    .await;
    mount_bulk_ok(&target).await;

    let opts = MigrationOptions {
        target_index: Some("archive".to_string()),
        ..options("logs-*")
    };
    let stats = Migration::new(config(&source, &target, opts))
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.written, 100);
    let headers = bulk_headers(&bulk_bodies(&target).await);
    assert_eq!(headers.len(), 100);
    assert!(headers.iter().all(|h| h["_index"] == "archive"));
}

#[tokio::test]
async fn test_document_without_id_is_dropped() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_cluster(&source, "5.2.0", "green").await;
    mount_cluster(&target, "5.2.0", "green").await;
    let mut page = hits("logs", 0, 10);
    page[4].as_object_mut().unwrap().remove("_id");
    mount_current_scroll(&source, "logs", vec![page]).await;
    mount_bulk_ok(&target).await;

    let stats = Migration::new(config(&source, &target, options("logs")))
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.read, 10);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.written, 9);
    let headers = bulk_headers(&bulk_bodies(&target).await);
    assert!(headers.iter().all(|h| h["_id"] != "4"));
}

#[tokio::test]
async fn test_waits_while_target_is_red() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_cluster(&source, "5.2.0", "green").await;
    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"cluster_name": "t", "status": "red"})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&target)
        .await;
    mount_cluster(&target, "5.2.0", "green").await;
    mount_current_scroll(&source, "logs", vec![hits("logs", 0, 5)]).await;
    mount_bulk_ok(&target).await;

    let started = std::time::Instant::now();
    let stats = Migration::new(config(&source, &target, options("logs")))
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(stats.written, 5);
}

#[tokio::test]
async fn test_readiness_deadline() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_cluster(&source, "5.2.0", "red").await;
    mount_cluster(&target, "5.2.0", "green").await;

    let mut cfg = config(&source, &target, options("logs"));
    cfg.options.readiness_timeout_secs = 1;
    let result = Migration::new(cfg)
        .unwrap()
        .run(&CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::ReadinessTimeout { .. })));
    assert!(bulk_bodies(&target).await.is_empty());
}

#[tokio::test]
async fn test_open_failure_is_fatal() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_cluster(&source, "5.2.0", "green").await;
    mount_cluster(&target, "5.2.0", "green").await;
    Mock::given(method("GET"))
        .and(path("/missing/_search"))
        .respond_with(ResponseTemplate::new(404).set_body_string("index_not_found_exception"))
        .mount(&source)
        .await;

    let result = Migration::new(config(&source, &target, options("missing")))
        .unwrap()
        .run(&CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::Protocol { status: 404, .. })));
    assert!(bulk_bodies(&target).await.is_empty());
}

#[tokio::test]
async fn test_fail_fast_stops_on_bulk_error() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_cluster(&source, "5.2.0", "green").await;
    mount_cluster(&target, "5.2.0", "green").await;
    mount_current_scroll(&source, "logs", vec![hits("logs", 0, 20)]).await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(400).set_body_string("mapper_parsing_exception"))
        .mount(&target)
        .await;

    let opts = MigrationOptions {
        write_failure_policy: WriteFailurePolicy::FailFast,
        max_retries: 0,
        ..options("logs")
    };
    let result = Migration::new(config(&source, &target, opts))
        .unwrap()
        .run(&CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::WriteFailed(_))));
}

#[tokio::test]
async fn test_best_effort_counts_failed_batches() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_cluster(&source, "5.2.0", "green").await;
    mount_cluster(&target, "5.2.0", "green").await;
    mount_current_scroll(&source, "logs", vec![hits("logs", 0, 20)]).await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(400).set_body_string("mapper_parsing_exception"))
        .mount(&target)
        .await;

    let opts = MigrationOptions {
        max_retries: 0,
        ..options("logs")
    };
    let stats = Migration::new(config(&source, &target, opts))
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.read, 20);
    assert_eq!(stats.failed, 20);
    assert_eq!(stats.written, 0);
    assert!(!stats.is_clean());
}

#[tokio::test]
async fn test_copy_mappings_recreates_target_index() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_cluster(&source, "1.7.5", "green").await;
    mount_cluster(&target, "5.2.0", "green").await;
    Mock::given(method("GET"))
        .and(path("/_all/_mapping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "logs": {"mappings": {"event": {"properties": {"seq": {"type": "long"}}}}},
            ".kibana": {"mappings": {"config": {}}}
        })))
        .mount(&source)
        .await;
    mount_legacy_scroll(&source, "logs", vec![hits("logs", 0, 3)]).await;
    Mock::given(method("DELETE"))
        .and(path("/logs"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&target)
        .await;
    Mock::given(method("PUT"))
        .and(path("/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
        .expect(1)
        .mount(&target)
        .await;
    Mock::given(method("PUT"))
        .and(path("/logs/_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
        .expect(1)
        .mount(&target)
        .await;
    mount_bulk_ok(&target).await;

    let opts = MigrationOptions {
        copy_mappings: true,
        force: true,
        ..options("_all")
    };
    let stats = Migration::new(config(&source, &target, opts))
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.written, 3);
    let requests = target.received_requests().await.unwrap();
    let create = requests
        .iter()
        .find(|r| r.method.as_str() == "PUT" && r.url.path() == "/logs")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&create.body).unwrap();
    assert_eq!(body["mappings"]["event"]["properties"]["seq"]["type"], "long");
    assert_eq!(body["settings"]["index"]["number_of_replicas"], "0");
}

#[tokio::test]
async fn test_cancelled_run() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_cluster(&source, "5.2.0", "red").await;
    mount_cluster(&target, "5.2.0", "green").await;

    let mut cfg = config(&source, &target, options("logs"));
    cfg.options.readiness_timeout_secs = 0;
    let migration = Migration::new(cfg).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let result = migration.run(&cancel).await;
    assert!(matches!(result, Err(Error::Cancelled)));
}

/// Cancels the run as soon as the request arrives, then holds the reply far
/// longer than the test is willing to wait.
struct CancelAndStall {
    cancel: CancellationToken,
    body: Value,
}

impl Respond for CancelAndStall {
    fn respond(&self, _: &Request) -> ResponseTemplate {
        self.cancel.cancel();
        ResponseTemplate::new(200)
            .set_body_json(self.body.clone())
            .set_delay(Duration::from_secs(30))
    }
}

fn logs_mapping() -> Value {
    json!({"logs": {"mappings": {"event": {"properties": {"seq": {"type": "long"}}}}}})
}

#[tokio::test]
async fn test_cancel_during_index_preparation() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_cluster(&source, "5.2.0", "green").await;
    mount_cluster(&target, "5.2.0", "green").await;
    let cancel = CancellationToken::new();
    Mock::given(method("GET"))
        .and(path("/logs/_mapping"))
        .respond_with(CancelAndStall {
            cancel: cancel.clone(),
            body: logs_mapping(),
        })
        .mount(&source)
        .await;

    let opts = MigrationOptions {
        copy_mappings: true,
        ..options("logs")
    };
    let migration = Migration::new(config(&source, &target, opts)).unwrap();
    let started = std::time::Instant::now();
    let result = migration.run(&cancel).await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(10));
    let requests = target.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method.as_str() != "PUT"));
}

#[tokio::test]
async fn test_cancel_during_replica_restore() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_cluster(&source, "5.2.0", "green").await;
    mount_cluster(&target, "5.2.0", "green").await;
    Mock::given(method("GET"))
        .and(path("/logs/_mapping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(logs_mapping()))
        .mount(&source)
        .await;
    mount_current_scroll(&source, "logs", vec![hits("logs", 0, 3)]).await;
    Mock::given(method("PUT"))
        .and(path("/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
        .mount(&target)
        .await;
    mount_bulk_ok(&target).await;
    let cancel = CancellationToken::new();
    Mock::given(method("PUT"))
        .and(path("/logs/_settings"))
        .respond_with(CancelAndStall {
            cancel: cancel.clone(),
            body: json!({"acknowledged": true}),
        })
        .mount(&target)
        .await;

    let opts = MigrationOptions {
        copy_mappings: true,
        ..options("logs")
    };
    let migration = Migration::new(config(&source, &target, opts)).unwrap();
    let started = std::time::Instant::now();
    let result = migration.run(&cancel).await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(bulk_headers(&bulk_bodies(&target).await).len(), 3);
}

#[test]
fn test_config_file_roundtrip() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
source:
  url: http://old:9200
target:
  url: https://new:9200
  username: elastic
  password: changeme
options:
  indices: "logs-*,metrics"
  workers: 8
  bulk_size_mb: 10
  copy_mappings: true
  shards: 3
"#
    )
    .unwrap();

    let config = tokio_test::assert_ok!(MigrationConfig::from_file(file.path()));
    tokio_test::assert_ok!(config.validate());
    assert_eq!(config.options.workers, 8);
    assert_eq!(config.options.shards, Some(3));
    assert_eq!(config.options.page_size, 5000);
    assert_eq!(config.target.username.as_deref(), Some("elastic"));
}

#[test]
fn test_config_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    let result = MigrationConfig::from_file(&dir.path().join("nope.yaml"));
    tokio_test::assert_err!(&result);
    assert!(matches!(result, Err(Error::Io(_))));
}
