//! Mock clusters shared by the integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use esmigrate::{EndpointConfig, MigrationConfig, MigrationOptions};

/// `n` hits in `index` with ids `start..start + n`.
pub fn hits(index: &str, start: usize, n: usize) -> Vec<Value> {
    (start..start + n)
        .map(|i| {
            json!({
                "_index": index,
                "_type": "event",
                "_id": i.to_string(),
                "_score": 0.0,
                "_source": {"seq": i, "message": format!("event number {}", i)}
            })
        })
        .collect()
}

pub fn scroll_page(scroll_id: &str, total: usize, hits: Vec<Value>) -> Value {
    json!({
        "_scroll_id": scroll_id,
        "took": 1,
        "timed_out": false,
        "_shards": {"total": 1, "successful": 1, "failed": 0},
        "hits": {"total": total, "max_score": 0.0, "hits": hits}
    })
}

/// Mounts the root and health endpoints.
pub async fn mount_cluster(server: &MockServer, version: &str, status: &str) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "node-1",
            "version": {"number": version}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"cluster_name": version, "status": status})),
        )
        .mount(server)
        .await;
}

/// Mounts a legacy scan scroll: an empty first page, then `pages`, then an
/// empty page.
pub async fn mount_legacy_scroll(server: &MockServer, index: &str, pages: Vec<Vec<Value>>) {
    let total: usize = pages.iter().map(Vec::len).sum();
    Mock::given(method("GET"))
        .and(path(format!("/{}/_search", index)))
        .and(query_param("search_type", "scan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(scroll_page("s0", total, vec![])))
        .mount(server)
        .await;

    let count = pages.len();
    for (i, hits) in pages.into_iter().enumerate() {
        Mock::given(method("GET"))
            .and(path("/_search/scroll"))
            .and(query_param("scroll_id", format!("s{}", i)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(scroll_page(&format!("s{}", i + 1), total, hits)),
            )
            .expect(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/_search/scroll"))
        .and(query_param("scroll_id", format!("s{}", count)))
        .respond_with(ResponseTemplate::new(200).set_body_json(scroll_page("end", total, vec![])))
        .expect(1)
        .mount(server)
        .await;
}

/// Mounts a 5.x scroll: `pages[0]` answers the plain (non-scan) open, the rest
/// are continued with the cursor in the query string.
pub async fn mount_current_scroll(server: &MockServer, index: &str, pages: Vec<Vec<Value>>) {
    let total: usize = pages.iter().map(Vec::len).sum();
    let mut pages = pages.into_iter();
    let first = pages.next().unwrap_or_default();
    Mock::given(method("GET"))
        .and(path(format!("/{}/_search", index)))
        .and(query_param_is_missing("search_type"))
        .respond_with(ResponseTemplate::new(200).set_body_json(scroll_page("c0", total, first)))
        .mount(server)
        .await;

    let mut i = 0;
    for hits in pages {
        Mock::given(method("GET"))
            .and(path("/_search/scroll"))
            .and(query_param("scroll_id", format!("c{}", i)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(scroll_page(&format!("c{}", i + 1), total, hits)),
            )
            .mount(server)
            .await;
        i += 1;
    }
    Mock::given(method("GET"))
        .and(path("/_search/scroll"))
        .and(query_param("scroll_id", format!("c{}", i)))
        .respond_with(ResponseTemplate::new(200).set_body_json(scroll_page("end", total, vec![])))
        .mount(server)
        .await;
}

/// Accepts every bulk request.
pub async fn mount_bulk_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"took": 1, "errors": false, "items": []})),
        )
        .mount(server)
        .await;
}

/// Bodies of every bulk request the server received.
pub async fn bulk_bodies(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == "/_bulk")
        .map(|r| String::from_utf8(r.body).unwrap())
        .collect()
}

/// `create` headers across all bulk bodies.
pub fn bulk_headers(bodies: &[String]) -> Vec<Value> {
    bodies
        .iter()
        .flat_map(|b| b.lines().step_by(2))
        .map(|line| serde_json::from_str::<Value>(line).unwrap()["create"].clone())
        .collect()
}

pub fn config(source: &MockServer, target: &MockServer, options: MigrationOptions) -> MigrationConfig {
    MigrationConfig {
        source: EndpointConfig::new(source.uri()),
        target: EndpointConfig::new(target.uri()),
        options: MigrationOptions {
            readiness_interval_secs: 1,
            readiness_timeout_secs: 30,
            ..options
        },
    }
}
