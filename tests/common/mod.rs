#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use idxkeeper::alert::AlertSink;
use idxkeeper::cluster::ClusterClient;
use idxkeeper::es_http::EsHttp;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Client against a mock server, without HTTP-level retries.
pub fn client(server: &MockServer) -> ClusterClient {
    let http = EsHttp::new(server.uri(), "", "", Duration::from_secs(5), false)
        .unwrap()
        .with_retry(1, Duration::from_millis(1));
    ClusterClient::new(http)
}

/// Replies with each template in turn, repeating the last one.
pub struct Sequence {
    responses: Vec<ResponseTemplate>,
    next: AtomicUsize,
}

impl Sequence {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        assert!(!responses.is_empty());
        Self {
            responses,
            next: AtomicUsize::new(0),
        }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        self.responses[i.min(self.responses.len() - 1)].clone()
    }
}

pub fn snapshot_body(name: &str, state: &str, indices: &[&str], start_ms: i64) -> Value {
    json!({
        "snapshot": name,
        "state": state,
        "indices": indices,
        "start_time_in_millis": start_ms,
    })
}

pub fn snapshots_response(snapshots: Vec<Value>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "snapshots": snapshots }))
}

pub fn cat_index(name: &str, rep: u32, size: u64) -> Value {
    json!({
        "index": name,
        "rep": rep.to_string(),
        "store.size": size.to_string(),
        "creation.date": "1704067200000",
    })
}

/// No running snapshots and no snapshot tasks.
pub async fn mount_idle_cluster(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/_snapshot/_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "snapshots": [] })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_cat/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

/// Method and path of every request the server saw, in arrival order.
pub async fn request_log(server: &MockServer) -> Vec<(String, String)> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|r| (r.method.to_string(), r.url.path().to_string()))
        .collect()
}

#[derive(Default)]
pub struct RecordingAlerts {
    pub snapshot_failures: Mutex<Vec<(String, String)>>,
    pub aborts: Mutex<Vec<String>>,
    pub missing: Mutex<Vec<Vec<String>>>,
}

impl AlertSink for RecordingAlerts {
    async fn snapshot_failed(&self, snapshot: &str, indices: &str) -> Result<()> {
        self.snapshot_failures
            .lock()
            .unwrap()
            .push((snapshot.to_string(), indices.to_string()));
        Ok(())
    }

    async fn retention_aborted(&self, reason: &str) -> Result<()> {
        self.aborts.lock().unwrap().push(reason.to_string());
        Ok(())
    }

    async fn missing_snapshots(&self, indices: &[String]) -> Result<()> {
        self.missing.lock().unwrap().push(indices.to_vec());
        Ok(())
    }
}
