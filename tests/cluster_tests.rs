//! Cluster client and HTTP retry behaviour.

mod common;

use std::time::Duration;

use common::{cat_index, client, snapshot_body, snapshots_response, Sequence};
use idxkeeper::cluster::ClusterClient;
use idxkeeper::es_http::EsHttp;
use idxkeeper::types::SnapshotState;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn delete_indices_batches_and_reports_failed_batch() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/idx-"))
        .respond_with(Sequence::new(vec![
            ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })),
            ResponseTemplate::new(500),
            ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })),
        ]))
        .expect(3)
        .mount(&server)
        .await;

    let names: Vec<String> = (0..25).map(|i| format!("idx-{i:02}")).collect();
    let report = client(&server).delete_indices(&names).await;

    assert_eq!(report.deleted.len(), 15);
    assert_eq!(report.failed, names[10..20].to_vec());
    assert_eq!(report.deleted[..10], names[..10]);
}

#[tokio::test]
async fn utilization_is_mean_over_data_nodes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_cat/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "hot-1", "node.role": "hims", "disk.used_percent": "80.00" },
            { "name": "warm-1", "node.role": "w", "disk.used_percent": "60.00" },
            { "name": "master-1", "node.role": "m", "disk.used_percent": "2.00" },
            { "name": "coord-1", "node.role": "-", "disk.used_percent": "1.00" },
        ])))
        .mount(&server)
        .await;

    let util = client(&server).disk_utilization().await.unwrap();
    assert!((util - 70.0).abs() < 1e-9);
}

#[tokio::test]
async fn utilization_without_data_nodes_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_cat/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "master-1", "node.role": "m", "disk.used_percent": "2.00" },
        ])))
        .mount(&server)
        .await;

    assert!(client(&server).disk_utilization().await.is_err());
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .respond_with(Sequence::new(vec![
            ResponseTemplate::new(503),
            ResponseTemplate::new(200).set_body_json(json!({ "number_of_data_nodes": 4 })),
        ]))
        .expect(2)
        .mount(&server)
        .await;

    let http = EsHttp::new(server.uri(), "", "", Duration::from_secs(5), false)
        .unwrap()
        .with_retry(3, Duration::from_millis(1));
    let count = ClusterClient::new(http).data_node_count().await.unwrap();
    assert_eq!(count, 4);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let http = EsHttp::new(server.uri(), "", "", Duration::from_secs(5), false)
        .unwrap()
        .with_retry(3, Duration::from_millis(1));
    let err = ClusterClient::new(http).data_node_count().await.unwrap_err();
    assert!(format!("{err:#}").contains("403"));
}

#[tokio::test]
async fn basic_auth_is_sent_when_user_configured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_cluster/health"))
        .and(header_exists("authorization"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "number_of_data_nodes": 1 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let http = EsHttp::new(
        format!("{}/", server.uri()),
        "elastic",
        "secret",
        Duration::from_secs(5),
        false,
    )
    .unwrap();
    assert_eq!(ClusterClient::new(http).data_node_count().await.unwrap(), 1);
}

#[tokio::test]
async fn missing_repository_lists_no_snapshots() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/_snapshot/absent/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let snaps = client(&server).list_snapshots("absent", "*").await.unwrap();
    assert!(snaps.is_empty());
}

#[tokio::test]
async fn snapshot_states_are_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/_snapshot/repo/"))
        .respond_with(snapshots_response(vec![
            snapshot_body("a-2024.01.01", "SUCCESS", &["a-2024.01.01"], 1),
            snapshot_body("b-2024.01.01", "PARTIAL", &[], 2),
            snapshot_body("c-2024.01.01", "INCOMPATIBLE", &[], 3),
        ]))
        .mount(&server)
        .await;

    let snaps = client(&server).list_snapshots("repo", "*").await.unwrap();
    let states: Vec<SnapshotState> = snaps.iter().map(|s| s.state).collect();
    assert_eq!(
        states,
        vec![SnapshotState::Success, SnapshotState::Partial, SnapshotState::Unknown]
    );
    assert!(snaps[0].is_valid_for("a-2024.01.01"));
    assert!(SnapshotState::Unknown.needs_cleanup());
}

#[tokio::test]
async fn cat_indices_rows_are_typed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/_cat/indices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            cat_index("app-2024.01.01", 2, 12_345),
            { "index": "closed-2024.01.01" },
        ])))
        .mount(&server)
        .await;

    let indices = client(&server).list_indices("*").await.unwrap();
    assert_eq!(indices.len(), 2);
    assert_eq!(indices[0].replica_count, 2);
    assert_eq!(indices[0].size_bytes, 12_345);
    assert_eq!(indices[0].creation_ms, 1_704_067_200_000);
    assert_eq!(indices[1].replica_count, 0);
}
