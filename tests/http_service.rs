#![cfg(feature = "server")]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::NaiveDate;
use tokio::net::TcpListener;

use runstat::codec::{ciphertext_from_base64, decrypt_decode};
use runstat::keys::{generate_key_blobs, KeyStore, MemoryStore};
use runstat::params::SchemeParams;
use runstat::scheme::sim::{SimPublicKey, SimScheme, SimSecretKey};
use runstat::scheme::ClientScheme;
use runstat::service::{
    router, AppState, ErrorResponse, HealthResponse, MergeRequest, MergeResponse, ParamsResponse,
    StatsRequest, StatsResponse,
};
use runstat::telemetry::{CalendarBuckets, GeoSample, RunTrace};
use runstat::{RunBlobs, RunReport};

const KEY_ID: &str = "http-runner";

struct TestClient {
    scheme: SimScheme,
    sk: SimSecretKey,
    pk: SimPublicKey,
}

impl TestClient {
    fn new(seed: u64) -> Self {
        let scheme = SimScheme::with_seed(SchemeParams::slots_4096(), seed);
        let (sk, pk) = scheme.keygen().expect("keygen should succeed");
        Self { scheme, sk, pk }
    }

    fn run(&self) -> RunBlobs {
        let samples = (0..6)
            .map(|i| GeoSample {
                lat: 40.0 + 0.002 * i as f64,
                lon: -73.0,
                timestamp: 2.0 * i as f64,
                altitude: 20.0 + i as f64,
            })
            .collect();
        let trace = RunTrace {
            date: date(),
            samples,
            motion: Vec::new(),
        };
        trace
            .encrypt(&self.scheme, &self.pk)
            .expect("encrypt should succeed")
    }
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date")
}

/// Serve the router on an ephemeral port; the client's keys are uploaded
async fn spawn_server(client: &TestClient) -> (String, tokio::task::JoinHandle<()>) {
    let remote = MemoryStore::new();
    let cache = tempfile::tempdir().expect("tempdir");
    let store = KeyStore::new(cache.into_path(), Box::new(remote));
    let blobs = generate_key_blobs(&client.scheme, &client.sk).expect("key blobs");
    store.upload(KEY_ID, &blobs).expect("upload should succeed");

    let evaluator = Arc::new(SimScheme::with_seed(SchemeParams::slots_4096(), 99));
    let state = Arc::new(AppState::new(evaluator, Arc::new(store), 2).expect("state"));
    let app = router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr: SocketAddr = listener.local_addr().expect("local addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server should run");
    });

    (format!("http://{}", addr), handle)
}

async fn post_stats(
    http: &reqwest::Client,
    base_url: &str,
    key_id: &str,
    run: RunBlobs,
) -> reqwest::Response {
    http.post(format!("{}/runs/stats", base_url))
        .json(&StatsRequest {
            key_id: key_id.to_string(),
            run,
        })
        .send()
        .await
        .expect("request should succeed")
}

#[tokio::test]
async fn test_health_and_params() {
    let client = TestClient::new(1);
    let (base_url, server_handle) = spawn_server(&client).await;
    let http = reqwest::Client::new();

    let health: HealthResponse = http
        .get(format!("{}/health", base_url))
        .send()
        .await
        .expect("request should succeed")
        .json()
        .await
        .expect("parse health");
    assert_eq!(health.status, "ok");

    let params: ParamsResponse = http
        .get(format!("{}/params", base_url))
        .send()
        .await
        .expect("request should succeed")
        .json()
        .await
        .expect("parse params");
    assert_eq!(params.slot_count, 4096);
    assert_eq!(params.ring_dim, 8192);
    assert_eq!(params.max_depth, 4);

    server_handle.abort();
}

#[tokio::test]
async fn test_stats_then_merge() {
    let client = TestClient::new(2);
    let (base_url, server_handle) = spawn_server(&client).await;
    let http = reqwest::Client::new();

    let resp = post_stats(&http, &base_url, KEY_ID, client.run()).await;
    assert!(resp.status().is_success());
    let body: StatsResponse = resp.json().await.expect("parse stats response");

    let report =
        RunReport::decrypt(&client.scheme, &client.sk, &body.derived).expect("decrypt report");
    assert!((report.total_time_secs - 10.0).abs() < 1e-3);
    assert!(report.total_distance_km > 1.0 && report.total_distance_km < 1.2);
    assert_eq!(report.date, Some(date()));
    assert!((report.elevation_gain_m - 5.0).abs() < 1e-3);

    let merged: MergeResponse = http
        .post(format!("{}/summaries/merge", base_url))
        .json(&MergeRequest {
            new_summary: body.derived.summary.clone(),
            stored_summary: body.derived.summary.clone(),
        })
        .send()
        .await
        .expect("request should succeed")
        .json()
        .await
        .expect("parse merge response");

    let ct = ciphertext_from_base64(&client.scheme, &merged.summary, "summary")
        .expect("merged summary loads");
    let slots = decrypt_decode(&client.scheme, &ct, &client.sk).expect("decrypt summary");
    for b in CalendarBuckets::indices(date()) {
        assert!((slots[b] - 20.0).abs() < 1e-3);
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_caller_errors() {
    let client = TestClient::new(3);
    let (base_url, server_handle) = spawn_server(&client).await;
    let http = reqwest::Client::new();

    // Malformed ciphertext
    let mut run = client.run();
    run.position = "%%% not base64 %%%".to_string();
    let resp = post_stats(&http, &base_url, KEY_ID, run).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: ErrorResponse = resp.json().await.expect("parse error response");
    assert!(err.error.contains("position"));

    // Keys never uploaded
    let resp = post_stats(&http, &base_url, "unknown-key", client.run()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Summaries from two key sets
    let other = TestClient::new(4);
    let ours: StatsResponse = post_stats(&http, &base_url, KEY_ID, client.run())
        .await
        .json()
        .await
        .expect("parse stats response");
    let foreign = other.run();
    let resp = http
        .post(format!("{}/summaries/merge", base_url))
        .json(&MergeRequest {
            new_summary: foreign.mask,
            stored_summary: ours.derived.summary,
        })
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    server_handle.abort();
}

#[tokio::test]
async fn test_delete_key_revokes() {
    let client = TestClient::new(5);
    let (base_url, server_handle) = spawn_server(&client).await;
    let http = reqwest::Client::new();

    let resp = post_stats(&http, &base_url, KEY_ID, client.run()).await;
    assert!(resp.status().is_success());

    for _ in 0..2 {
        let resp = http
            .delete(format!("{}/keys/{}", base_url, KEY_ID))
            .send()
            .await
            .expect("request should succeed");
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    // Neither the cache nor the remote still holds the key set
    let resp = post_stats(&http, &base_url, KEY_ID, client.run()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = http
        .delete(format!("{}/keys/{}", base_url, "bad.key"))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    server_handle.abort();
}
