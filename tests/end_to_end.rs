use async_trait::async_trait;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use gpx::nvidia::{DeviceProbe, DeviceReading};
use gpx::poller::{self, PollOutcome, PollStatus, Poller, WatchSink};
use gpx::sampler::{Sampler, SamplerSettings, SharedTelemetry};
use gpx::{ProbeError, SnapshotSource, TelemetryClient, TelemetrySnapshot, TransportError};

/// Serves `response` for `POST /`. The `Json` extractor rejects requests that
/// are not `application/json`, and the body must be an empty object.
async fn fixture(response: Value) -> String {
    let app = Router::new().route(
        "/",
        post(move |Json(body): Json<Value>| {
            let response = response.clone();
            async move {
                assert_eq!(body, json!({}));
                Json(response)
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    url
}

async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    drop(listener);
    url
}

fn rtx_response() -> Value {
    json!({
        "errors": [],
        "data": {
            "0": {
                "id": "0",
                "name": "RTX",
                "engine_usage_timeseries": [10, 20, 30],
                "memory_usage_timeseries": [5, 6, 7]
            }
        }
    })
}

#[tokio::test]
async fn healthy_response_renders_one_dataset_per_chart() {
    let client = TelemetryClient::new(&fixture(rtx_response()).await, None).unwrap();
    let (sink, feed) = WatchSink::channel();
    let mut poller = Poller::new(client, sink, Duration::from_millis(100));

    let outcome = poller.poll_once().await;
    assert!(matches!(outcome, PollOutcome::Fresh(_)));

    let frame = feed.frames.borrow().clone().unwrap();
    assert_eq!(frame.engine.datasets.len(), 1);
    assert_eq!(frame.engine.datasets[0].label, "[ 0 ] RTX");
    assert_eq!(frame.engine.datasets[0].data, vec![10.0, 20.0, 30.0]);
    assert_eq!(frame.engine.datasets[0].border_width, 2);
    assert_eq!(frame.memory.datasets[0].data, vec![5.0, 6.0, 7.0]);
    assert_eq!(frame.engine.labels.len(), 3);
}

#[tokio::test]
async fn server_reported_errors_do_not_block_rendering() {
    let mut response = rtx_response();
    response["errors"] = json!(["nvidia-smi timed out"]);
    let client = TelemetryClient::new(&fixture(response).await, None).unwrap();
    let (sink, feed) = WatchSink::channel();
    let mut poller = Poller::new(client, sink, Duration::from_millis(100));

    let outcome = poller.poll_once().await;

    assert!(matches!(outcome, PollOutcome::Degraded { .. }));
    assert_eq!(
        feed.frames.borrow().as_ref().unwrap().engine.datasets[0].label,
        "[ 0 ] RTX"
    );
    match &*feed.status.borrow() {
        PollStatus::ServerErrors { errors, .. } => {
            assert_eq!(errors, &vec!["nvidia-smi timed out".to_string()])
        }
        other => panic!("unexpected status {:?}", other),
    };
}

/// Talks to a live fixture until `down` is set, then to a closed port.
struct FlakySource {
    live: TelemetryClient,
    dead: TelemetryClient,
    down: AtomicBool,
}

#[async_trait]
impl SnapshotSource for FlakySource {
    async fn fetch_snapshot(&self) -> Result<TelemetrySnapshot, TransportError> {
        if self.down.load(Ordering::SeqCst) {
            self.dead.fetch_snapshot().await
        } else {
            self.live.fetch_snapshot().await
        }
    }
}

#[tokio::test]
async fn lost_connection_keeps_last_good_charts() {
    let source = FlakySource {
        live: TelemetryClient::new(&fixture(rtx_response()).await, None).unwrap(),
        dead: TelemetryClient::new(&dead_endpoint().await, None).unwrap(),
        down: AtomicBool::new(false),
    };
    let (sink, feed) = WatchSink::channel();
    let mut poller = Poller::new(source, sink, Duration::from_millis(100));

    poller.poll_once().await;
    let before = feed.frames.borrow().clone().unwrap();

    poller.source().down.store(true, Ordering::SeqCst);
    let outcome = poller.poll_once().await;

    assert!(matches!(outcome, PollOutcome::Failed(TransportError::Connect(_))));
    assert_eq!(feed.frames.borrow().as_ref().unwrap(), &before);
    assert!(matches!(
        *feed.status.borrow(),
        PollStatus::Unreachable { .. }
    ));
}

#[tokio::test]
async fn loop_keeps_retrying_an_unreachable_endpoint() {
    let client = TelemetryClient::new(&dead_endpoint().await, None).unwrap();
    let (sink, mut feed) = WatchSink::channel();
    let cancel = CancellationToken::new();
    let handle = poller::spawn(
        Poller::new(client, sink, Duration::from_millis(20)),
        Duration::ZERO,
        cancel.clone(),
    );

    for _ in 0..3 {
        tokio::time::timeout(Duration::from_secs(5), feed.status.changed())
            .await
            .expect("poll loop stalled")
            .unwrap();
    }
    cancel.cancel();
    let poller = handle.await.unwrap();

    assert!(poller.cycles() >= 3);
    assert!(feed.frames.borrow().is_none());
}

struct FixedProbe(Vec<DeviceReading>);

#[async_trait]
impl DeviceProbe for FixedProbe {
    async fn read(&self) -> Result<Vec<DeviceReading>, ProbeError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn dashboard_reads_the_bundled_server() {
    let probe = FixedProbe(vec![
        DeviceReading {
            index: 0,
            name: "RTX 4090".to_string(),
            engine_pct: 80.0,
            memory_pct: 40.0,
            memory_total_mb: 24564.0,
            driver: "550.54".to_string(),
        },
        DeviceReading {
            index: 1,
            name: "RTX 3060".to_string(),
            engine_pct: 20.0,
            memory_pct: 10.0,
            memory_total_mb: 12288.0,
            driver: "550.54".to_string(),
        },
    ]);
    let state = SharedTelemetry::default();
    let settings = SamplerSettings {
        sample_rate_hz: 10.0,
        max_aggregation_length: 5,
        smoothing: 0.0,
    };
    let mut sampler = Sampler::new(probe, settings, state.clone());
    sampler.read_all().await;
    sampler.read_all().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    let cancel = CancellationToken::new();
    let server = tokio::spawn(gpx::server::serve(listener, state, cancel.clone()));

    let client = TelemetryClient::new(&url, Some(Duration::from_secs(5))).unwrap();
    let (sink, feed) = WatchSink::channel();
    let mut poller = Poller::new(client, sink, Duration::from_millis(100));
    let outcome = poller.poll_once().await;

    assert!(matches!(outcome, PollOutcome::Fresh(_)));
    let frame = feed.frames.borrow().clone().unwrap();
    let labels: Vec<&str> = frame.engine.datasets.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["[ 0 ] RTX 4090", "[ 1 ] RTX 3060"]);
    assert_eq!(frame.engine.datasets[0].data, vec![0.0, 0.0, 0.0, 80.0, 80.0]);
    assert_eq!(frame.memory.datasets[1].data, vec![0.0, 0.0, 0.0, 10.0, 10.0]);
    assert_eq!(frame.engine.labels, vec![0, 1, 2, 3, 4]);

    drop(poller);
    cancel.cancel();
    server.await.unwrap().unwrap();
}
