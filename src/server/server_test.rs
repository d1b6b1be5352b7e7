use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prometheus::Registry;
use prost::Message;
use tokio::time::sleep;
use tokio::time::timeout;

use super::routes;
use super::AppState;
use crate::proto::prompb::Label;
use crate::proto::prompb::Sample as WireSample;
use crate::proto::prompb::TimeSeries;
use crate::proto::prompb::WriteRequest;
use crate::AdapterMetrics;
use crate::Elector;
use crate::ExternalDecision;
use crate::LivenessTracker;
use crate::MockHealthCheck;
use crate::MockWriter;
use crate::Sample;
use crate::StorageError;
use crate::ThroughputCalc;
use crate::WriteCoordinator;
use crate::WritePhase;
use crate::Writer;

const REMOTE: &str = "PostgreSQL";

struct TestContext {
    state: Arc<AppState>,
    metrics: AdapterMetrics,
}

fn setup(
    writer: MockWriter,
    health: MockHealthCheck,
    external: Option<Arc<ExternalDecision>>,
) -> TestContext {
    setup_with(Arc::new(writer), health, external)
}

fn setup_with(
    writer: Arc<dyn Writer>,
    health: MockHealthCheck,
    external: Option<Arc<ExternalDecision>>,
) -> TestContext {
    let registry = Registry::new();
    let metrics = AdapterMetrics::registered(&registry).unwrap();
    let elector = external.clone().map(|e| Elector::new(e));
    let coordinator = WriteCoordinator::new(
        elector,
        Arc::new(LivenessTracker::new()),
        metrics.clone(),
        ThroughputCalc::new(Duration::from_secs(1)),
    );
    let state = Arc::new(AppState {
        coordinator,
        writer,
        health: Arc::new(health),
        metrics: metrics.clone(),
        registry,
        external,
    });
    TestContext { state, metrics }
}

fn writer_expecting(times: usize) -> MockWriter {
    let mut writer = MockWriter::new();
    writer.expect_name().returning(|| REMOTE.to_string());
    writer.expect_write().times(times).returning(|_| Ok(()));
    writer
}

/// Writer that takes 800ms per batch
#[derive(Default)]
struct SlowWriter {
    started: AtomicUsize,
    finished: AtomicUsize,
}

#[async_trait]
impl Writer for SlowWriter {
    async fn write(
        &self,
        _samples: &[Sample],
    ) -> crate::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(800)).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> String {
        REMOTE.to_string()
    }
}

fn up_body() -> Vec<u8> {
    let request = WriteRequest {
        timeseries: vec![TimeSeries {
            labels: vec![
                Label {
                    name: "__name__".into(),
                    value: "up".into(),
                },
                Label {
                    name: "job".into(),
                    value: "a".into(),
                },
            ],
            samples: vec![
                WireSample {
                    value: 1.0,
                    timestamp: 1000,
                },
                WireSample {
                    value: 0.0,
                    timestamp: 2000,
                },
            ],
        }],
    };
    snap::raw::Encoder::new()
        .compress_vec(&request.encode_to_vec())
        .unwrap()
}

#[tokio::test]
async fn test_write_route_hands_batch_to_writer() {
    let ctx = setup(writer_expecting(1), MockHealthCheck::new(), None);
    let filter = routes(ctx.state.clone(), "metrics");

    let response = warp::test::request()
        .method("POST")
        .path("/write")
        .body(up_body())
        .reply(&filter)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(ctx.metrics.received_samples.get(), 2.0);
    assert_eq!(ctx.metrics.sent_samples.with_label_values(&[REMOTE]).get(), 2.0);
    assert_eq!(
        ctx.metrics
            .http_request_duration
            .with_label_values(&["/write"])
            .get_sample_count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_batch_write_completes_after_client_goes_away() {
    let writer = Arc::new(SlowWriter::default());
    let ctx = setup_with(writer.clone(), MockHealthCheck::new(), None);
    let filter = routes(ctx.state.clone(), "metrics");

    let request = warp::test::request()
        .method("POST")
        .path("/write")
        .body(up_body())
        .reply(&filter);
    // Client gives up while the batch is being written
    assert!(timeout(Duration::from_millis(200), request).await.is_err());
    assert_eq!(writer.started.load(Ordering::SeqCst), 1);
    assert_eq!(writer.finished.load(Ordering::SeqCst), 0);

    sleep(Duration::from_secs(1)).await;

    assert_eq!(writer.finished.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.metrics.sent_samples.with_label_values(&[REMOTE]).get(), 2.0);
    assert_eq!(ctx.metrics.failed_samples.with_label_values(&[REMOTE]).get(), 0.0);
}

#[tokio::test]
async fn test_undecodable_write_is_bad_request() {
    let ctx = setup(writer_expecting(0), MockHealthCheck::new(), None);
    let filter = routes(ctx.state.clone(), "metrics");

    let response = warp::test::request()
        .method("POST")
        .path("/write")
        .body("not snappy at all")
        .reply(&filter)
        .await;

    assert_eq!(response.status(), 400);
    assert_eq!(ctx.metrics.received_samples.get(), 0.0);
}

#[tokio::test]
async fn test_storage_failure_is_still_acknowledged() {
    let mut writer = MockWriter::new();
    writer.expect_name().returning(|| REMOTE.to_string());
    writer.expect_write().times(1).returning(|_| {
        Err(StorageError::Backend {
            phase: WritePhase::InsertLabels,
            message: "unique violation".into(),
        }
        .into())
    });
    let ctx = setup(writer, MockHealthCheck::new(), None);
    let filter = routes(ctx.state.clone(), "metrics");

    let response = warp::test::request()
        .method("POST")
        .path("/write")
        .body(up_body())
        .reply(&filter)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(ctx.metrics.failed_samples.with_label_values(&[REMOTE]).get(), 2.0);
}

#[tokio::test]
async fn test_follower_acknowledges_without_writing() {
    let external = Arc::new(ExternalDecision::new());
    let ctx = setup(writer_expecting(0), MockHealthCheck::new(), Some(external));
    let filter = routes(ctx.state.clone(), "metrics");

    let response = warp::test::request()
        .method("POST")
        .path("/write")
        .body(up_body())
        .reply(&filter)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(ctx.metrics.received_samples.get(), 2.0);
    assert_eq!(ctx.metrics.sent_samples.with_label_values(&[REMOTE]).get(), 0.0);
    assert_eq!(ctx.metrics.failed_samples.with_label_values(&[REMOTE]).get(), 0.0);
}

#[tokio::test]
async fn test_health_route() {
    let mut health = MockHealthCheck::new();
    health.expect_health_check().times(1).returning(|| Ok(()));
    let ctx = setup(writer_expecting(0), health, None);
    let filter = routes(ctx.state.clone(), "metrics");

    let response = warp::test::request().path("/healthz").reply(&filter).await;
    assert_eq!(response.status(), 200);
    assert!(response.body().is_empty());
}

#[tokio::test]
async fn test_health_route_reports_failure() {
    let mut health = MockHealthCheck::new();
    health.expect_health_check().times(1).returning(|| {
        Err(StorageError::Backend {
            phase: WritePhase::Acquire,
            message: "connection refused".into(),
        }
        .into())
    });
    let ctx = setup(writer_expecting(0), health, None);
    let filter = routes(ctx.state.clone(), "metrics");

    let response = warp::test::request().path("/healthz").reply(&filter).await;
    assert_eq!(response.status(), 500);
    let body = String::from_utf8(response.body().to_vec()).unwrap();
    assert!(body.contains("connection refused"));
}

#[tokio::test]
async fn test_telemetry_route_uses_configured_path() {
    let ctx = setup(writer_expecting(1), MockHealthCheck::new(), None);
    let filter = routes(ctx.state.clone(), "telemetry");

    warp::test::request()
        .method("POST")
        .path("/write")
        .body(up_body())
        .reply(&filter)
        .await;
    let response = warp::test::request().path("/telemetry").reply(&filter).await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("Content-Type"),
        Some(&"text/plain; charset=utf-8".parse().unwrap())
    );
    let body = String::from_utf8(response.body().to_vec()).unwrap();
    assert!(body.contains("received_samples_total 2"));
    assert!(body.contains("http_request_duration_ms"));

    let response = warp::test::request().path("/metrics").reply(&filter).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_admin_leader_round_trip() {
    let external = Arc::new(ExternalDecision::new());
    let ctx = setup(writer_expecting(0), MockHealthCheck::new(), Some(external.clone()));
    let filter = routes(ctx.state.clone(), "metrics");

    let response = warp::test::request().path("/admin/leader").reply(&filter).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.body().as_ref(), b"false");

    let response = warp::test::request()
        .method("PUT")
        .path("/admin/leader")
        .body("true\n")
        .reply(&filter)
        .await;
    assert_eq!(response.status(), 200);
    assert!(external.leader());

    let response = warp::test::request().path("/admin/leader").reply(&filter).await;
    assert_eq!(response.body().as_ref(), b"true");
}

#[tokio::test]
async fn test_admin_leader_rejects_bad_body() {
    let external = Arc::new(ExternalDecision::new());
    let ctx = setup(writer_expecting(0), MockHealthCheck::new(), Some(external.clone()));
    let filter = routes(ctx.state.clone(), "metrics");

    let response = warp::test::request()
        .method("PUT")
        .path("/admin/leader")
        .body("maybe")
        .reply(&filter)
        .await;

    assert_eq!(response.status(), 400);
    assert!(!external.leader());
}

#[tokio::test]
async fn test_admin_leader_absent_without_external_backend() {
    let ctx = setup(writer_expecting(0), MockHealthCheck::new(), None);
    let filter = routes(ctx.state.clone(), "metrics");

    let response = warp::test::request().path("/admin/leader").reply(&filter).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let external = Arc::new(ExternalDecision::new());
    let ctx = setup(writer_expecting(0), MockHealthCheck::new(), Some(external));
    let filter = routes(ctx.state.clone(), "metrics");

    let response = warp::test::request().path("/nope").reply(&filter).await;
    assert_eq!(response.status(), 404);

    let response = warp::test::request().method("POST").path("/nope").reply(&filter).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_known_path_with_wrong_method_is_not_allowed() {
    let external = Arc::new(ExternalDecision::new());
    let ctx = setup(writer_expecting(0), MockHealthCheck::new(), Some(external));
    let filter = routes(ctx.state.clone(), "metrics");

    let response = warp::test::request().path("/write").reply(&filter).await;
    assert_eq!(response.status(), 405);

    let response = warp::test::request().method("DELETE").path("/admin/leader").reply(&filter).await;
    assert_eq!(response.status(), 405);
}
