//! HTTP front end.
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /write` | Prometheus remote write |
//! | `GET /healthz` | store connectivity |
//! | `GET /<telemetry>` | Prometheus exposition of the adapter registry |
//! | `GET, PUT /admin/leader` | external leadership decision |
//!
//! Every route feeds its latency into `http_request_duration_ms{path}`.

mod handlers;
use handlers::*;

#[cfg(test)]
mod server_test;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use prometheus::Registry;
use tokio::sync::watch;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::constants::ADMIN_PATH;
use crate::constants::HEALTH_PATH;
use crate::constants::LEADER_PATH;
use crate::constants::WRITE_PATH;
use crate::AdapterMetrics;
use crate::Error;
use crate::ExternalDecision;
use crate::HealthCheck;
use crate::Result;
use crate::WriteCoordinator;
use crate::Writer;

/// Everything the handlers share
pub struct AppState {
    pub coordinator: WriteCoordinator,
    pub writer: Arc<dyn Writer>,
    pub health: Arc<dyn HealthCheck>,
    pub metrics: AdapterMetrics,
    pub registry: Registry,
    /// Present only with the external-decision backend
    pub external: Option<Arc<ExternalDecision>>,
}

fn with_state(state: Arc<AppState>) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Observes the request latency in milliseconds under `path`.
fn timed(
    metrics: &AdapterMetrics,
    path: &str,
) -> warp::log::Log<impl Fn(warp::log::Info<'_>) + Clone + Send + Sync> {
    let histogram = metrics.http_request_duration.with_label_values(&[path]);
    warp::log::custom(move |info: warp::log::Info<'_>| {
        histogram.observe(info.elapsed().as_secs_f64() * 1000.0);
    })
}

pub fn routes(
    state: Arc<AppState>,
    telemetry_segment: &str,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    // Path before method: an unknown path must reject with 404, not 405
    let write = warp::path(WRITE_PATH)
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::bytes())
        .and(with_state(state.clone()))
        .and_then(write_handler)
        .with(timed(&state.metrics, &format!("/{WRITE_PATH}")));

    let health = warp::path(HEALTH_PATH)
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(health_handler)
        .with(timed(&state.metrics, &format!("/{HEALTH_PATH}")));

    let telemetry = warp::path(telemetry_segment.to_string())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(metrics_handler)
        .with(timed(&state.metrics, &format!("/{telemetry_segment}")));

    let get_leader = warp::get().and(with_state(state.clone())).and_then(get_leader_handler);
    let put_leader = warp::put()
        .and(warp::body::bytes())
        .and(with_state(state.clone()))
        .and_then(put_leader_handler);
    let leader = warp::path(ADMIN_PATH)
        .and(warp::path(LEADER_PATH))
        .and(warp::path::end())
        .and(get_leader.or(put_leader))
        .with(timed(&state.metrics, &format!("/{ADMIN_PATH}/{LEADER_PATH}")));

    write.or(health).or(telemetry).or(leader)
}

/// Binds `addr` and serves until `shutdown` fires.
pub async fn serve(
    state: Arc<AppState>,
    addr: SocketAddr,
    telemetry_segment: &str,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    let (bound, server) = warp::serve(routes(state, telemetry_segment))
        .try_bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown.changed().await;
        })
        .map_err(|e| Error::Fatal(format!("failed to bind {addr}: {e}")))?;

    info!("Listening on {}", bound);
    server.await;
    info!("HTTP server stopped");
    Ok(())
}
