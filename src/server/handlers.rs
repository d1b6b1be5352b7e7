use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;
use tracing::error;
use warp::http::StatusCode;
use warp::reply;
use warp::Rejection;
use warp::Reply;

use super::AppState;
use crate::decode_write_request;
use crate::encode_metrics;

pub(super) async fn write_handler(
    body: Bytes,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let request = match decode_write_request(&body) {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to decode write request: {}", e);
            return Ok(reply::with_status(e.to_string(), StatusCode::BAD_REQUEST));
        }
    };

    let samples = request.into_samples();
    state.metrics.received_samples.inc_by(samples.len() as f64);

    // Storage failures are logged and counted, the request still succeeds.
    // The write runs on its own task and finishes even if the client goes away.
    let task_state = state.clone();
    let write = tokio::spawn(async move {
        task_state.coordinator.handle_batch(task_state.writer.as_ref(), &samples).await;
    });
    if let Err(e) = write.await {
        error!("Batch write task ended abnormally: {}", e);
    }

    Ok(reply::with_status(String::new(), StatusCode::OK))
}

pub(super) async fn health_handler(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    match state.health.health_check().await {
        Ok(()) => Ok(reply::with_status(String::new(), StatusCode::OK)),
        Err(e) => Ok(reply::with_status(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)),
    }
}

pub(super) async fn metrics_handler(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    Ok(encode_metrics(&state.registry))
}

pub(super) async fn get_leader_handler(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    match &state.external {
        Some(external) => Ok(reply::with_status(external.leader().to_string(), StatusCode::OK)),
        None => Ok(reply::with_status(String::new(), StatusCode::NOT_FOUND)),
    }
}

pub(super) async fn put_leader_handler(
    body: Bytes,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let Some(external) = &state.external else {
        return Ok(reply::with_status(String::new(), StatusCode::NOT_FOUND));
    };

    let decision = std::str::from_utf8(&body)
        .ok()
        .and_then(|text| text.trim().parse::<bool>().ok());
    match decision {
        Some(leader) => {
            external.set_leader(leader);
            debug!(leader, "external leadership decision applied");
            Ok(reply::with_status(leader.to_string(), StatusCode::OK))
        }
        None => Ok(reply::with_status(
            "body must be `true` or `false`".to_string(),
            StatusCode::BAD_REQUEST,
        )),
    }
}
