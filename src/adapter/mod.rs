//! The running adapter: HTTP front end plus its periodic tasks.

mod builder;
pub use builder::*;


use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;

use crate::server;
use crate::AppState;
use crate::PgSessionSource;
use crate::Result;

pub struct Adapter {
    pub(crate) state: Arc<AppState>,
    pub(crate) source: Arc<PgSessionSource>,
    pub(crate) listen_address: SocketAddr,
    pub(crate) telemetry_segment: String,
    /// Throughput sampler and election tasks
    pub(crate) handles: Vec<JoinHandle<()>>,
    pub(crate) shutdown_signal: watch::Receiver<()>,
}

impl Adapter {
    /// Serves until the shutdown signal fires, then waits for the periodic
    /// tasks (the election task resigns on its way out) and closes the pool.
    pub async fn run(self) -> Result<()> {
        let served = server::serve(
            self.state.clone(),
            self.listen_address,
            &self.telemetry_segment,
            self.shutdown_signal.clone(),
        )
        .await;

        if served.is_err() {
            // Nothing signals the tasks when the listener never came up
            self.handles.iter().for_each(JoinHandle::abort);
        } else {
            for result in join_all(self.handles).await {
                if let Err(e) = result {
                    error!("background task ended abnormally: {:?}", e);
                }
            }
        }
        self.source.close().await;
        info!("Adapter stopped");
        served
    }
}
