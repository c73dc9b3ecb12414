//! Prometheus scrape endpoint bootstrap

use std::net::SocketAddr;
use std::time::Duration;

use axum::{extract::State, routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use super::registry::{MetricError, MetricRegistry};
use super::view::View;

/// Interval at which aggregated state is flushed by the recorder's upkeep
/// task. Process-wide and fixed.
const UPKEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Supervision handle for the background metrics listener.
///
/// Dropping the handle detaches the listener; it keeps serving for the rest
/// of the process lifetime.
#[derive(Debug)]
pub struct MetricsServer {
    local_addr: SocketAddr,
    task: JoinHandle<Result<(), std::io::Error>>,
}

impl MetricsServer {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolves only if the listener stops.
    ///
    /// Metrics visibility is considered essential; the owning process decides
    /// what to do, and the demo service treats any resolution as fatal.
    pub async fn closed(self) -> MetricError {
        match self.task.await {
            Ok(Ok(())) => MetricError::ListenerStopped,
            Ok(Err(e)) => MetricError::Listener(e),
            Err(join_error) => MetricError::Listener(std::io::Error::other(join_error)),
        }
    }
}

/// Install the Prometheus recorder and serve `GET /metrics` on `addr`.
///
/// Registers any pending bulk views, replays every registered view's
/// description and unit to the fresh recorder, then spawns the listener as a
/// background task supervised through the returned [`MetricsServer`].
///
/// Fails if a recorder is already installed in this process, if any pending
/// view collides, or if the address cannot be bound.
pub async fn serve_metrics(
    registry: &MetricRegistry,
    addr: SocketAddr,
    pending_views: impl IntoIterator<Item = View>,
) -> Result<MetricsServer, MetricError> {
    let handle = PrometheusBuilder::new()
        .upkeep_timeout(UPKEEP_INTERVAL)
        .install_recorder()
        .map_err(|e| MetricError::RecorderInstall(e.to_string()))?;

    registry.register_views(pending_views)?;

    // Announcements made before the recorder existed went nowhere.
    registry.announce_all();

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| MetricError::Bind { addr, source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| MetricError::Bind { addr, source })?;

    let app = metrics_router(handle);
    let task = tokio::spawn(async move { axum::serve(listener, app).await });

    info!(
        "Metrics endpoint serving on {} ({} registered views)",
        local_addr,
        registry.len()
    );

    Ok(MetricsServer { local_addr, task })
}

fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(handle)
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
