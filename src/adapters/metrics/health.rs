//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7 for container
//! health checks. Readiness depends on how many stream pollers are
//! still running.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Shared health state updated by the stream supervisor.
#[derive(Debug, Default)]
pub struct HealthState {
    /// Pollers currently running.
    running_streams: AtomicUsize,
}

impl HealthState {
    /// Create a new health state with no streams running.
    pub fn new() -> Self {
        Self::default()
    }

    /// A poller started.
    pub fn stream_started(&self) {
        self.running_streams.fetch_add(1, Ordering::Relaxed);
    }

    /// A poller stopped for good.
    pub fn stream_stopped(&self) {
        let _ = self.running_streams.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |n| n.checked_sub(1),
        );
    }

    pub fn running_streams(&self) -> usize {
        self.running_streams.load(Ordering::Relaxed)
    }

    /// Ready while at least one stream is still being polled.
    pub fn is_ready(&self) -> bool {
        self.running_streams() > 0
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Health state shared with the supervisor.
    state: Arc<HealthState>,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub const fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Run the health check server until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 while any stream poller is running.
    async fn readiness(
        State(state): State<Arc<HealthState>>,
    ) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_tracks_running_streams() {
        let state = HealthState::new();
        assert!(!state.is_ready());
        state.stream_started();
        state.stream_started();
        state.stream_stopped();
        assert!(state.is_ready());
        state.stream_stopped();
        assert!(!state.is_ready());
        state.stream_stopped();
        assert_eq!(state.running_streams(), 0);
    }
}
