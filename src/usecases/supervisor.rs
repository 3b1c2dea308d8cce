//! Stream Supervisor - Lifecycle Management for Stream Pollers
//!
//! Spawns one poller per stream into a `JoinSet`, so every worker is
//! tracked and joined rather than left running in the background.
//! Each stream is its own failure domain: a poller that panics or
//! exits is logged and marked stopped for the rest of the process
//! lifetime, and the remaining streams keep running.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{error, info, instrument, warn};

use crate::adapters::metrics::{HealthState, MetricStore};
use crate::ports::event_source::EventSource;

use super::handlers::EventHandler;
use super::poller::{Poller, StreamStats};

/// What happened to the streams by the time `run` returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorReport {
  /// Streams that stopped before shutdown was requested.
  pub stopped_early: Vec<&'static str>,
  /// Whether every poller finished within the grace period.
  pub drained: bool,
}

/// Owns every stream poller and keeps the process alive.
pub struct StreamSupervisor {
  /// Pollers not yet started.
  pollers: Vec<Poller>,
  /// Shared metric store.
  store: Arc<MetricStore>,
  /// Readiness state for the health server.
  health: Arc<HealthState>,
  /// Shutdown broadcaster for the pollers only.
  shutdown_tx: broadcast::Sender<()>,
  /// How long to wait for pollers after shutdown.
  grace: Duration,
}

impl StreamSupervisor {
  /// Create a supervisor with no streams.
  ///
  /// The poller shutdown channel is private, so anything else the
  /// caller runs (HTTP servers) keeps serving until the caller stops it.
  pub fn new(store: Arc<MetricStore>, health: Arc<HealthState>, grace: Duration) -> Self {
    let (shutdown_tx, _) = broadcast::channel(1);
    Self {
      pollers: Vec::new(),
      store,
      health,
      shutdown_tx,
      grace,
    }
  }

  /// Register a (source, handler, interval) triple.
  pub fn add_stream(
    &mut self,
    source: Box<dyn EventSource>,
    handler: Arc<dyn EventHandler>,
    interval: Duration,
  ) -> Arc<StreamStats> {
    let poller = Poller::new(source, handler, Arc::clone(&self.store), interval);
    let stats = poller.stats();
    self.pollers.push(poller);
    stats
  }

  pub fn stream_count(&self) -> usize {
    self.pollers.len()
  }

  /// Start every poller and block until `shutdown` resolves.
  ///
  /// Pollers that die early are logged and not restarted. After
  /// shutdown the pollers are signalled and given `grace` to finish
  /// their current cycle; stragglers are aborted.
  #[instrument(skip_all, fields(streams = self.pollers.len()))]
  pub async fn run<F>(self, shutdown: F) -> SupervisorReport
  where
    F: Future<Output = ()>,
  {
    let Self {
      pollers,
      store,
      health,
      shutdown_tx,
      grace,
    } = self;

    let mut tasks = JoinSet::new();
    let mut streams: HashMap<Id, &'static str> = HashMap::with_capacity(pollers.len());

    for poller in pollers {
      let stream = poller.stream();
      let handle = tasks.spawn(poller.run(shutdown_tx.subscribe()));
      streams.insert(handle.id(), stream);
      store.set_stream_up(stream, true);
      health.stream_started();
    }

    info!(stream_count = tasks.len(), "Stream pollers spawned");

    let mut report = SupervisorReport::default();
    let mark_stopped = |id: Id| {
      let stream = streams.get(&id).copied().unwrap_or("unknown");
      store.set_stream_up(stream, false);
      health.stream_stopped();
      stream
    };

    tokio::pin!(shutdown);
    loop {
      tokio::select! {
        () = &mut shutdown => {
          info!("Shutdown requested, stopping stream pollers");
          break;
        }
        Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
          let (id, outcome) = split_join(joined);
          let stream = mark_stopped(id);
          match outcome {
            None => warn!(stream, "Stream poller exited unexpectedly, not restarting"),
            Some(e) => error!(stream, error = %e, "Stream poller crashed, not restarting"),
          }
          report.stopped_early.push(stream);
        }
      }
    }

    let _ = shutdown_tx.send(());

    let drain = async {
      while let Some(joined) = tasks.join_next_with_id().await {
        let (id, outcome) = split_join(joined);
        let stream = mark_stopped(id);
        if let Some(e) = outcome {
          warn!(stream, error = %e, "Stream poller failed during shutdown");
        }
      }
    };

    report.drained = tokio::time::timeout(grace, drain).await.is_ok();
    if !report.drained {
      warn!(
        remaining = tasks.len(),
        grace_ms = grace.as_millis() as u64,
        "Stream pollers did not stop in time, aborting"
      );
      tasks.abort_all();
    }

    info!(stopped_early = report.stopped_early.len(), "Stream supervisor stopped");
    report
  }
}

/// Task id plus the failure, if the task did not return normally.
fn split_join(joined: Result<(Id, ()), JoinError>) -> (Id, Option<JoinError>) {
  match joined {
    Ok((id, ())) => (id, None),
    Err(e) => (e.id(), Some(e)),
  }
}
