//! Stream Poller - Fixed-Interval Event Polling for One Stream
//!
//! Drives a single `EventSource`: poll, hand every record to the
//! stream's handler, apply the resulting batch, wait, repeat.
//!
//! States: `Idle -> Polling -> (Idle | Backoff)`.
//! - A failed record is logged and counted; the rest of the batch and
//!   later polls continue.
//! - A failed poll moves the stream to `Backoff`; after the same fixed
//!   interval the source is reinstalled and polled again, forever.
//!
//! Shutdown is only observed between cycles, so an in-flight poll and
//! its batch always complete.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::adapters::metrics::MetricStore;
use crate::domain::EventRecord;
use crate::error::{HandlerError, SourceError};
use crate::ports::event_source::EventSource;

use super::handlers::EventHandler;

/// Poller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PollerState {
  /// Waiting for the interval to elapse.
  Idle = 0,
  /// Polling the source and applying batches.
  Polling = 1,
  /// Last poll failed; waiting to retry.
  Backoff = 2,
  /// Task has exited.
  Stopped = 3,
}

impl PollerState {
  const fn from_u8(raw: u8) -> Self {
    match raw {
      0 => Self::Idle,
      1 => Self::Polling,
      2 => Self::Backoff,
      _ => Self::Stopped,
    }
  }
}

/// Per-stream counters, shared with whoever wants to observe the stream.
#[derive(Debug)]
pub struct StreamStats {
  /// Stream label.
  stream: &'static str,
  /// Successful polls.
  polls: AtomicU64,
  /// Records applied to the store.
  events_handled: AtomicU64,
  /// Records skipped after a handler or store failure.
  handler_errors: AtomicU64,
  /// Failed polls (including failed reinstalls).
  source_errors: AtomicU64,
  /// Current `PollerState`.
  state: AtomicU8,
}

/// Point-in-time copy of `StreamStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
  pub polls: u64,
  pub events_handled: u64,
  pub handler_errors: u64,
  pub source_errors: u64,
  pub state: PollerState,
}

impl StreamStats {
  fn new(stream: &'static str) -> Self {
    Self {
      stream,
      polls: AtomicU64::new(0),
      events_handled: AtomicU64::new(0),
      handler_errors: AtomicU64::new(0),
      source_errors: AtomicU64::new(0),
      state: AtomicU8::new(PollerState::Idle as u8),
    }
  }

  pub const fn stream(&self) -> &'static str {
    self.stream
  }

  pub fn state(&self) -> PollerState {
    PollerState::from_u8(self.state.load(Ordering::Relaxed))
  }

  fn set_state(&self, state: PollerState) {
    self.state.store(state as u8, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> StatsSnapshot {
    StatsSnapshot {
      polls: self.polls.load(Ordering::Relaxed),
      events_handled: self.events_handled.load(Ordering::Relaxed),
      handler_errors: self.handler_errors.load(Ordering::Relaxed),
      source_errors: self.source_errors.load(Ordering::Relaxed),
      state: self.state(),
    }
  }
}

/// Outcome of one successful poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
  /// Records applied.
  pub handled: usize,
  /// Records skipped.
  pub failed: usize,
}

/// Polls one stream on a fixed interval.
pub struct Poller {
  /// Event source owned by this stream alone.
  source: Box<dyn EventSource>,
  /// Handler for the source's event kind.
  handler: Arc<dyn EventHandler>,
  /// Shared metric store.
  store: Arc<MetricStore>,
  /// Delay between cycles, also used as the backoff delay.
  interval: Duration,
  /// Observable counters.
  stats: Arc<StreamStats>,
  /// Set after a failed poll; the next cycle reinstalls the source first.
  needs_reinstall: bool,
}

impl Poller {
  /// Create a poller for one (source, handler, interval) triple.
  pub fn new(
    source: Box<dyn EventSource>,
    handler: Arc<dyn EventHandler>,
    store: Arc<MetricStore>,
    interval: Duration,
  ) -> Self {
    let stats = Arc::new(StreamStats::new(source.stream()));
    Self {
      source,
      handler,
      store,
      interval,
      stats,
      needs_reinstall: false,
    }
  }

  pub fn stream(&self) -> &'static str {
    self.source.stream()
  }

  pub fn stats(&self) -> Arc<StreamStats> {
    Arc::clone(&self.stats)
  }

  /// Run one `Polling` step.
  ///
  /// Source failures are returned; record failures are contained and
  /// reported in the `CycleReport`.
  pub async fn poll_once(&mut self) -> Result<CycleReport, SourceError> {
    let stream = self.source.stream();

    if self.needs_reinstall {
      self.source.reinstall().await?;
      self.needs_reinstall = false;
      info!(stream, "Event source reinstalled");
    }

    let records = self.source.poll().await?;
    self.stats.polls.fetch_add(1, Ordering::Relaxed);

    let mut report = CycleReport::default();

    let rejected = self.source.take_rejected();
    if rejected > 0 {
      report.failed += rejected;
      self.stats.handler_errors.fetch_add(rejected as u64, Ordering::Relaxed);
      self.store.record_handler_errors(stream, rejected as u64);
      warn!(stream, rejected, "Undecodable logs skipped");
    }

    for record in &records {
      match self.apply(record).await {
        Ok(()) => {
          report.handled += 1;
          self.stats.events_handled.fetch_add(1, Ordering::Relaxed);
          self.store.record_event(stream);
          info!(stream, event = %record, "Event applied");
        }
        Err(e) => {
          report.failed += 1;
          self.stats.handler_errors.fetch_add(1, Ordering::Relaxed);
          self.store.record_handler_error(stream);
          warn!(stream, event = %record, error = %e, "Event skipped");
        }
      }
    }

    if !records.is_empty() || rejected > 0 {
      debug!(stream, handled = report.handled, failed = report.failed, "Poll cycle complete");
    }

    Ok(report)
  }

  async fn apply(&self, record: &EventRecord) -> Result<(), HandlerError> {
    let batch = self.handler.handle(record).await?;
    self.store.apply(&batch)?;
    Ok(())
  }

  /// Poll until shutdown. Never returns on its own.
  #[instrument(skip_all, fields(stream = self.source.stream()))]
  pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
    let stream = self.source.stream();
    info!(interval_ms = self.interval.as_millis() as u64, "Stream poller started");

    loop {
      self.stats.set_state(PollerState::Polling);

      let next = match self.poll_once().await {
        Ok(_) => PollerState::Idle,
        Err(e) => {
          self.needs_reinstall = true;
          self.stats.source_errors.fetch_add(1, Ordering::Relaxed);
          self.store.record_source_error(stream);
          warn!(
            error = %e,
            retry_in_ms = self.interval.as_millis() as u64,
            "Polling failed, backing off"
          );
          PollerState::Backoff
        }
      };
      self.stats.set_state(next);

      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Stream poller shutting down");
          break;
        }
        () = tokio::time::sleep(self.interval) => {}
      }
    }

    self.stats.set_state(PollerState::Stopped);
  }
}

#[cfg(test)]
mod tests {
  use std::collections::VecDeque;

  use alloy::primitives::U256;
  use async_trait::async_trait;

  use super::*;
  use crate::domain::event::{ArgValue, EventKind, LogPosition};
  use crate::domain::metric::names;
  use crate::usecases::handlers::handler_for;

  /// Source that replays scripted poll results.
  struct ScriptedSource {
    kind: EventKind,
    script: VecDeque<Result<Vec<EventRecord>, &'static str>>,
    reinstalls: Arc<AtomicU64>,
    rejected: usize,
  }

  #[async_trait]
  impl EventSource for ScriptedSource {
    fn stream(&self) -> &'static str {
      self.kind.stream_name()
    }

    fn kind(&self) -> EventKind {
      self.kind
    }

    async fn poll(&mut self) -> Result<Vec<EventRecord>, SourceError> {
      match self.script.pop_front() {
        Some(Ok(records)) => Ok(records),
        Some(Err(reason)) => Err(SourceError::Unavailable {
          stream: self.stream(),
          reason: reason.into(),
        }),
        None => Ok(Vec::new()),
      }
    }

    async fn reinstall(&mut self) -> Result<(), SourceError> {
      self.reinstalls.fetch_add(1, Ordering::Relaxed);
      Ok(())
    }

    fn take_rejected(&mut self) -> usize {
      std::mem::take(&mut self.rejected)
    }
  }

  fn burn(amount: Option<ArgValue>) -> EventRecord {
    let args = amount.map(|a| vec![("amount".to_string(), a)]).unwrap_or_default();
    EventRecord::new(EventKind::Burned, args, LogPosition::default())
  }

  fn poller(
    script: Vec<Result<Vec<EventRecord>, &'static str>>,
  ) -> (Poller, Arc<MetricStore>, Arc<AtomicU64>) {
    poller_with_rejects(script, 0)
  }

  fn poller_with_rejects(
    script: Vec<Result<Vec<EventRecord>, &'static str>>,
    rejected: usize,
  ) -> (Poller, Arc<MetricStore>, Arc<AtomicU64>) {
    let store = Arc::new(MetricStore::new().unwrap());
    let reinstalls = Arc::new(AtomicU64::new(0));
    let source = ScriptedSource {
      kind: EventKind::Burned,
      script: script.into(),
      reinstalls: Arc::clone(&reinstalls),
      rejected,
    };
    let poller = Poller::new(
      Box::new(source),
      handler_for(EventKind::Burned, None),
      Arc::clone(&store),
      Duration::from_secs(5),
    );
    (poller, store, reinstalls)
  }

  #[tokio::test]
  async fn test_bad_record_does_not_abort_batch() {
    let records = vec![
      burn(Some(ArgValue::Uint(U256::from(10)))),
      burn(Some(ArgValue::Bool(true))),
      burn(Some(ArgValue::Uint(U256::from(5)))),
    ];
    let (mut poller, store, _) = poller(vec![Ok(records)]);

    let report = poller.poll_once().await.unwrap();
    assert_eq!(report, CycleReport { handled: 2, failed: 1 });
    assert_eq!(store.get(names::TOTAL_BURNED).unwrap(), 15);

    let stats = poller.stats().snapshot();
    assert_eq!(stats.events_handled, 2);
    assert_eq!(stats.handler_errors, 1);
  }

  #[tokio::test]
  async fn test_undecodable_logs_count_as_handler_errors() {
    let records = vec![burn(Some(ArgValue::Uint(U256::from(4))))];
    let (mut poller, store, _) = poller_with_rejects(vec![Ok(records)], 2);

    let report = poller.poll_once().await.unwrap();
    assert_eq!(report, CycleReport { handled: 1, failed: 2 });
    assert_eq!(poller.stats().snapshot().handler_errors, 2);

    let text = store.render().unwrap();
    assert!(text.contains("exporter_handler_errors_total{stream=\"burned\"} 2"));

    // Reported once, not again on the next poll.
    let report = poller.poll_once().await.unwrap();
    assert_eq!(report, CycleReport::default());
  }

  fn assert_send<T: Send>(_: &T) {}

  #[test]
  fn test_run_future_is_send() {
    let (poller, _, _) = poller(Vec::new());
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let run = poller.run(shutdown_rx);
    assert_send(&run);
  }

  #[tokio::test]
  async fn test_source_failure_then_reinstall() {
    let (mut poller, store, reinstalls) = poller(vec![
      Err("filter not found"),
      Ok(vec![burn(None)]),
    ]);

    assert!(poller.poll_once().await.is_err());
    poller.needs_reinstall = true;

    let report = poller.poll_once().await.unwrap();
    assert_eq!(report.handled, 1);
    assert_eq!(reinstalls.load(Ordering::Relaxed), 1);
    assert_eq!(store.supply().burned, 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_run_backs_off_and_stops_on_shutdown() {
    let (poller, store, reinstalls) = poller(vec![
      Err("connection refused"),
      Ok(vec![burn(Some(ArgValue::Uint(U256::from(3))))]),
    ]);
    let stats = poller.stats();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let task = tokio::spawn(poller.run(shutdown_rx));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(stats.state(), PollerState::Backoff);
    assert_eq!(stats.snapshot().source_errors, 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(stats.state(), PollerState::Idle);
    assert_eq!(reinstalls.load(Ordering::Relaxed), 1);
    assert_eq!(store.supply().burned, 3);

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
    assert_eq!(stats.state(), PollerState::Stopped);
  }
}
