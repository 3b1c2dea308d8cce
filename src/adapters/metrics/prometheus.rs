//! Prometheus Metric Store - Derived Token and Escrow Metrics
//!
//! Owns every exported metric family and serves them on `/metrics`.
//! All event-derived values live behind one lock: a batch is validated
//! and committed in a single critical section, and a scrape gathers the
//! registry under that same lock, so neither a reader nor a scrape can
//! observe `total_minted` moved without `circulating_supply` following.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, Gauge, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::domain::metric::names;
use crate::domain::{MetricBatch, MetricOp, SupplyLedger, SupplySnapshot};
use crate::error::StoreError;

/// Event-derived counters: (name, help).
const COUNTERS: [(&str, &str); 3] = [
    (names::ESCROW_CREATED_TOTAL, "Total number of escrows created"),
    (names::CASH_CHARGED_TOTAL, "Total number of cash charged"),
    (names::CASH_WITHDRAWN_TOTAL, "Total number of cash withdrawn"),
];

/// Gauges that may be set directly: (name, help).
const GAUGES: [(&str, &str); 1] = [(
    names::MY_TOKEN_TOTAL_SUPPLY,
    "Total supply of the token as reported by totalSupply()",
)];

/// Gauges owned by the supply ledger.
const LEDGER_GAUGES: [&str; 3] = [
    names::TOTAL_MINTED,
    names::TOTAL_BURNED,
    names::CIRCULATING_SUPPLY,
];

/// Prometheus exposes gauges as f64; the authoritative integer values
/// are kept alongside.
#[allow(clippy::cast_precision_loss)]
fn as_sample(value: i128) -> f64 {
    value as f64
}

#[allow(clippy::cast_precision_loss)]
fn as_unsigned_sample(value: u128) -> f64 {
    value as f64
}

struct CounterCell {
    value: u64,
    exported: IntCounter,
}

struct GaugeCell {
    value: i128,
    exported: Gauge,
}

/// Everything guarded by the store lock.
struct StoreState {
    counters: HashMap<&'static str, CounterCell>,
    gauges: HashMap<&'static str, GaugeCell>,
    ledger: SupplyLedger,
    minted: Gauge,
    burned: Gauge,
    circulating: Gauge,
}

impl StoreState {
    fn publish_ledger(&self) {
        let snap = self.ledger.snapshot();
        self.minted.set(as_unsigned_sample(snap.minted));
        self.burned.set(as_unsigned_sample(snap.burned));
        self.circulating.set(as_sample(snap.circulating));
    }
}

/// Single owned store for all exported metrics.
///
/// Constructed once at startup and shared as `Arc<MetricStore>` with
/// every poller. Values start at zero and are never persisted.
pub struct MetricStore {
    /// Prometheus registry.
    registry: Registry,
    /// Event-derived values and their exported handles.
    state: Mutex<StoreState>,
    /// Events successfully applied, per stream.
    events_processed: IntCounterVec,
    /// Events that failed translation or application, per stream.
    handler_errors: IntCounterVec,
    /// Failed polls, per stream.
    source_errors: IntCounterVec,
    /// Whether a stream's poller is running (1) or stopped (0).
    stream_up: IntGaugeVec,
}

impl MetricStore {
    /// Create and register all metric families.
    pub fn new() -> Result<Self, StoreError> {
        let registry = Registry::new();

        let mut counters = HashMap::new();
        for (name, help) in COUNTERS {
            let exported = IntCounter::new(name, help)?;
            registry.register(Box::new(exported.clone()))?;
            counters.insert(name, CounterCell { value: 0, exported });
        }

        let mut gauges = HashMap::new();
        for (name, help) in GAUGES {
            let exported = Gauge::new(name, help)?;
            registry.register(Box::new(exported.clone()))?;
            gauges.insert(name, GaugeCell { value: 0, exported });
        }

        let minted = Gauge::new(names::TOTAL_MINTED, "Total minted tokens")?;
        let burned = Gauge::new(names::TOTAL_BURNED, "Total burned tokens")?;
        let circulating = Gauge::new(
            names::CIRCULATING_SUPPLY,
            "Circulating token supply (total minted - burned)",
        )?;
        registry.register(Box::new(minted.clone()))?;
        registry.register(Box::new(burned.clone()))?;
        registry.register(Box::new(circulating.clone()))?;

        let events_processed = IntCounterVec::new(
            Opts::new(
                "exporter_events_processed_total",
                "Events applied to the metric store",
            ),
            &["stream"],
        )?;
        let handler_errors = IntCounterVec::new(
            Opts::new(
                "exporter_handler_errors_total",
                "Events skipped because handling failed",
            ),
            &["stream"],
        )?;
        let source_errors = IntCounterVec::new(
            Opts::new(
                "exporter_source_errors_total",
                "Polls that failed at the event source",
            ),
            &["stream"],
        )?;
        let stream_up = IntGaugeVec::new(
            Opts::new(
                "exporter_stream_up",
                "Stream poller status (1=running, 0=stopped)",
            ),
            &["stream"],
        )?;
        registry.register(Box::new(events_processed.clone()))?;
        registry.register(Box::new(handler_errors.clone()))?;
        registry.register(Box::new(source_errors.clone()))?;
        registry.register(Box::new(stream_up.clone()))?;

        Ok(Self {
            registry,
            state: Mutex::new(StoreState {
                counters,
                gauges,
                ledger: SupplyLedger::new(),
                minted,
                burned,
                circulating,
            }),
            events_processed,
            handler_errors,
            source_errors,
            stream_up,
        })
    }

    /// Nothing inside the critical section can panic mid-commit, so a
    /// poisoned lock still guards consistent state.
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `delta` to a counter and return its new value.
    pub fn increment(&self, name: &str, delta: i64) -> Result<u64, StoreError> {
        let mut state = self.lock();
        let cell = state
            .counters
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownMetric(name.to_string()))?;
        let next = checked_counter(name, cell.value, delta)?;
        cell.exported.inc_by(next - cell.value);
        cell.value = next;
        Ok(next)
    }

    /// Overwrite a plain gauge.
    pub fn set(&self, name: &str, value: i128) -> Result<(), StoreError> {
        if LEDGER_GAUGES.contains(&name) {
            return Err(StoreError::DerivedMetric(name.to_string()));
        }
        let mut state = self.lock();
        let cell = state
            .gauges
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownMetric(name.to_string()))?;
        cell.value = value;
        cell.exported.set(as_sample(value));
        Ok(())
    }

    /// Current value of any event-derived metric.
    pub fn get(&self, name: &str) -> Result<i128, StoreError> {
        let state = self.lock();
        if let Some(cell) = state.counters.get(name) {
            return Ok(i128::from(cell.value));
        }
        if let Some(cell) = state.gauges.get(name) {
            return Ok(cell.value);
        }
        let snap = state.ledger.snapshot();
        let value = match name {
            names::TOTAL_MINTED => snap.minted,
            names::TOTAL_BURNED => snap.burned,
            names::CIRCULATING_SUPPLY => return Ok(snap.circulating),
            _ => return Err(StoreError::UnknownMetric(name.to_string())),
        };
        i128::try_from(value).map_err(|_| StoreError::Overflow(name.to_string()))
    }

    /// The (minted, burned, circulating) triple, read atomically.
    pub fn supply(&self) -> SupplySnapshot {
        self.lock().ledger.snapshot()
    }

    /// Validate and apply a batch in one critical section.
    ///
    /// Either every operation lands or none does.
    pub fn apply(&self, batch: &MetricBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut state = self.lock();

        // Stage against a copy; the live state is untouched until commit.
        let mut ledger = state.ledger;
        let mut staged_counters: HashMap<&'static str, u64> = HashMap::new();
        let mut staged_gauges: HashMap<&'static str, i128> = HashMap::new();

        for op in batch.ops() {
            match *op {
                MetricOp::Increment { name, delta } => {
                    let current = match staged_counters.get(name) {
                        Some(v) => *v,
                        None => {
                            state
                                .counters
                                .get(name)
                                .ok_or_else(|| StoreError::UnknownMetric(name.to_string()))?
                                .value
                        }
                    };
                    staged_counters.insert(name, checked_counter(name, current, delta)?);
                }
                MetricOp::Set { name, value } => {
                    if LEDGER_GAUGES.contains(&name) {
                        return Err(StoreError::DerivedMetric(name.to_string()));
                    }
                    if !state.gauges.contains_key(name) {
                        return Err(StoreError::UnknownMetric(name.to_string()));
                    }
                    staged_gauges.insert(name, value);
                }
                MetricOp::Mint { amount } => {
                    ledger = ledger
                        .checked_mint(amount)
                        .ok_or_else(|| StoreError::Overflow(names::TOTAL_MINTED.to_string()))?;
                }
                MetricOp::Burn { amount } => {
                    ledger = ledger
                        .checked_burn(amount)
                        .ok_or_else(|| StoreError::Overflow(names::TOTAL_BURNED.to_string()))?;
                }
            }
        }

        // Commit.
        for (name, next) in staged_counters {
            if let Some(cell) = state.counters.get_mut(name) {
                cell.exported.inc_by(next - cell.value);
                cell.value = next;
            }
        }
        for (name, value) in staged_gauges {
            if let Some(cell) = state.gauges.get_mut(name) {
                cell.value = value;
                cell.exported.set(as_sample(value));
            }
        }
        if ledger != state.ledger {
            state.ledger = ledger;
            state.publish_ledger();
        }

        Ok(())
    }

    /// Count one applied event for `stream`.
    pub fn record_event(&self, stream: &str) {
        self.events_processed.with_label_values(&[stream]).inc();
    }

    /// Count one skipped event for `stream`.
    pub fn record_handler_error(&self, stream: &str) {
        self.record_handler_errors(stream, 1);
    }

    /// Count `n` skipped events for `stream`.
    pub fn record_handler_errors(&self, stream: &str, n: u64) {
        self.handler_errors.with_label_values(&[stream]).inc_by(n);
    }

    /// Count one failed poll for `stream`.
    pub fn record_source_error(&self, stream: &str) {
        self.source_errors.with_label_values(&[stream]).inc();
    }

    /// Mark a stream's poller running or stopped.
    pub fn set_stream_up(&self, stream: &str, up: bool) {
        self.stream_up
            .with_label_values(&[stream])
            .set(i64::from(up));
    }

    /// Encode every family in the Prometheus text format.
    pub fn render(&self) -> Result<String, StoreError> {
        let families = {
            let _state = self.lock();
            self.registry.gather()
        };
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        exposition_text(buffer)
    }

    /// Serve `/metrics` on the configured bind address until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let store = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let store = Arc::clone(&store);
                async move {
                    match store.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            error!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

fn exposition_text(buffer: Vec<u8>) -> Result<String, StoreError> {
    Ok(String::from_utf8(buffer)?)
}

fn checked_counter(name: &str, current: u64, delta: i64) -> Result<u64, StoreError> {
    let delta = u64::try_from(delta).map_err(|_| StoreError::InvalidDelta {
        name: name.to_string(),
        delta,
    })?;
    current
        .checked_add(delta)
        .ok_or_else(|| StoreError::Overflow(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let store = MetricStore::new().unwrap();
        for (name, _) in COUNTERS {
            assert_eq!(store.get(name).unwrap(), 0);
        }
        assert_eq!(store.supply(), SupplySnapshot::default());
    }

    #[test]
    fn test_increment_rejects_negative_delta() {
        let store = MetricStore::new().unwrap();
        let err = store.increment(names::ESCROW_CREATED_TOTAL, -1).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDelta { delta: -1, .. }));
        assert_eq!(store.get(names::ESCROW_CREATED_TOTAL).unwrap(), 0);
    }

    #[test]
    fn test_increment_unknown_metric() {
        let store = MetricStore::new().unwrap();
        assert!(matches!(
            store.increment("nope_total", 1),
            Err(StoreError::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_set_and_get_plain_gauge() {
        let store = MetricStore::new().unwrap();
        store.set(names::MY_TOKEN_TOTAL_SUPPLY, 1_000).unwrap();
        assert_eq!(store.get(names::MY_TOKEN_TOTAL_SUPPLY).unwrap(), 1_000);
    }

    #[test]
    fn test_set_refuses_ledger_gauges() {
        let store = MetricStore::new().unwrap();
        for name in LEDGER_GAUGES {
            assert!(matches!(
                store.set(name, 5),
                Err(StoreError::DerivedMetric(_))
            ));
        }
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let store = MetricStore::new().unwrap();
        let batch = MetricBatch::new()
            .increment(names::CASH_CHARGED_TOTAL, 1)
            .mint(10)
            .increment(names::CASH_WITHDRAWN_TOTAL, -3);
        assert!(store.apply(&batch).is_err());
        assert_eq!(store.get(names::CASH_CHARGED_TOTAL).unwrap(), 0);
        assert_eq!(store.supply().minted, 0);
    }

    #[test]
    fn test_repeated_counter_in_batch_accumulates() {
        let store = MetricStore::new().unwrap();
        let batch = MetricBatch::new()
            .increment(names::ESCROW_CREATED_TOTAL, 2)
            .increment(names::ESCROW_CREATED_TOTAL, 3);
        store.apply(&batch).unwrap();
        assert_eq!(store.get(names::ESCROW_CREATED_TOTAL).unwrap(), 5);
    }

    #[test]
    fn test_invalid_utf8_exposition_is_an_error() {
        assert!(matches!(
            exposition_text(vec![b'o', b'k', 0xff]),
            Err(StoreError::Encoding(_))
        ));
        assert_eq!(exposition_text(b"up 1\n".to_vec()).unwrap(), "up 1\n");
    }

    #[test]
    fn test_render_contains_families() {
        let store = MetricStore::new().unwrap();
        store.apply(&MetricBatch::new().mint(100).burn(30)).unwrap();
        store.set_stream_up("minted", true);
        let text = store.render().unwrap();
        assert!(text.contains("total_minted 100"));
        assert!(text.contains("total_burned 30"));
        assert!(text.contains("circulating_supply 70"));
        assert!(text.contains("escrow_created_total 0"));
        assert!(text.contains("exporter_stream_up{stream=\"minted\"} 1"));
    }
}
