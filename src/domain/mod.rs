//! Domain layer - Events, supply accounting, and metric operations.
//!
//! Pure types with no I/O (hexagonal architecture inner ring).
//! Everything here is testable in isolation.

pub mod event;
pub mod metric;
pub mod supply;

// Re-export core types for convenience
pub use event::{ArgValue, EventKind, EventRecord, LogPosition, StreamCursor};
pub use metric::{MetricBatch, MetricOp};
pub use supply::{SupplyLedger, SupplySnapshot};
