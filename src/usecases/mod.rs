//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates ports and the metric store to implement the
//! exporter's core workflows.
//!
//! Use cases:
//! - `handlers`: Per-event-kind translation into metric batches
//! - `Poller`: Fixed-interval polling of one event stream
//! - `StreamSupervisor`: Concurrent pollers with isolated failures

pub mod handlers;
pub mod poller;
pub mod supervisor;

pub use handlers::{handler_for, EventHandler};
pub use poller::{Poller, PollerState, StreamStats};
pub use supervisor::{StreamSupervisor, SupervisorReport};
