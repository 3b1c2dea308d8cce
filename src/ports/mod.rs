//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `EventSource`: Incremental per-stream contract event polling
//! - `SupplyReader`: Token `totalSupply()` reads

pub mod event_source;
pub mod supply_reader;

pub use event_source::EventSource;
pub use supply_reader::SupplyReader;
