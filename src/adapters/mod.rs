//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (chain RPC, HTTP servers). Each sub-module
//! groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `chain`: Contract event streams and state reads via alloy-rs
//! - `metrics`: Prometheus metric store and health checks

pub mod chain;
pub mod metrics;
