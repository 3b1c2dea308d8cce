//! Error types for the exporter.
//!
//! - [`ConfigError`] - Startup configuration problems (fatal)
//! - [`SourceError`] - Event source transport failures (stream backs off)
//! - [`HandlerError`] - Per-event translation failures (event skipped)
//! - [`ExternalReadError`] - Contract state read failures (logged only)
//! - [`StoreError`] - Metric store rejections
//!
//! Only `ConfigError` ever leaves the process startup path; everything
//! else is contained in the stream that produced it.

use thiserror::Error;

use crate::domain::EventKind;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid or incomplete startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for `AppConfig`.
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// A required value is absent from both the file and the environment.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A value is present but unusable.
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// ABI artifact could not be loaded or lacks an expected item.
    #[error("ABI error for {contract}: {reason}")]
    Abi { contract: String, reason: String },

    /// RPC node could not be reached or answered unexpectedly.
    #[error("Chain node unreachable at {url}: {reason}")]
    NodeUnreachable { url: String, reason: String },

    /// Configured address has no deployed code.
    #[error("Contract {contract} at {address} has no deployed code")]
    NoCode { contract: String, address: String },
}

// =============================================================================
// Source Errors
// =============================================================================

/// Failures while pulling events from a stream.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport or filter failure (network, node restart, filter expired).
    #[error("Event source {stream} unavailable: {reason}")]
    Unavailable { stream: &'static str, reason: String },
}

// =============================================================================
// Handler Errors
// =============================================================================

/// Failures translating or applying a single event.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Handler received an event of another kind.
    #[error("Handler for {expected} received {actual} event")]
    WrongKind {
        expected: EventKind,
        actual: EventKind,
    },

    /// An argument has an unexpected type.
    #[error("Argument {field} of {kind} has type {found}, expected {expected}")]
    BadArgument {
        kind: EventKind,
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// An amount does not fit the ledger's integer width.
    #[error("Amount {value} of {kind} exceeds supported range")]
    AmountOutOfRange { kind: EventKind, value: String },

    /// Raw log did not match the ABI event definition.
    #[error("Failed to decode {kind} log: {reason}")]
    Decode { kind: EventKind, reason: String },

    /// The store rejected the event's batch.
    #[error("Metric store rejected batch: {0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// External Read Errors
// =============================================================================

/// A read against deployed contract state failed.
#[derive(Debug, Error)]
#[error("Read of {call} on {contract} failed: {reason}")]
pub struct ExternalReadError {
    pub contract: String,
    pub call: &'static str,
    pub reason: String,
}

// =============================================================================
// Store Errors
// =============================================================================

/// Rejections from the metric store. A rejected batch leaves the store
/// untouched.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Counter delta was negative.
    #[error("Invalid delta {delta} for counter {name}")]
    InvalidDelta { name: String, delta: i64 },

    /// No metric with this name and family is registered.
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// Gauge is derived from the supply ledger and cannot be set directly.
    #[error("Metric {0} is derived from the supply ledger")]
    DerivedMetric(String),

    /// Arithmetic overflow while applying an update.
    #[error("Overflow updating {0}")]
    Overflow(String),

    /// Encoded exposition was not valid UTF-8.
    #[error("Metrics exposition is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    /// Prometheus registry or encoder failure.
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}
