//! Metric names and store operations.
//!
//! Handlers never touch the store directly; they describe what should
//! change as a `MetricBatch`, which the store applies in one critical
//! section.

/// Exported metric family names.
pub mod names {
    pub const ESCROW_CREATED_TOTAL: &str = "escrow_created_total";
    pub const CASH_CHARGED_TOTAL: &str = "cash_charged_total";
    pub const CASH_WITHDRAWN_TOTAL: &str = "cash_withdrawn_total";
    pub const TOTAL_MINTED: &str = "total_minted";
    pub const TOTAL_BURNED: &str = "total_burned";
    pub const CIRCULATING_SUPPLY: &str = "circulating_supply";
    pub const MY_TOKEN_TOTAL_SUPPLY: &str = "my_token_total_supply";
}

/// A single store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricOp {
    /// Add `delta` to a counter. Negative deltas are rejected.
    Increment { name: &'static str, delta: i64 },
    /// Overwrite a plain gauge.
    Set { name: &'static str, value: i128 },
    /// Add to the minted total and recompute circulating supply.
    Mint { amount: u128 },
    /// Add to the burned total and recompute circulating supply.
    Burn { amount: u128 },
}

/// Ordered set of operations produced for one event. Applied all or
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricBatch {
    ops: Vec<MetricOp>,
}

impl MetricBatch {
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn increment(mut self, name: &'static str, delta: i64) -> Self {
        self.ops.push(MetricOp::Increment { name, delta });
        self
    }

    pub fn set(mut self, name: &'static str, value: i128) -> Self {
        self.ops.push(MetricOp::Set { name, value });
        self
    }

    pub fn mint(mut self, amount: u128) -> Self {
        self.ops.push(MetricOp::Mint { amount });
        self
    }

    pub fn burn(mut self, amount: u128) -> Self {
        self.ops.push(MetricOp::Burn { amount });
        self
    }

    pub fn ops(&self) -> &[MetricOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
