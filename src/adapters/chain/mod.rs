//! Chain Adapters - Contract Event and State Access
//!
//! Provides on-chain access via alloy-rs 0.9 for:
//! - RPC provider connection and startup validation
//! - Contract ABI loading, deployment checks, `totalSupply()` reads
//! - Per-event log filter streams (`eth_newFilter` / `eth_getFilterChanges`)

pub mod contracts;
pub mod log_filter;
pub mod provider;

pub use contracts::{TokenSupply, WatchedContract};
pub use log_filter::LogFilterSource;
pub use provider::{ChainProvider, RpcProvider};
