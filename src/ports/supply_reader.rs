//! Supply Reader Port - Token Contract State Reads
//!
//! Read-through to the token contract's `totalSupply()`. Used by the
//! mint handler to refresh the on-chain supply gauge.

use alloy::primitives::U256;
use async_trait::async_trait;

use crate::error::ExternalReadError;

/// Trait for reading the current total supply of the tracked token.
#[async_trait]
pub trait SupplyReader: Send + Sync + 'static {
  /// Current `totalSupply()` at the latest block.
  async fn total_supply(&self) -> Result<U256, ExternalReadError>;
}
