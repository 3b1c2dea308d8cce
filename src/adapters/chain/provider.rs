//! Chain RPC Provider - alloy-rs 0.9 Connection Management
//!
//! Connects to the configured JSON-RPC endpoint and validates that the
//! node answers before any stream is started. All chain adapters share
//! a single provider instance.
//!
//! `on_builtin` picks the transport from the URL scheme (http, ws, ipc)
//! and returns a `RootProvider<BoxTransport>`, which keeps the concrete
//! transport type out of the rest of the adapter layer.

use std::sync::Arc;

use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::transports::BoxTransport;
use tracing::{info, instrument};

use crate::config::ChainConfig;
use crate::error::ConfigError;

/// Type-erased provider shared by every chain adapter.
pub type RpcProvider = RootProvider<BoxTransport>;

/// Shared chain RPC provider.
pub struct ChainProvider {
    /// The alloy provider (transport boxed).
    provider: Arc<RpcProvider>,
    /// RPC endpoint URL, kept for diagnostics.
    rpc_url: String,
}

impl ChainProvider {
    /// Connect to the node and validate it is reachable.
    ///
    /// Queries the chain id (and checks it against
    /// `expected_chain_id` when configured) and the latest block.
    /// Any failure is a startup `ConfigError`.
    #[instrument(skip_all, fields(rpc_url = %config.rpc_url))]
    pub async fn connect(config: &ChainConfig) -> Result<Self, ConfigError> {
        let rpc_url = config.rpc_url.clone();
        let unreachable = |reason: String| ConfigError::NodeUnreachable {
            url: rpc_url.clone(),
            reason,
        };

        let provider = ProviderBuilder::new()
            .on_builtin(&rpc_url)
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| unreachable(format!("eth_chainId failed: {e}")))?;

        if let Some(expected) = config.expected_chain_id {
            if chain_id != expected {
                return Err(ConfigError::Invalid {
                    field: "chain.expected_chain_id",
                    reason: format!("node reports chain id {chain_id}, expected {expected}"),
                });
            }
        }

        let block = provider
            .get_block_number()
            .await
            .map_err(|e| unreachable(format!("eth_blockNumber failed: {e}")))?;

        info!(chain_id, block, "Connected to chain node");

        Ok(Self {
            provider: Arc::new(provider),
            rpc_url,
        })
    }

    /// Get a shared reference to the provider.
    pub fn inner(&self) -> Arc<RpcProvider> {
        Arc::clone(&self.provider)
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}
