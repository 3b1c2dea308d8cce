//! Configuration Module - TOML-based Exporter Configuration
//!
//! Loads configuration from `config.toml` with environment variable
//! overrides for the RPC endpoint and contract addresses. Every
//! section has defaults so a deployment can run from environment
//! variables alone.

pub mod loader;

use serde::Deserialize;

/// Top-level exporter configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
  /// Process identity, logging, and polling cadence.
  #[serde(default)]
  pub exporter: ExporterConfig,
  /// Chain node connection.
  #[serde(default)]
  pub chain: ChainConfig,
  /// Watched contracts.
  #[serde(default)]
  pub contracts: ContractsConfig,
  /// Metrics and health endpoints.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Exporter identity and loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
  /// Human-readable instance name.
  #[serde(default = "default_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Seconds between polls of each stream; also the backoff delay.
  #[serde(default = "default_poll_interval")]
  pub poll_interval_secs: u64,
  /// Seconds to wait for pollers after a shutdown signal.
  #[serde(default = "default_shutdown_grace")]
  pub shutdown_grace_secs: u64,
}

/// Chain node connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
  /// JSON-RPC endpoint (http, https, ws, wss).
  #[serde(default = "default_rpc_url")]
  pub rpc_url: String,
  /// If set, startup fails when the node reports another chain id.
  pub expected_chain_id: Option<u64>,
}

/// The three watched contracts.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
  /// Token emitting `Minted` / `Burned`, read for `totalSupply()`.
  #[serde(default = "default_my_token")]
  pub my_token: ContractConfig,
  /// Escrow emitting `EscrowCreated`.
  #[serde(default = "default_escrow")]
  pub escrow: ContractConfig,
  /// Cash contract emitting `CashCharged` / `CashWithdrawn`.
  #[serde(default = "default_cash")]
  pub cash: ContractConfig,
}

/// One contract: where it lives and where its ABI artifact is.
///
/// Addresses are ALWAYS supplied externally - never hardcoded.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractConfig {
  /// Deployed address (hex). May come from the environment instead.
  pub address: Option<String>,
  /// Path to a Hardhat-style artifact (`{ "abi": [...] }`) or a bare ABI array.
  pub abi_path: String,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Prometheus `/metrics` bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for ExporterConfig {
  fn default() -> Self {
    Self {
      name: default_name(),
      log_level: default_log_level(),
      poll_interval_secs: default_poll_interval(),
      shutdown_grace_secs: default_shutdown_grace(),
    }
  }
}

impl Default for ChainConfig {
  fn default() -> Self {
    Self {
      rpc_url: default_rpc_url(),
      expected_chain_id: None,
    }
  }
}

impl Default for ContractsConfig {
  fn default() -> Self {
    Self {
      my_token: default_my_token(),
      escrow: default_escrow(),
      cash: default_cash(),
    }
  }
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

// Default value functions for serde

fn default_name() -> String {
  "chain-event-exporter".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_poll_interval() -> u64 {
  5
}

fn default_shutdown_grace() -> u64 {
  5
}

fn default_rpc_url() -> String {
  "http://127.0.0.1:8545".to_string()
}

fn contract(abi_path: &str) -> ContractConfig {
  ContractConfig {
    address: None,
    abi_path: abi_path.to_string(),
  }
}

fn default_my_token() -> ContractConfig {
  contract("contracts_abi/MyTokenModule#MyToken.json")
}

fn default_escrow() -> ContractConfig {
  contract("contracts_abi/TotalModule#Escrow.json")
}

fn default_cash() -> ContractConfig {
  contract("contracts_abi/TotalModule#Cash.json")
}

fn default_metrics_addr() -> String {
  "0.0.0.0:58000".to_string()
}

fn default_health_port() -> u16 {
  8080
}
