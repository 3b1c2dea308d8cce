//! Configuration Loader - File Loading, Env Overrides, Validation
//!
//! Order of precedence: environment > `config.toml` > defaults.
//! A missing config file is not an error; a missing contract address
//! after all sources are merged is.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

use alloy::primitives::Address;
use tracing::info;

use super::{AppConfig, ContractConfig};
use crate::error::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "EXPORTER_CONFIG";

/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Config file path from `EXPORTER_CONFIG`, or `config.toml`.
pub fn config_path() -> String {
  std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

/// Load, override from the process environment, and validate.
///
/// # Errors
/// Returns `ConfigError` if:
/// - The file exists but can't be read or parsed
/// - A contract address is missing or malformed
/// - Any other setting fails validation
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
  load_config_with(path, |key| std::env::var(key).ok())
}

/// `load_config` with an injectable environment lookup.
pub fn load_config_with<F>(path: &str, env: F) -> Result<AppConfig, ConfigError>
where
  F: Fn(&str) -> Option<String>,
{
  let mut config = read_file(path)?;
  apply_env_overrides(&mut config, env);
  validate_config(&config)?;

  info!(
    rpc_url = %config.chain.rpc_url,
    poll_interval_secs = config.exporter.poll_interval_secs,
    metrics = %config.metrics.bind_address,
    "Configuration loaded successfully"
  );

  Ok(config)
}

fn read_file(path: &str) -> Result<AppConfig, ConfigError> {
  let content = match std::fs::read_to_string(Path::new(path)) {
    Ok(content) => content,
    Err(e) if e.kind() == ErrorKind::NotFound => {
      info!(path, "No config file, using defaults and environment");
      return Ok(AppConfig::default());
    }
    Err(source) => {
      return Err(ConfigError::Read {
        path: path.to_string(),
        source,
      });
    }
  };

  toml::from_str(&content).map_err(|source| ConfigError::Parse {
    path: path.to_string(),
    source,
  })
}

/// Apply `RPC_URL`, `MY_TOKEN_ADDR`, `ESCROW_ADDR`, `CASH_ADDR`.
pub fn apply_env_overrides<F>(config: &mut AppConfig, env: F)
where
  F: Fn(&str) -> Option<String>,
{
  if let Some(url) = env("RPC_URL") {
    config.chain.rpc_url = url;
  }
  for (key, contract) in [
    ("MY_TOKEN_ADDR", &mut config.contracts.my_token),
    ("ESCROW_ADDR", &mut config.contracts.escrow),
    ("CASH_ADDR", &mut config.contracts.cash),
  ] {
    if let Some(address) = env(key) {
      contract.address = Some(address);
    }
  }
}

/// Parse a configured contract address.
pub fn contract_address(
  field: &'static str,
  contract: &ContractConfig,
) -> Result<Address, ConfigError> {
  let raw = contract
    .address
    .as_deref()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .ok_or(ConfigError::Missing(field))?;
  raw.parse().map_err(|e| ConfigError::Invalid {
    field,
    reason: format!("{raw:?} is not an address: {e}"),
  })
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
  contract_address("contracts.my_token.address", &config.contracts.my_token)?;
  contract_address("contracts.escrow.address", &config.contracts.escrow)?;
  contract_address("contracts.cash.address", &config.contracts.cash)?;

  let url = config.chain.rpc_url.trim();
  let scheme_ok = ["http://", "https://", "ws://", "wss://"]
    .iter()
    .any(|scheme| url.starts_with(scheme));
  if !scheme_ok {
    return Err(ConfigError::Invalid {
      field: "chain.rpc_url",
      reason: format!("{url:?} must be an http(s) or ws(s) URL"),
    });
  }

  if config.exporter.poll_interval_secs == 0 {
    return Err(ConfigError::Invalid {
      field: "exporter.poll_interval_secs",
      reason: "must be positive".to_string(),
    });
  }

  config
    .metrics
    .bind_address
    .parse::<SocketAddr>()
    .map_err(|e| ConfigError::Invalid {
      field: "metrics.bind_address",
      reason: e.to_string(),
    })?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  const TOKEN: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
  const ESCROW: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";
  const CASH: &str = "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0";

  fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
      .collect();
    move |key: &str| map.get(key).cloned()
  }

  fn full_env() -> impl Fn(&str) -> Option<String> {
    env_of(&[
      ("MY_TOKEN_ADDR", TOKEN),
      ("ESCROW_ADDR", ESCROW),
      ("CASH_ADDR", CASH),
    ])
  }

  #[test]
  fn test_missing_file_uses_defaults_and_env() {
    let config = load_config_with("nonexistent.toml", full_env()).unwrap();
    assert_eq!(config.chain.rpc_url, "http://127.0.0.1:8545");
    assert_eq!(config.exporter.poll_interval_secs, 5);
    assert_eq!(config.metrics.bind_address, "0.0.0.0:58000");
    assert_eq!(config.contracts.escrow.address.as_deref(), Some(ESCROW));
  }

  #[test]
  fn test_missing_address_is_rejected() {
    let err = load_config_with(
      "nonexistent.toml",
      env_of(&[("MY_TOKEN_ADDR", TOKEN), ("ESCROW_ADDR", ESCROW)]),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Missing("contracts.cash.address")));
  }

  #[test]
  fn test_malformed_address_is_rejected() {
    let err = load_config_with(
      "nonexistent.toml",
      env_of(&[
        ("MY_TOKEN_ADDR", "0x1234"),
        ("ESCROW_ADDR", ESCROW),
        ("CASH_ADDR", CASH),
      ]),
    )
    .unwrap_err();
    assert!(matches!(
      err,
      ConfigError::Invalid {
        field: "contracts.my_token.address",
        ..
      }
    ));
  }

  #[test]
  fn test_file_values_and_env_precedence() {
    let mut config: AppConfig = toml::from_str(&format!(
      r#"
        [exporter]
        poll_interval_secs = 2

        [chain]
        rpc_url = "http://node:8545"

        [contracts.escrow]
        address = "{ESCROW}"
        abi_path = "abi/escrow.json"
      "#
    ))
    .unwrap();
    apply_env_overrides(&mut config, env_of(&[("RPC_URL", "ws://other:8546")]));

    assert_eq!(config.exporter.poll_interval_secs, 2);
    assert_eq!(config.exporter.log_level, "info");
    assert_eq!(config.chain.rpc_url, "ws://other:8546");
    assert_eq!(config.contracts.escrow.abi_path, "abi/escrow.json");
    assert_eq!(
      config.contracts.cash.abi_path,
      "contracts_abi/TotalModule#Cash.json"
    );
  }

  #[test]
  fn test_zero_interval_is_rejected() {
    let mut config = AppConfig::default();
    apply_env_overrides(&mut config, full_env());
    config.exporter.poll_interval_secs = 0;
    assert!(validate_config(&config).is_err());
  }
}
