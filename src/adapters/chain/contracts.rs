//! Contract Bindings - ABI Artifacts, Deployment Checks, Supply Reads
//!
//! Loads each watched contract's JSON ABI (Hardhat/Ignition artifact or
//! bare ABI array), resolves the event definitions the streams need,
//! verifies the configured addresses have code, and implements the
//! `SupplyReader` port over `totalSupply()`.

use std::path::Path;
use std::sync::Arc;

use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Event, Function, JsonAbi};
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::config::ContractConfig;
use crate::config::loader::contract_address;
use crate::domain::EventKind;
use crate::error::{ConfigError, ExternalReadError};
use crate::ports::supply_reader::SupplyReader;

use super::provider::RpcProvider;

const TOTAL_SUPPLY: &str = "totalSupply";

/// Parse an ABI from artifact JSON. Accepts `{ "abi": [...] }` as
/// written by Hardhat, or the bare array.
pub fn parse_abi(contract: &str, json: &str) -> Result<JsonAbi, ConfigError> {
    let abi_error = |reason: String| ConfigError::Abi {
        contract: contract.to_string(),
        reason,
    };

    let mut value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| abi_error(format!("invalid JSON: {e}")))?;
    if let Some(abi) = value.get_mut("abi") {
        value = abi.take();
    }
    serde_json::from_value(value).map_err(|e| abi_error(format!("invalid ABI: {e}")))
}

/// A configured, ABI-resolved contract.
#[derive(Debug, Clone)]
pub struct WatchedContract {
    /// Display name (e.g. "MyToken").
    pub name: &'static str,
    /// Deployed address.
    pub address: Address,
    /// Parsed ABI.
    pub abi: JsonAbi,
}

impl WatchedContract {
    /// Resolve address and ABI from config.
    pub fn load(
        name: &'static str,
        address_field: &'static str,
        config: &ContractConfig,
    ) -> Result<Self, ConfigError> {
        let address = contract_address(address_field, config)?;
        let json = std::fs::read_to_string(Path::new(&config.abi_path)).map_err(|e| {
            ConfigError::Abi {
                contract: name.to_string(),
                reason: format!("cannot read {}: {e}", config.abi_path),
            }
        })?;
        let abi = parse_abi(name, &json)?;

        info!(
            contract = name,
            address = %address,
            abi_path = %config.abi_path,
            events = abi.events.len(),
            "Loaded contract ABI"
        );

        Ok(Self { name, address, abi })
    }

    /// Event definition for `kind`.
    pub fn event(&self, kind: EventKind) -> Result<Event, ConfigError> {
        self.abi
            .event(kind.abi_name())
            .and_then(|overloads| overloads.first())
            .cloned()
            .ok_or_else(|| ConfigError::Abi {
                contract: self.name.to_string(),
                reason: format!("event {} not found", kind.abi_name()),
            })
    }

    /// Function definition by name.
    pub fn function(&self, name: &str) -> Result<Function, ConfigError> {
        self.abi
            .function(name)
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.is_empty()))
            .cloned()
            .ok_or_else(|| ConfigError::Abi {
                contract: self.name.to_string(),
                reason: format!("function {name}() not found"),
            })
    }

    /// Fail if there is no code at the configured address.
    #[instrument(skip_all, fields(contract = self.name, address = %self.address))]
    pub async fn ensure_deployed(&self, provider: &RpcProvider) -> Result<(), ConfigError> {
        let code = provider
            .get_code_at(self.address)
            .await
            .map_err(|e| ConfigError::NodeUnreachable {
                url: "configured rpc".to_string(),
                reason: format!("eth_getCode for {} failed: {e}", self.name),
            })?;

        if code.is_empty() {
            return Err(ConfigError::NoCode {
                contract: self.name.to_string(),
                address: self.address.to_string(),
            });
        }

        info!("Validated on-chain");
        Ok(())
    }
}

/// `SupplyReader` over the token's `totalSupply()` view.
pub struct TokenSupply {
    /// Shared RPC provider.
    provider: Arc<RpcProvider>,
    /// Token contract name, for errors.
    contract: &'static str,
    /// Token address.
    address: Address,
    /// `totalSupply()` from the ABI.
    function: Function,
}

impl TokenSupply {
    /// Bind to the token's `totalSupply()`; fails if the ABI lacks it.
    pub fn new(provider: Arc<RpcProvider>, token: &WatchedContract) -> Result<Self, ConfigError> {
        Ok(Self {
            provider,
            contract: token.name,
            address: token.address,
            function: token.function(TOTAL_SUPPLY)?,
        })
    }

    fn read_error(&self, reason: String) -> ExternalReadError {
        ExternalReadError {
            contract: self.contract.to_string(),
            call: TOTAL_SUPPLY,
            reason,
        }
    }
}

#[async_trait]
impl SupplyReader for TokenSupply {
    #[instrument(skip(self), fields(contract = self.contract))]
    async fn total_supply(&self) -> Result<U256, ExternalReadError> {
        let calldata = self
            .function
            .abi_encode_input(&[])
            .map_err(|e| self.read_error(format!("encode failed: {e}")))?;

        let tx = TransactionRequest::default()
            .to(self.address)
            .input(Bytes::from(calldata).into());

        let output = self
            .provider
            .call(&tx)
            .await
            .map_err(|e| self.read_error(e.to_string()))?;

        let values = self
            .function
            .abi_decode_output(&output, true)
            .map_err(|e| self.read_error(format!("decode failed: {e}")))?;

        values
            .first()
            .and_then(DynSolValue::as_uint)
            .map(|(value, _)| value)
            .ok_or_else(|| self.read_error("returned no uint".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN_ARTIFACT: &str = r#"{
        "_format": "hh3-artifact-1",
        "contractName": "MyToken",
        "abi": [
            {
                "type": "event",
                "name": "Minted",
                "anonymous": false,
                "inputs": [
                    { "name": "to", "type": "address", "indexed": true, "internalType": "address" },
                    { "name": "amount", "type": "uint256", "indexed": false, "internalType": "uint256" }
                ]
            },
            {
                "type": "function",
                "name": "totalSupply",
                "stateMutability": "view",
                "inputs": [],
                "outputs": [ { "name": "", "type": "uint256", "internalType": "uint256" } ]
            }
        ]
    }"#;

    fn token() -> WatchedContract {
        WatchedContract {
            name: "MyToken",
            address: Address::ZERO,
            abi: parse_abi("MyToken", TOKEN_ARTIFACT).unwrap(),
        }
    }

    #[test]
    fn test_parse_artifact_and_bare_abi() {
        let abi = parse_abi("MyToken", TOKEN_ARTIFACT).unwrap();
        assert!(abi.event("Minted").is_some());

        let bare = serde_json::to_string(&abi).unwrap();
        let again = parse_abi("MyToken", &bare).unwrap();
        assert!(again.function("totalSupply").is_some());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        assert!(matches!(
            parse_abi("Cash", "{ not json"),
            Err(ConfigError::Abi { .. })
        ));
    }

    #[test]
    fn test_event_lookup() {
        let token = token();
        let minted = token.event(EventKind::Minted).unwrap();
        assert_eq!(minted.inputs.len(), 2);
        assert!(matches!(
            token.event(EventKind::Burned),
            Err(ConfigError::Abi { .. })
        ));
    }

    #[test]
    fn test_total_supply_function_lookup() {
        let token = token();
        assert_eq!(token.function(TOTAL_SUPPLY).unwrap().outputs.len(), 1);
        assert!(token.function("balanceOf").is_err());
    }
}
