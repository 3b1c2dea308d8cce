//! Log Filter Source - `eth_newFilter` / `eth_getFilterChanges` Streams
//!
//! Implements the `EventSource` port for one (contract, event) pair.
//! The node-side filter starts at `latest`, so only events emitted
//! after installation are seen; nothing is backfilled and a restart
//! re-reads whatever the node still returns for a fresh filter.
//!
//! Logs are decoded against the ABI event definition and returned in
//! chain order. A log that cannot be decoded is logged and dropped
//! without failing the poll.

use std::sync::Arc;

use alloy::dyn_abi::{DynSolValue, EventExt};
use alloy::eips::BlockNumberOrTag;
use alloy::json_abi::Event;
use alloy::primitives::{Address, Bytes, LogData, U256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::domain::event::{ArgValue, EventKind, EventRecord, LogPosition, StreamCursor};
use crate::error::{HandlerError, SourceError};
use crate::ports::event_source::EventSource;

use super::provider::RpcProvider;

/// Decode raw log data into an `EventRecord`.
///
/// Indexed and non-indexed parameters come back from the decoder in
/// two lists; they are merged back into declaration order. Unnamed
/// parameters are called `arg{i}`.
pub fn decode_log(
    kind: EventKind,
    event: &Event,
    data: &LogData,
    position: LogPosition,
) -> Result<EventRecord, HandlerError> {
    let decode_error = |reason: String| HandlerError::Decode { kind, reason };
    let decoded = event
        .decode_log(data, true)
        .map_err(|e| decode_error(e.to_string()))?;

    let mut indexed = decoded.indexed.into_iter();
    let mut body = decoded.body.into_iter();
    let mut args = Vec::with_capacity(event.inputs.len());

    for (i, input) in event.inputs.iter().enumerate() {
        let value = if input.indexed {
            indexed.next()
        } else {
            body.next()
        }
        .ok_or_else(|| decode_error(format!("missing value for parameter {i}")))?;

        let name = if input.name.is_empty() {
            format!("arg{i}")
        } else {
            input.name.clone()
        };
        args.push((name, arg_value(value)));
    }

    Ok(EventRecord::new(kind, args, position))
}

fn arg_value(value: DynSolValue) -> ArgValue {
    match value {
        DynSolValue::Uint(v, _) => ArgValue::Uint(v),
        DynSolValue::Int(v, _) => ArgValue::Int(v),
        DynSolValue::Address(a) => ArgValue::Address(a),
        DynSolValue::Bool(b) => ArgValue::Bool(b),
        DynSolValue::String(s) => ArgValue::String(s),
        DynSolValue::Bytes(b) => ArgValue::Bytes(Bytes::from(b)),
        DynSolValue::FixedBytes(word, size) => {
            ArgValue::Bytes(Bytes::copy_from_slice(&word[..size]))
        }
        // Arrays, tuples and function pointers are not used by any
        // handler; keep a readable rendering for the logs.
        other => ArgValue::String(format!("{other:?}")),
    }
}

/// Polls one contract event through a node-side log filter.
pub struct LogFilterSource {
    /// Shared RPC provider.
    provider: Arc<RpcProvider>,
    /// Event kind this stream yields.
    kind: EventKind,
    /// Emitting contract.
    address: Address,
    /// ABI definition used for topic selection and decoding.
    event: Event,
    /// Installed filter id; `None` until installed.
    filter_id: Option<U256>,
    /// Delivery high-water mark.
    cursor: StreamCursor,
    /// Undecodable logs not yet reported to the poller.
    rejected: usize,
}

impl LogFilterSource {
    /// Create the source and install its filter.
    ///
    /// Called at startup; an error here means the node rejected the
    /// filter and is treated as a configuration failure by the caller.
    #[instrument(skip(provider, event), fields(stream = kind.stream_name()))]
    pub async fn install(
        provider: Arc<RpcProvider>,
        kind: EventKind,
        address: Address,
        event: Event,
    ) -> Result<Self, SourceError> {
        let mut source = Self {
            provider,
            kind,
            address,
            event,
            filter_id: None,
            cursor: StreamCursor::default(),
            rejected: 0,
        };
        source.install_filter().await?;
        Ok(source)
    }

    fn filter(&self) -> Filter {
        Filter::new()
            .address(self.address)
            .event_signature(self.event.selector())
            .from_block(BlockNumberOrTag::Latest)
    }

    fn unavailable(&self, reason: String) -> SourceError {
        SourceError::Unavailable {
            stream: self.kind.stream_name(),
            reason,
        }
    }

    async fn install_filter(&mut self) -> Result<(), SourceError> {
        let id = self
            .provider
            .new_filter(&self.filter())
            .await
            .map_err(|e| self.unavailable(format!("eth_newFilter failed: {e}")))?;
        self.filter_id = Some(id);
        info!(filter_id = %id, address = %self.address, "Log filter installed");
        Ok(())
    }

    fn decode(&self, log: &Log) -> Option<EventRecord> {
        let position = LogPosition {
            block_number: log.block_number,
            log_index: log.log_index,
            tx_hash: log.transaction_hash,
        };
        match decode_log(self.kind, &self.event, &log.inner.data, position) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    stream = self.kind.stream_name(),
                    tx_hash = ?position.tx_hash,
                    error = %e,
                    "Failed to decode log, skipping"
                );
                None
            }
        }
    }

    fn decode_all(&mut self, logs: &[Log]) -> Vec<EventRecord> {
        let mut records = Vec::with_capacity(logs.len());
        for log in logs {
            if log.removed {
                debug!(tx_hash = ?log.transaction_hash, "Ignoring removed log");
                continue;
            }
            match self.decode(log) {
                Some(record) => records.push(record),
                None => self.rejected += 1,
            }
        }
        records
    }
}

#[async_trait]
impl EventSource for LogFilterSource {
    fn stream(&self) -> &'static str {
        self.kind.stream_name()
    }

    fn kind(&self) -> EventKind {
        self.kind
    }

    async fn poll(&mut self) -> Result<Vec<EventRecord>, SourceError> {
        let id = self
            .filter_id
            .ok_or_else(|| self.unavailable("filter not installed".to_string()))?;

        let logs: Vec<Log> = self
            .provider
            .get_filter_changes(id)
            .await
            .map_err(|e| self.unavailable(format!("eth_getFilterChanges failed: {e}")))?;

        let mut records = self.decode_all(&logs);
        records.sort_by_key(|r| r.position().order_key());

        let behind = self.cursor.advance(&records);
        if behind > 0 {
            warn!(
                stream = self.kind.stream_name(),
                behind,
                cursor = ?self.cursor.position(),
                "Received logs older than the cursor"
            );
        }

        Ok(records)
    }

    async fn reinstall(&mut self) -> Result<(), SourceError> {
        if let Some(old) = self.filter_id.take() {
            // The node has usually dropped it already.
            if let Err(e) = self.provider.uninstall_filter(old).await {
                debug!(filter_id = %old, error = %e, "Old filter uninstall failed");
            }
        }
        self.install_filter().await
    }

    fn take_rejected(&mut self) -> usize {
        std::mem::take(&mut self.rejected)
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, B256};

    use super::*;

    fn minted() -> Event {
        Event::parse("event Minted(address indexed to, uint256 amount)").unwrap()
    }

    fn minted_log(to: Address, amount: u64) -> LogData {
        LogData::new_unchecked(
            vec![minted().selector(), to.into_word()],
            U256::from(amount).to_be_bytes_vec().into(),
        )
    }

    #[test]
    fn test_decode_merges_indexed_and_body() {
        let to = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
        let position = LogPosition {
            block_number: Some(12),
            log_index: Some(3),
            tx_hash: Some(B256::ZERO),
        };
        let record =
            decode_log(EventKind::Minted, &minted(), &minted_log(to, 100), position).unwrap();

        let args: Vec<_> = record.args().map(|(n, v)| (n.to_string(), v.clone())).collect();
        assert_eq!(
            args,
            vec![
                ("to".to_string(), ArgValue::Address(to)),
                ("amount".to_string(), ArgValue::Uint(U256::from(100))),
            ]
        );
        assert_eq!(record.position().order_key(), (12, 3));
    }

    #[test]
    fn test_decode_rejects_foreign_topic() {
        let mut data = minted_log(Address::ZERO, 1);
        let topics = vec![B256::repeat_byte(0xab), Address::ZERO.into_word()];
        data = LogData::new_unchecked(topics, data.data.clone());
        let err = decode_log(EventKind::Minted, &minted(), &data, LogPosition::default())
            .unwrap_err();
        assert!(matches!(
            err,
            HandlerError::Decode {
                kind: EventKind::Minted,
                ..
            }
        ));
    }

    #[test]
    fn test_unnamed_parameters_get_positional_names() {
        let event = Event::parse("event EscrowCreated(uint256)").unwrap();
        let data = LogData::new_unchecked(
            vec![event.selector()],
            U256::from(9).to_be_bytes_vec().into(),
        );
        let record =
            decode_log(EventKind::EscrowCreated, &event, &data, LogPosition::default()).unwrap();
        assert_eq!(record.arg("arg0"), Some(&ArgValue::Uint(U256::from(9))));
    }
}
