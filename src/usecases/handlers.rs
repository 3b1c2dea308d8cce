//! Event Handlers - Event to Metric Batch Translation
//!
//! One handler per event kind. Handlers describe their effect as a
//! `MetricBatch`; the poller applies it to the store atomically.
//! Only the mint handler performs I/O: it refreshes the on-chain
//! total supply, and a failure of that read never blocks the ledger
//! update it accompanies.
//!
//! | Event         | Batch                                              |
//! |---------------|----------------------------------------------------|
//! | EscrowCreated | escrow_created_total += 1                          |
//! | Minted        | mint(amount) [+ set my_token_total_supply]         |
//! | Burned        | burn(amount)                                       |
//! | CashCharged   | cash_charged_total += 1                            |
//! | CashWithdrawn | cash_withdrawn_total += 1                          |

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::event::{ArgValue, EventKind, EventRecord};
use crate::domain::metric::names;
use crate::domain::MetricBatch;
use crate::error::HandlerError;
use crate::ports::supply_reader::SupplyReader;

/// Argument carrying the token amount on Minted/Burned.
const AMOUNT_ARG: &str = "amount";

/// Translates one event kind into store operations.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
  /// The kind this handler accepts.
  fn kind(&self) -> EventKind;

  /// Pure translation of a record into a batch.
  fn translate(&self, record: &EventRecord) -> Result<MetricBatch, HandlerError>;

  /// Produce the batch for a record. Handlers that need external
  /// reads override this; the default is `translate`.
  async fn handle(&self, record: &EventRecord) -> Result<MetricBatch, HandlerError> {
    self.translate(record)
  }
}

fn ensure_kind(expected: EventKind, record: &EventRecord) -> Result<(), HandlerError> {
  if record.kind() == expected {
    Ok(())
  } else {
    Err(HandlerError::WrongKind {
      expected,
      actual: record.kind(),
    })
  }
}

/// Read the `amount` argument. A missing argument counts as zero.
pub fn extract_amount(record: &EventRecord) -> Result<u128, HandlerError> {
  let Some(value) = record.arg(AMOUNT_ARG) else {
    debug!(kind = %record.kind(), "Event has no amount argument, using 0");
    return Ok(0);
  };
  let ArgValue::Uint(raw) = value else {
    return Err(HandlerError::BadArgument {
      kind: record.kind(),
      field: AMOUNT_ARG,
      expected: "uint",
      found: value.type_name(),
    });
  };
  u128::try_from(*raw).map_err(|_| HandlerError::AmountOutOfRange {
    kind: record.kind(),
    value: raw.to_string(),
  })
}

// ────────────────────────────────────────────
// Counting handlers
// ────────────────────────────────────────────

/// Increments a counter by one per event.
#[derive(Debug, Clone, Copy)]
pub struct CountingHandler {
  kind: EventKind,
  metric: &'static str,
}

impl CountingHandler {
  pub const fn new(kind: EventKind, metric: &'static str) -> Self {
    Self { kind, metric }
  }
}

#[async_trait]
impl EventHandler for CountingHandler {
  fn kind(&self) -> EventKind {
    self.kind
  }

  fn translate(&self, record: &EventRecord) -> Result<MetricBatch, HandlerError> {
    ensure_kind(self.kind, record)?;
    Ok(MetricBatch::new().increment(self.metric, 1))
  }
}

// ────────────────────────────────────────────
// Supply handlers
// ────────────────────────────────────────────

/// Handles `Minted`: adds to the minted total and refreshes the
/// on-chain total supply gauge.
pub struct MintHandler {
  supply: Option<Arc<dyn SupplyReader>>,
}

impl MintHandler {
  /// Mint handler with an on-chain supply refresh.
  pub fn new(supply: Arc<dyn SupplyReader>) -> Self {
    Self {
      supply: Some(supply),
    }
  }

  /// Mint handler that only updates the ledger.
  pub const fn without_supply_refresh() -> Self {
    Self { supply: None }
  }
}

#[async_trait]
impl EventHandler for MintHandler {
  fn kind(&self) -> EventKind {
    EventKind::Minted
  }

  fn translate(&self, record: &EventRecord) -> Result<MetricBatch, HandlerError> {
    ensure_kind(EventKind::Minted, record)?;
    Ok(MetricBatch::new().mint(extract_amount(record)?))
  }

  async fn handle(&self, record: &EventRecord) -> Result<MetricBatch, HandlerError> {
    let mut batch = self.translate(record)?;

    let Some(reader) = &self.supply else {
      return Ok(batch);
    };

    match reader.total_supply().await {
      Ok(total) => match u128::try_from(total).ok().and_then(|v| i128::try_from(v).ok()) {
        Some(value) => {
          batch = batch.set(names::MY_TOKEN_TOTAL_SUPPLY, value);
        }
        None => warn!(total = %total, "Total supply exceeds gauge range, not refreshed"),
      },
      Err(e) => {
        warn!(error = %e, "Total supply refresh failed, applying mint without it");
      }
    }

    Ok(batch)
  }
}

/// Handles `Burned`: adds to the burned total.
#[derive(Debug, Clone, Copy, Default)]
pub struct BurnHandler;

#[async_trait]
impl EventHandler for BurnHandler {
  fn kind(&self) -> EventKind {
    EventKind::Burned
  }

  fn translate(&self, record: &EventRecord) -> Result<MetricBatch, HandlerError> {
    ensure_kind(EventKind::Burned, record)?;
    Ok(MetricBatch::new().burn(extract_amount(record)?))
  }
}

/// Build the handler for `kind`. The supply reader is only used by
/// the mint handler.
pub fn handler_for(
  kind: EventKind,
  supply: Option<Arc<dyn SupplyReader>>,
) -> Arc<dyn EventHandler> {
  match kind {
    EventKind::EscrowCreated => Arc::new(CountingHandler::new(kind, names::ESCROW_CREATED_TOTAL)),
    EventKind::CashCharged => Arc::new(CountingHandler::new(kind, names::CASH_CHARGED_TOTAL)),
    EventKind::CashWithdrawn => Arc::new(CountingHandler::new(kind, names::CASH_WITHDRAWN_TOTAL)),
    EventKind::Minted => match supply {
      Some(reader) => Arc::new(MintHandler::new(reader)),
      None => Arc::new(MintHandler::without_supply_refresh()),
    },
    EventKind::Burned => Arc::new(BurnHandler),
  }
}

#[cfg(test)]
mod tests {
  use alloy::primitives::{Address, U256};

  use super::*;
  use crate::domain::{LogPosition, MetricOp};
  use crate::error::ExternalReadError;

  fn record(kind: EventKind, args: Vec<(&str, ArgValue)>) -> EventRecord {
    EventRecord::new(
      kind,
      args.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
      LogPosition::default(),
    )
  }

  struct FixedSupply(Result<u64, &'static str>);

  #[async_trait]
  impl SupplyReader for FixedSupply {
    async fn total_supply(&self) -> Result<U256, ExternalReadError> {
      self.0.map(U256::from).map_err(|reason| ExternalReadError {
        contract: "MyToken".into(),
        call: "totalSupply",
        reason: reason.into(),
      })
    }
  }

  #[test]
  fn test_counting_handler_increments_by_one() {
    let handler = CountingHandler::new(EventKind::EscrowCreated, names::ESCROW_CREATED_TOTAL);
    let batch = handler
      .translate(&record(EventKind::EscrowCreated, vec![("id", ArgValue::Uint(U256::from(1)))]))
      .unwrap();
    assert_eq!(
      batch.ops(),
      &[MetricOp::Increment {
        name: names::ESCROW_CREATED_TOTAL,
        delta: 1
      }]
    );
  }

  #[test]
  fn test_wrong_kind_is_rejected() {
    let err = BurnHandler.translate(&record(EventKind::Minted, vec![])).unwrap_err();
    assert!(matches!(
      err,
      HandlerError::WrongKind {
        expected: EventKind::Burned,
        actual: EventKind::Minted
      }
    ));
  }

  #[test]
  fn test_missing_amount_is_zero() {
    let batch = BurnHandler.translate(&record(EventKind::Burned, vec![])).unwrap();
    assert_eq!(batch.ops(), &[MetricOp::Burn { amount: 0 }]);
  }

  #[test]
  fn test_non_integer_amount_is_rejected() {
    let err = BurnHandler
      .translate(&record(
        EventKind::Burned,
        vec![("amount", ArgValue::Address(Address::ZERO))],
      ))
      .unwrap_err();
    assert!(matches!(err, HandlerError::BadArgument { found: "address", .. }));
  }

  #[test]
  fn test_amount_beyond_u128_is_rejected() {
    let err = BurnHandler
      .translate(&record(EventKind::Burned, vec![("amount", ArgValue::Uint(U256::MAX))]))
      .unwrap_err();
    assert!(matches!(err, HandlerError::AmountOutOfRange { .. }));
  }

  #[tokio::test]
  async fn test_mint_refreshes_total_supply() {
    let handler = MintHandler::new(Arc::new(FixedSupply(Ok(500))));
    let batch = handler
      .handle(&record(EventKind::Minted, vec![("amount", ArgValue::Uint(U256::from(100)))]))
      .await
      .unwrap();
    assert_eq!(
      batch.ops(),
      &[
        MetricOp::Mint { amount: 100 },
        MetricOp::Set {
          name: names::MY_TOKEN_TOTAL_SUPPLY,
          value: 500
        }
      ]
    );
  }

  #[tokio::test]
  async fn test_mint_survives_supply_read_failure() {
    let handler = MintHandler::new(Arc::new(FixedSupply(Err("node down"))));
    let batch = handler
      .handle(&record(EventKind::Minted, vec![("amount", ArgValue::Uint(U256::from(7)))]))
      .await
      .unwrap();
    assert_eq!(batch.ops(), &[MetricOp::Mint { amount: 7 }]);
  }

  #[test]
  fn test_handler_for_covers_every_kind() {
    for kind in EventKind::ALL {
      assert_eq!(handler_for(kind, None).kind(), kind);
    }
  }
}
