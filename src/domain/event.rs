//! On-chain event records.
//!
//! An `EventRecord` is the decoded form of a single contract log:
//! the event kind, its arguments in ABI declaration order, and the
//! chain position it was observed at. Records are created by an
//! event source adapter and are read-only afterwards.

use std::fmt;

use alloy::primitives::{Address, Bytes, B256, I256, U256};

// ────────────────────────────────────────────
// Event kinds
// ────────────────────────────────────────────

/// Contract events the exporter knows how to turn into metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `Escrow.EscrowCreated`
    EscrowCreated,
    /// `MyToken.Minted`
    Minted,
    /// `MyToken.Burned`
    Burned,
    /// `Cash.CashCharged`
    CashCharged,
    /// `Cash.CashWithdrawn`
    CashWithdrawn,
}

impl EventKind {
    /// Every kind, in the order streams are started.
    pub const ALL: [Self; 5] = [
        Self::EscrowCreated,
        Self::Minted,
        Self::Burned,
        Self::CashCharged,
        Self::CashWithdrawn,
    ];

    /// Event name as declared in the contract ABI.
    pub const fn abi_name(self) -> &'static str {
        match self {
            Self::EscrowCreated => "EscrowCreated",
            Self::Minted => "Minted",
            Self::Burned => "Burned",
            Self::CashCharged => "CashCharged",
            Self::CashWithdrawn => "CashWithdrawn",
        }
    }

    /// Stream label used in logs and operational metrics.
    pub const fn stream_name(self) -> &'static str {
        match self {
            Self::EscrowCreated => "escrow_created",
            Self::Minted => "minted",
            Self::Burned => "burned",
            Self::CashCharged => "cash_charged",
            Self::CashWithdrawn => "cash_withdrawn",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abi_name())
    }
}

// ────────────────────────────────────────────
// Argument values
// ────────────────────────────────────────────

/// A decoded event argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Uint(U256),
    Int(I256),
    Address(Address),
    Bool(bool),
    String(String),
    Bytes(Bytes),
}

impl ArgValue {
    /// ABI-ish type name, for error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Uint(_) => "uint",
            Self::Int(_) => "int",
            Self::Address(_) => "address",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Address(a) => write!(f, "{a}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "{b}"),
        }
    }
}

// ────────────────────────────────────────────
// Positions and cursor
// ────────────────────────────────────────────

/// Where a log was observed on chain. Every field is optional because
/// pending logs and some node implementations omit them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogPosition {
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub tx_hash: Option<B256>,
}

impl LogPosition {
    /// Sort key for chain order: block first, then log index.
    /// Missing values sort last so unpositioned logs keep arrival order
    /// at the tail of a batch.
    pub fn order_key(&self) -> (u64, u64) {
        (
            self.block_number.unwrap_or(u64::MAX),
            self.log_index.unwrap_or(u64::MAX),
        )
    }
}

/// Marks how far a stream has delivered. Advanced by the adapter after
/// a successful poll; never rewound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamCursor {
    last: Option<(u64, u64)>,
    delivered: u64,
}

impl StreamCursor {
    /// Advance past a delivered batch. Returns how many records in the
    /// batch sit behind the previous high-water mark.
    pub fn advance(&mut self, records: &[EventRecord]) -> usize {
        let mut behind = 0;
        for record in records {
            let (Some(block), Some(index)) =
                (record.position.block_number, record.position.log_index)
            else {
                continue;
            };
            let key = (block, index);
            match self.last {
                Some(last) if key < last => behind += 1,
                _ => self.last = Some(key),
            }
        }
        self.delivered += records.len() as u64;
        behind
    }

    /// Highest (block, log index) delivered so far.
    pub const fn position(&self) -> Option<(u64, u64)> {
        self.last
    }

    /// Total records delivered through this cursor.
    pub const fn delivered(&self) -> u64 {
        self.delivered
    }
}

// ────────────────────────────────────────────
// Event record
// ────────────────────────────────────────────

/// One decoded contract event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    kind: EventKind,
    args: Vec<(String, ArgValue)>,
    position: LogPosition,
}

impl EventRecord {
    /// Build a record from arguments already in declaration order.
    pub fn new(
        kind: EventKind,
        args: Vec<(String, ArgValue)>,
        position: LogPosition,
    ) -> Self {
        Self {
            kind,
            args,
            position,
        }
    }

    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    pub const fn position(&self) -> &LogPosition {
        &self.position
    }

    /// Look up an argument by name.
    pub fn arg(&self, name: &str) -> Option<&ArgValue> {
        self.args
            .iter()
            .find(|(arg_name, _)| arg_name == name)
            .map(|(_, value)| value)
    }

    /// Arguments in declaration order.
    pub fn args(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.args.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind)?;
        for (i, (name, value)) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(block: u64, index: u64) -> EventRecord {
        EventRecord::new(
            EventKind::Minted,
            vec![],
            LogPosition {
                block_number: Some(block),
                log_index: Some(index),
                tx_hash: None,
            },
        )
    }

    #[test]
    fn test_arg_lookup_by_name() {
        let record = EventRecord::new(
            EventKind::Minted,
            vec![
                ("to".into(), ArgValue::Address(Address::ZERO)),
                ("amount".into(), ArgValue::Uint(U256::from(42))),
            ],
            LogPosition::default(),
        );
        assert_eq!(record.arg("amount"), Some(&ArgValue::Uint(U256::from(42))));
        assert!(record.arg("missing").is_none());
        let names: Vec<_> = record.args().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["to", "amount"]);
    }

    #[test]
    fn test_order_key_puts_unpositioned_last() {
        let unpositioned =
            EventRecord::new(EventKind::Minted, vec![], LogPosition::default());
        let mut records = vec![at(5, 1), unpositioned, at(4, 9)];
        records.sort_by_key(|r| r.position().order_key());
        assert_eq!(records[0].position().block_number, Some(4));
        assert_eq!(records[1].position().block_number, Some(5));
        assert_eq!(records[2].position().block_number, None);
    }

    #[test]
    fn test_cursor_advances_and_counts_stragglers() {
        let mut cursor = StreamCursor::default();
        assert_eq!(cursor.advance(&[at(10, 0), at(10, 3)]), 0);
        assert_eq!(cursor.position(), Some((10, 3)));
        assert_eq!(cursor.advance(&[at(9, 7), at(11, 0)]), 1);
        assert_eq!(cursor.position(), Some((11, 0)));
        assert_eq!(cursor.delivered(), 4);
    }

    #[test]
    fn test_display_lists_args() {
        let record = EventRecord::new(
            EventKind::Burned,
            vec![("amount".into(), ArgValue::Uint(U256::from(30)))],
            LogPosition::default(),
        );
        assert_eq!(record.to_string(), "Burned(amount=30)");
    }
}
