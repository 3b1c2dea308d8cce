//! Token supply ledger.
//!
//! Tracks minted and burned totals observed from events and derives
//! the circulating supply from them. The ledger is a plain value: every
//! mutation produces a new ledger or fails without touching the old one,
//! so callers can validate a whole batch before committing it.

/// Consistent view of the supply triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupplySnapshot {
    pub minted: u128,
    pub burned: u128,
    pub circulating: i128,
}

/// Running minted/burned totals.
///
/// Circulating supply is signed: burns observed for tokens minted before
/// the exporter started can push it below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupplyLedger {
    minted: u128,
    burned: u128,
}

impl SupplyLedger {
    pub const fn new() -> Self {
        Self {
            minted: 0,
            burned: 0,
        }
    }

    /// Ledger after a mint of `amount`, or `None` on overflow.
    pub fn checked_mint(self, amount: u128) -> Option<Self> {
        let next = Self {
            minted: self.minted.checked_add(amount)?,
            ..self
        };
        next.circulating().map(|_| next)
    }

    /// Ledger after a burn of `amount`, or `None` on overflow.
    pub fn checked_burn(self, amount: u128) -> Option<Self> {
        let next = Self {
            burned: self.burned.checked_add(amount)?,
            ..self
        };
        next.circulating().map(|_| next)
    }

    /// `minted - burned`, or `None` if it does not fit an `i128`.
    pub fn circulating(&self) -> Option<i128> {
        let minted = i128::try_from(self.minted).ok()?;
        let burned = i128::try_from(self.burned).ok()?;
        minted.checked_sub(burned)
    }

    /// Snapshot of the triple. Every reachable ledger has a representable
    /// circulating value because the checked constructors refuse others.
    pub fn snapshot(&self) -> SupplySnapshot {
        SupplySnapshot {
            minted: self.minted,
            burned: self.burned,
            circulating: self.circulating().unwrap_or_default(),
        }
    }
}
