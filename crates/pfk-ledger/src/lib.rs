//! pfk-ledger
//!
//! The trade ledger: applies one trade's realized P&L to the currently
//! active phase, atomically. This crate owns the invariant-checking
//! boundary — validation happens before any field moves, so a rejected
//! trade leaves the phase untouched.
//!
//! # Determinism
//! Pure logic, no IO, no time, no randomness. Two phases fed the same trade
//! sequence always end in identical state.

mod apply;
mod pnl;

pub use apply::{apply_trade, AppliedTrade};
pub use pnl::{realized_pnl, validate};

use pfk_schemas::PhaseStatus;

/// All invariant violations the ledger can surface.
///
/// The first three groups are `InvalidTradeData` in the external taxonomy;
/// `PhaseNotActive` and `StaleSequence` carry their own meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Trade submitted against a phase that is not Active.
    PhaseNotActive { status: PhaseStatus },
    /// `qty` must be strictly positive.
    NonPositiveQty { qty: i64 },
    /// Entry/exit price must be strictly positive.
    NonPositivePrice { price_micros: i64 },
    /// Fees and commission must be non-negative.
    NegativeFee { fee_micros: i64 },
    /// Symbol must be non-empty.
    EmptySymbol,
    /// Exit price and exit time must be supplied together.
    IncompleteExit,
    /// Exit time precedes entry time.
    ExitBeforeEntry,
    /// Sequence position is not strictly greater than the last applied one.
    /// Applying it would require recomputing committed state; rejected,
    /// never reordered.
    StaleSequence { supplied: u64, last: u64 },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PhaseNotActive { status } => {
                write!(f, "trade rejected: phase is {}, not ACTIVE", status.as_str())
            }
            Self::NonPositiveQty { qty } => {
                write!(f, "ledger invariant: qty must be > 0, got {qty}")
            }
            Self::NonPositivePrice { price_micros } => {
                write!(f, "ledger invariant: price_micros must be > 0, got {price_micros}")
            }
            Self::NegativeFee { fee_micros } => {
                write!(f, "ledger invariant: fee_micros must be >= 0, got {fee_micros}")
            }
            Self::EmptySymbol => write!(f, "ledger invariant: symbol must not be empty"),
            Self::IncompleteExit => {
                write!(f, "ledger invariant: exit price and exit time must be supplied together")
            }
            Self::ExitBeforeEntry => write!(f, "ledger invariant: exit_time < entry_time"),
            Self::StaleSequence { supplied, last } => {
                write!(f, "ledger invariant: seq {supplied} is not > last applied {last}")
            }
        }
    }
}

impl std::error::Error for LedgerError {}

impl LedgerError {
    /// True for the malformed-data family (rejected before any state mutation).
    pub fn is_invalid_trade_data(&self) -> bool {
        matches!(
            self,
            Self::NonPositiveQty { .. }
                | Self::NonPositivePrice { .. }
                | Self::NegativeFee { .. }
                | Self::EmptySymbol
                | Self::IncompleteExit
                | Self::ExitBeforeEntry
        )
    }
}
