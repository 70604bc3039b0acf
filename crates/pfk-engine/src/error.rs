use pfk_ledger::LedgerError;
use pfk_schemas::{PhaseStatus, PhaseType};

/// Errors surfaced by engine operations.
///
/// Drawdown breaches and unmet progress criteria are *not* errors — they are
/// recorded state transitions carried on the [`Outcome`](crate::Outcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Trade or evaluation against a phase that is not Active. A breached
    /// account surfaces this, not a generic failure.
    PhaseNotActive { status: PhaseStatus },
    /// Malformed trade data; rejected before any state mutation.
    InvalidTrade(LedgerError),
    /// The trade's durable sequence position is not past the last committed
    /// one. Applying it would recompute committed state; the caller must
    /// treat this as a conflict, never reorder.
    SequenceConflict { supplied: u64, last: u64 },
    /// Two units of work for the same account raced past the exclusion
    /// scope and bounded retries were exhausted.
    ConcurrencyConflict { retries: u32 },
    /// Manual reset requested without the account-level permission flag.
    ResetNotPermitted,
    /// Reset requested while a non-funded phase is still running.
    PhaseStillActive,
    /// The program rule set has no entry for this phase type.
    RulesMissing { phase_type: PhaseType },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PhaseNotActive { status } => {
                write!(f, "phase is {}, not ACTIVE", status.as_str())
            }
            Self::InvalidTrade(e) => write!(f, "invalid trade data: {e}"),
            Self::SequenceConflict { supplied, last } => {
                write!(f, "sequence conflict: seq {supplied} not past committed {last}")
            }
            Self::ConcurrencyConflict { retries } => {
                write!(f, "concurrency conflict after {retries} retries")
            }
            Self::ResetNotPermitted => write!(f, "manual reset not permitted for this account"),
            Self::PhaseStillActive => write!(f, "cannot reset while the phase is still active"),
            Self::RulesMissing { phase_type } => {
                write!(f, "program rules missing for phase type {}", phase_type.as_str())
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::PhaseNotActive { status } => EngineError::PhaseNotActive { status },
            LedgerError::StaleSequence { supplied, last } => {
                EngineError::SequenceConflict { supplied, last }
            }
            other => EngineError::InvalidTrade(other),
        }
    }
}
