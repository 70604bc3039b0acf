//! pfk-engine
//!
//! The phase transition engine: orchestrates ledger update → drawdown check
//! → breach handling → progress check → phase creation / promotion, plus the
//! daily-anchor manager and the reset path.
//!
//! # Design
//!
//! Every operation here is pure: it takes the current snapshots (account,
//! phase, anchor, rules) and returns an [`Outcome`] — the updated rows, the
//! append-only records to insert, and the events to publish. A store
//! (pfk-db's Postgres transaction, pfk-testkit's in-memory store) commits
//! the whole outcome atomically or not at all; the engine itself never
//! touches IO, time sources, or storage.
//!
//! Breach detection is fatal and immediate — once a phase fails, no progress
//! check runs and no further trade is accepted against it. Breach and
//! progress outcomes are business results, never errors.

mod anchor;
mod error;
mod evaluate;
mod outcome;
mod reset;
mod snapshot;

pub use anchor::ensure_anchor;
pub use error::EngineError;
pub use evaluate::{evaluate_phase, evaluate_trade};
pub use outcome::{EngineEvent, Outcome};
pub use reset::{plan_reset, ResetOutcome, ResetRequest};
pub use snapshot::{phase_snapshot, PhaseSnapshot};

/// Actor string recorded on transitions written by the engine itself.
pub const ENGINE_ACTOR: &str = "engine";
