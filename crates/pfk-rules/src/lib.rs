//! pfk-rules
//!
//! Pure rule kernels for the evaluation engine:
//! - Drawdown calculator (daily + maximum, static/trailing reference)
//! - Phase progress evaluator (profit target, trading days, consistency,
//!   time limit)
//!
//! Deterministic, pure logic. No IO, no time, no storage. Callers supply
//! every input; outputs are plain reports the orchestrator acts on.

mod drawdown;
mod progress;

pub use drawdown::{assess_drawdown, DrawdownInput, DrawdownLimits, DrawdownReport};
pub use progress::{evaluate_progress, ProgressCriteria, ProgressInput, ProgressReport, UnmetCriterion};
