use pfk_ledger::AppliedTrade;
use pfk_rules::{DrawdownReport, ProgressReport};
use pfk_schemas::{
    Breach, BreachType, DailyAnchor, MasterAccount, PhaseAccount, PhaseStatus, Trade, Transition,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events published on every committed outcome.
///
/// Downstream read models (dashboards, alerting) subscribe to these instead
/// of the engine knowing about any cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    PhaseChanged {
        account_id: Uuid,
        phase_id: Uuid,
        status: PhaseStatus,
    },
    BreachRecorded {
        account_id: Uuid,
        phase_id: Uuid,
        breach_type: BreachType,
        amount_micros: i64,
    },
    AccountReset {
        account_id: Uuid,
        new_phase_id: Uuid,
    },
}

/// The full effect of one evaluation, to be committed atomically.
///
/// `phase_after` / `account_after` replace the rows they were built from;
/// everything else is an insert. An outcome with no breach, no transition
/// and no new phase is a plain ledger update (or, for manual evaluation,
/// a no-op).
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    /// The trade row to insert. None for manual (trade-less) evaluation.
    pub trade: Option<Trade>,
    pub applied: Option<AppliedTrade>,

    /// Drawdown assessment, present when equity was (re)checked.
    pub drawdown: Option<DrawdownReport>,
    /// Progress assessment, present when the phase survived the drawdown check.
    pub progress: Option<ProgressReport>,

    pub phase_after: PhaseAccount,
    pub account_after: MasterAccount,

    /// Anchor healed/created for the evaluation day, to insert write-once.
    pub new_anchor: Option<DailyAnchor>,
    pub breach: Option<Breach>,
    pub transition: Option<Transition>,
    /// Next phase, created Active, when the current one passed.
    pub new_phase: Option<PhaseAccount>,

    pub events: Vec<EngineEvent>,
}

impl Outcome {
    pub(crate) fn plain(phase_after: PhaseAccount, account_after: MasterAccount) -> Self {
        Self {
            trade: None,
            applied: None,
            drawdown: None,
            progress: None,
            phase_after,
            account_after,
            new_anchor: None,
            breach: None,
            transition: None,
            new_phase: None,
            events: Vec::new(),
        }
    }

    /// True when committing this outcome appends any Breach or Transition
    /// row — the idempotence test for the manual evaluation trigger.
    pub fn has_records(&self) -> bool {
        self.breach.is_some() || self.transition.is_some() || self.new_phase.is_some()
    }
}
