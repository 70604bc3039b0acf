use chrono::{DateTime, Utc};
use pfk_schemas::{
    day_id_utc, AccountStatus, DailyAnchor, MasterAccount, PhaseAccount, PhaseStatus, PhaseType,
    ProgramRules, Transition, TransitionReason,
};
use uuid::Uuid;

use crate::outcome::EngineEvent;
use crate::EngineError;

/// Reset trigger payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResetRequest {
    /// Manual resets require the account's permission flag; automatic
    /// post-breach resets do not.
    pub manual: bool,
    pub actor: String,
    pub reason: String,
    pub clear_trade_history: bool,
}

/// Everything a store must do to commit a reset.
#[derive(Clone, Debug, PartialEq)]
pub struct ResetOutcome {
    /// Prior phase with its end timestamp set (and funded-cycle phases
    /// closed as Passed).
    pub closed_phase: PhaseAccount,
    pub account_after: MasterAccount,
    /// Fresh Active phase at the configured reset balance.
    pub new_phase: PhaseAccount,
    /// Day-zero anchor for the new phase.
    pub new_anchor: DailyAnchor,
    pub transition: Transition,
    /// Transient history (anchors, equity snapshots) is always cleared;
    /// trade rows only when requested.
    pub clear_trade_history: bool,
    pub events: Vec<EngineEvent>,
}

/// Plan the reinitialization of a failed or funded-cycle account.
///
/// Closes the current terminal phase, creates a new Active phase 1 (or a new
/// funded phase when cycling a funded account), anchors day zero at the
/// reset balance, and records the transition with the caller's reason and
/// actor. The store commits the plan atomically, deleting anchors (and
/// trade rows when `clear_trade_history` is set) for the clean slate.
pub fn plan_reset(
    account: &MasterAccount,
    phase: &PhaseAccount,
    rules: &ProgramRules,
    req: &ResetRequest,
    now: DateTime<Utc>,
) -> Result<ResetOutcome, EngineError> {
    if req.manual && !account.allow_manual_reset {
        return Err(EngineError::ResetNotPermitted);
    }

    let funded_cycle = phase.phase_type == PhaseType::Funded;
    if !phase.status.is_terminal() && !funded_cycle {
        return Err(EngineError::PhaseStillActive);
    }

    let mut closed_phase = phase.clone();
    if closed_phase.status == PhaseStatus::Active {
        // Funded payout cycle: the running funded phase completes cleanly.
        closed_phase.status = PhaseStatus::Passed;
    }
    closed_phase.ended_at = Some(now);

    let new_type = if funded_cycle {
        PhaseType::Funded
    } else {
        rules.first_phase_type()
    };
    let new_rules = rules
        .rules_for(new_type)
        .ok_or(EngineError::RulesMissing { phase_type: new_type })?
        .clone();
    let new_phase = PhaseAccount::open(account.account_id, new_type, new_rules, now);

    let mut account_after = account.clone();
    account_after.active = true;
    account_after.status = if new_type == PhaseType::Funded {
        AccountStatus::Funded
    } else {
        AccountStatus::Active
    };
    account_after.active_phase_id = Some(new_phase.phase_id);
    if !funded_cycle {
        account_after.current_phase_number = 1;
    }

    let new_anchor = DailyAnchor {
        account_id: account.account_id,
        day_id: day_id_utc(now),
        anchor_equity_micros: new_phase.starting_balance_micros,
        created_at: now,
    };

    let reason = if req.manual {
        TransitionReason::ManualReset
    } else {
        TransitionReason::AutoReset
    };
    let transition = Transition {
        transition_id: Uuid::new_v4(),
        account_id: account.account_id,
        from_phase: Some(closed_phase.phase_id),
        to_phase: Some(new_phase.phase_id),
        from_status: closed_phase.status.as_str().to_string(),
        to_status: PhaseStatus::Active.as_str().to_string(),
        reason,
        actor: req.actor.clone(),
        ts: now,
    };

    let events = vec![
        EngineEvent::AccountReset {
            account_id: account.account_id,
            new_phase_id: new_phase.phase_id,
        },
        EngineEvent::PhaseChanged {
            account_id: account.account_id,
            phase_id: new_phase.phase_id,
            status: PhaseStatus::Active,
        },
    ];

    Ok(ResetOutcome {
        closed_phase,
        account_after,
        new_phase,
        new_anchor,
        transition,
        clear_trade_history: req.clear_trade_history,
        events,
    })
}
