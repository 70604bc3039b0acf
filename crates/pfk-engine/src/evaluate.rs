use chrono::{DateTime, Utc};
use pfk_ledger::apply_trade;
use pfk_rules::{
    assess_drawdown, evaluate_progress, DrawdownInput, DrawdownLimits, DrawdownReport,
    ProgressCriteria, ProgressInput, ProgressReport,
};
use pfk_schemas::{
    day_id_utc, AccountStatus, Breach, BreachType, DailyAnchor, MasterAccount, PhaseAccount,
    PhaseStatus, PhaseType, ProgramRules, Trade, TradeRecord, Transition, TransitionReason,
};
use uuid::Uuid;

use crate::anchor::ensure_anchor;
use crate::outcome::{EngineEvent, Outcome};
use crate::{EngineError, ENGINE_ACTOR};

/// Evaluate one trade against the account's active phase.
///
/// The transition algorithm, in order:
/// 1. the ledger applies the trade;
/// 2. if the trade closed a position, drawdown is assessed on the new equity;
/// 3. breached ⇒ breach recorded, phase Failed, account deactivated,
///    transition written — and evaluation stops;
/// 4. not breached ⇒ progress is evaluated; ready ⇒ phase Passed and the
///    next phase is created Active at its own starting balance (promotion to
///    Funded flips the account status in the same outcome);
/// 5. otherwise the phase stays Active with no state change beyond the
///    ledger update.
///
/// `anchor` is the day's anchor for the trade's evaluation day, when one
/// exists; a missing anchor is healed from the pre-trade balance and the
/// created row rides on the outcome.
pub fn evaluate_trade(
    account: &MasterAccount,
    phase: &PhaseAccount,
    anchor: Option<&DailyAnchor>,
    rules: &ProgramRules,
    rec: &TradeRecord,
    now: DateTime<Utc>,
) -> Result<Outcome, EngineError> {
    // Closing trades measure drawdown on their exit day.
    let day_id = day_id_utc(rec.exit_time.unwrap_or(rec.entry_time));

    // Heal the anchor before any accounting: the day opened at the
    // pre-trade balance.
    let new_anchor = ensure_anchor(anchor, account.account_id, day_id, phase.balance_micros, now);
    let anchor_equity = match &new_anchor {
        Some(a) => a.anchor_equity_micros,
        None => anchor
            .map(|a| a.anchor_equity_micros)
            .unwrap_or(phase.balance_micros),
    };

    let mut phase_after = phase.clone();
    let applied = apply_trade(&mut phase_after, rec)?;

    let trade = Trade {
        trade_id: Uuid::new_v4(),
        account_id: account.account_id,
        phase_id: phase.phase_id,
        record: rec.clone(),
        applied_pnl_micros: applied.pnl_micros,
        applied_at: now,
    };

    let mut out = Outcome::plain(phase_after, account.clone());
    out.new_anchor = new_anchor;
    let closed = applied.closed;
    out.applied = Some(applied);
    out.trade = Some(trade.clone());

    if !closed {
        // Open trades move no equity; nothing to re-assess.
        return Ok(out);
    }

    let dd = assess_current_drawdown(&out.phase_after, anchor_equity);
    if let Some(breach_type) = dd.breach {
        let amount = dd.breach_amount_micros();
        out.drawdown = Some(dd);
        fail_on_breach(&mut out, breach_type, amount, Some(trade.trade_id), now);
        return Ok(out);
    }
    out.drawdown = Some(dd);

    let progress = run_progress(&out.phase_after, now);
    if progress.time_limit_exceeded {
        fail_on_time_limit(&mut out, now);
    } else if progress.ready {
        advance_phase(&mut out, rules, now)?;
    }
    out.progress = Some(progress);

    Ok(out)
}

/// Manual evaluation trigger: re-run the drawdown and progress checks
/// against the current state, without a new trade.
///
/// Idempotent — a non-Active phase, or an Active phase whose state implies
/// nothing, yields an outcome with no new Breach/Transition rows, so
/// invoking this twice in a row produces nothing the second time.
pub fn evaluate_phase(
    account: &MasterAccount,
    phase: &PhaseAccount,
    anchor: Option<&DailyAnchor>,
    rules: &ProgramRules,
    now: DateTime<Utc>,
) -> Result<Outcome, EngineError> {
    let mut out = Outcome::plain(phase.clone(), account.clone());
    if phase.status != PhaseStatus::Active {
        return Ok(out);
    }

    let day_id = day_id_utc(now);
    let new_anchor = ensure_anchor(anchor, account.account_id, day_id, phase.balance_micros, now);
    let anchor_equity = match &new_anchor {
        Some(a) => a.anchor_equity_micros,
        None => anchor
            .map(|a| a.anchor_equity_micros)
            .unwrap_or(phase.balance_micros),
    };
    out.new_anchor = new_anchor;

    let dd = assess_current_drawdown(&out.phase_after, anchor_equity);
    if let Some(breach_type) = dd.breach {
        let amount = dd.breach_amount_micros();
        out.drawdown = Some(dd);
        fail_on_breach(&mut out, breach_type, amount, None, now);
        return Ok(out);
    }
    out.drawdown = Some(dd);

    let progress = run_progress(&out.phase_after, now);
    if progress.time_limit_exceeded {
        fail_on_time_limit(&mut out, now);
    } else if progress.ready {
        advance_phase(&mut out, rules, now)?;
    }
    out.progress = Some(progress);

    Ok(out)
}

fn assess_current_drawdown(phase: &PhaseAccount, anchor_equity_micros: i64) -> DrawdownReport {
    assess_drawdown(
        phase.rules.drawdown_mode,
        DrawdownLimits {
            daily_micros: phase.rules.daily_drawdown_limit_micros,
            max_micros: phase.rules.max_drawdown_limit_micros,
        },
        &DrawdownInput {
            equity_micros: phase.equity_micros,
            anchor_equity_micros,
            high_water_mark_micros: phase.high_water_mark_micros,
            phase_start_balance_micros: phase.starting_balance_micros,
        },
    )
}

fn run_progress(phase: &PhaseAccount, now: DateTime<Utc>) -> ProgressReport {
    let day_profits: Vec<i64> = phase.day_profits.values().copied().collect();
    let elapsed_days = (now.date_naive() - phase.started_at.date_naive())
        .num_days()
        .max(0) as u32;

    evaluate_progress(
        &ProgressCriteria {
            profit_target_micros: phase.rules.profit_target_micros,
            min_trading_days: phase.rules.min_trading_days,
            consistency_max_bps: phase.rules.consistency_max_bps,
            time_limit_days: phase.rules.time_limit_days,
        },
        &ProgressInput {
            net_profit_micros: phase.net_profit_micros,
            trading_days: phase.trading_days(),
            day_profits: &day_profits,
            elapsed_days,
        },
    )
}

/// Terminal breach path: phase Failed, account deactivated, breach +
/// transition recorded. No progress check runs after this.
fn fail_on_breach(
    out: &mut Outcome,
    breach_type: BreachType,
    amount_micros: i64,
    trade_id: Option<Uuid>,
    now: DateTime<Utc>,
) {
    let from_status = out.phase_after.status;
    out.phase_after.status = PhaseStatus::Failed;
    out.phase_after.ended_at = Some(now);

    out.account_after.active = false;
    out.account_after.status = AccountStatus::Failed;
    out.account_after.active_phase_id = None;

    out.breach = Some(Breach {
        breach_id: Uuid::new_v4(),
        account_id: out.account_after.account_id,
        phase_id: out.phase_after.phase_id,
        breach_type,
        breach_amount_micros: amount_micros,
        equity_at_breach_micros: out.phase_after.equity_micros,
        trade_id,
        ts: now,
    });
    out.transition = Some(Transition {
        transition_id: Uuid::new_v4(),
        account_id: out.account_after.account_id,
        from_phase: Some(out.phase_after.phase_id),
        to_phase: None,
        from_status: from_status.as_str().to_string(),
        to_status: PhaseStatus::Failed.as_str().to_string(),
        reason: TransitionReason::DrawdownBreach,
        actor: ENGINE_ACTOR.to_string(),
        ts: now,
    });

    out.events.push(EngineEvent::BreachRecorded {
        account_id: out.account_after.account_id,
        phase_id: out.phase_after.phase_id,
        breach_type,
        amount_micros,
    });
    out.events.push(EngineEvent::PhaseChanged {
        account_id: out.account_after.account_id,
        phase_id: out.phase_after.phase_id,
        status: PhaseStatus::Failed,
    });
}

/// Exceeding the phase time limit fails the phase through the same terminal
/// path as a breach, but records only a Transition — Breach rows are
/// reserved for drawdown violations.
fn fail_on_time_limit(out: &mut Outcome, now: DateTime<Utc>) {
    let from_status = out.phase_after.status;
    out.phase_after.status = PhaseStatus::Failed;
    out.phase_after.ended_at = Some(now);

    out.account_after.active = false;
    out.account_after.status = AccountStatus::Failed;
    out.account_after.active_phase_id = None;

    out.transition = Some(Transition {
        transition_id: Uuid::new_v4(),
        account_id: out.account_after.account_id,
        from_phase: Some(out.phase_after.phase_id),
        to_phase: None,
        from_status: from_status.as_str().to_string(),
        to_status: PhaseStatus::Failed.as_str().to_string(),
        reason: TransitionReason::TimeLimitExceeded,
        actor: ENGINE_ACTOR.to_string(),
        ts: now,
    });
    out.events.push(EngineEvent::PhaseChanged {
        account_id: out.account_after.account_id,
        phase_id: out.phase_after.phase_id,
        status: PhaseStatus::Failed,
    });
}

/// Pass path: current phase → Passed, next phase created Active at its own
/// starting balance. Reaching Funded flips the account status in the same
/// outcome.
fn advance_phase(
    out: &mut Outcome,
    rules: &ProgramRules,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let next_type = match rules.next_phase_type(out.phase_after.phase_type) {
        Some(t) => t,
        // No successor (funded phase with a nonzero target configured):
        // progression does not apply, the phase simply stays active.
        None => return Ok(()),
    };
    let next_rules = rules
        .rules_for(next_type)
        .ok_or(EngineError::RulesMissing { phase_type: next_type })?
        .clone();

    let from_status = out.phase_after.status;
    out.phase_after.status = PhaseStatus::Passed;
    out.phase_after.ended_at = Some(now);

    let new_phase = PhaseAccount::open(out.account_after.account_id, next_type, next_rules, now);

    out.account_after.current_phase_number += 1;
    out.account_after.active_phase_id = Some(new_phase.phase_id);
    let reason = if next_type == PhaseType::Funded {
        out.account_after.status = AccountStatus::Funded;
        TransitionReason::Promoted
    } else {
        TransitionReason::PhasePassed
    };

    out.transition = Some(Transition {
        transition_id: Uuid::new_v4(),
        account_id: out.account_after.account_id,
        from_phase: Some(out.phase_after.phase_id),
        to_phase: Some(new_phase.phase_id),
        from_status: from_status.as_str().to_string(),
        to_status: PhaseStatus::Passed.as_str().to_string(),
        reason,
        actor: ENGINE_ACTOR.to_string(),
        ts: now,
    });

    out.events.push(EngineEvent::PhaseChanged {
        account_id: out.account_after.account_id,
        phase_id: out.phase_after.phase_id,
        status: PhaseStatus::Passed,
    });
    out.events.push(EngineEvent::PhaseChanged {
        account_id: out.account_after.account_id,
        phase_id: new_phase.phase_id,
        status: PhaseStatus::Active,
    });

    out.new_phase = Some(new_phase);
    Ok(())
}
