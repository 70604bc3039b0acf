use chrono::{DateTime, Duration, TimeZone, Utc};
use pfk_engine::{evaluate_trade, EngineError};
use pfk_schemas::{
    AccountStatus, BreachType, DailyAnchor, DrawdownMode, MasterAccount, PhaseAccount, PhaseRules,
    PhaseStatus, PhaseType, ProgramRules, ProgramType, TradeRecord, TradeSide, TransitionReason,
    MICROS_SCALE as M,
};
use uuid::Uuid;

fn one_step(start: i64, daily: i64, max: i64, mode: DrawdownMode) -> ProgramRules {
    let base = PhaseRules {
        profit_target_micros: 8 * start * M / 100,
        daily_drawdown_limit_micros: daily * M,
        max_drawdown_limit_micros: max * M,
        drawdown_mode: mode,
        min_trading_days: 4,
        consistency_max_bps: 0,
        time_limit_days: None,
        starting_balance_micros: start * M,
    };
    ProgramRules::OneStep {
        phase1: base.clone(),
        funded: PhaseRules {
            profit_target_micros: 0,
            ..base
        },
    }
}

fn fresh_account(rules: &ProgramRules) -> (MasterAccount, PhaseAccount) {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    let account_id = Uuid::new_v4();
    let first = rules.rules_for(rules.first_phase_type()).unwrap().clone();
    let phase = PhaseAccount::open(account_id, rules.first_phase_type(), first, t0);
    let account = MasterAccount {
        account_id,
        program: ProgramType::OneStep,
        starting_balance_micros: phase.starting_balance_micros,
        current_phase_number: 1,
        active: true,
        status: AccountStatus::Active,
        active_phase_id: Some(phase.phase_id),
        allow_manual_reset: false,
        created_at: t0,
    };
    (account, phase)
}

fn closing_trade(seq: u64, day: DateTime<Utc>, pnl: i64) -> TradeRecord {
    TradeRecord {
        symbol: "ES".into(),
        side: TradeSide::Long,
        qty: 1,
        entry_price_micros: 5_000 * M,
        exit_price_micros: Some((5_000 + pnl) * M),
        entry_time: day + Duration::hours(14),
        exit_time: Some(day + Duration::hours(15)),
        fees_micros: 0,
        commission_micros: 0,
        realized_pnl_micros: None,
        seq,
    }
}

#[test]
fn scenario_daily_drawdown_breach_fails_phase_and_account() {
    // 50k start, 2,500 daily limit, anchor 50k, cumulative loss 2,600.
    let rules = one_step(50_000, 2_500, 0, DrawdownMode::Static);
    let (mut account, mut phase) = fresh_account(&rules);
    let day = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    let anchor = DailyAnchor {
        account_id: account.account_id,
        day_id: 20260302,
        anchor_equity_micros: 50_000 * M,
        created_at: day,
    };

    // -1,300 survives, the next -1,300 takes the day to -2,600.
    let out = evaluate_trade(
        &account,
        &phase,
        Some(&anchor),
        &rules,
        &closing_trade(1, day, -1_300),
        day + Duration::hours(16),
    )
    .unwrap();
    assert!(out.breach.is_none());
    account = out.account_after;
    phase = out.phase_after;

    let out = evaluate_trade(
        &account,
        &phase,
        Some(&anchor),
        &rules,
        &closing_trade(2, day, -1_300),
        day + Duration::hours(17),
    )
    .unwrap();

    let breach = out.breach.as_ref().expect("breach recorded");
    assert_eq!(breach.breach_type, BreachType::DailyDrawdown);
    assert_eq!(breach.breach_amount_micros, 2_600 * M);
    assert_eq!(breach.equity_at_breach_micros, 47_400 * M);
    assert_eq!(breach.trade_id, out.trade.as_ref().map(|t| t.trade_id));

    assert_eq!(out.phase_after.status, PhaseStatus::Failed);
    assert!(!out.account_after.active);
    assert_eq!(out.account_after.status, AccountStatus::Failed);
    assert_eq!(out.account_after.active_phase_id, None);
    assert_eq!(
        out.transition.as_ref().unwrap().reason,
        TransitionReason::DrawdownBreach
    );
    // Evaluation stopped at the breach: no progress check ran.
    assert!(out.progress.is_none());

    // Further trades are rejected with PhaseNotActive, not a generic error.
    let err = evaluate_trade(
        &out.account_after,
        &out.phase_after,
        Some(&anchor),
        &rules,
        &closing_trade(3, day, 100),
        day + Duration::hours(18),
    )
    .unwrap_err();
    assert_eq!(
        err,
        EngineError::PhaseNotActive {
            status: PhaseStatus::Failed
        }
    );
}

#[test]
fn scenario_trailing_max_drawdown_breach_above_starting_balance() {
    // 100k start, rise to 110k, 10k trailing limit, drop to 99k.
    let rules = one_step(100_000, 0, 10_000, DrawdownMode::Trailing);
    let (mut account, mut phase) = fresh_account(&rules);
    let day0 = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();

    let out = evaluate_trade(
        &account,
        &phase,
        None,
        &rules,
        &closing_trade(1, day0, 10_000),
        day0 + Duration::hours(16),
    )
    .unwrap();
    assert_eq!(out.phase_after.high_water_mark_micros, 110_000 * M);
    account = out.account_after;
    phase = out.phase_after;

    let day1 = day0 + Duration::days(1);
    let out = evaluate_trade(
        &account,
        &phase,
        None,
        &rules,
        &closing_trade(2, day1, -11_000),
        day1 + Duration::hours(16),
    )
    .unwrap();

    let breach = out.breach.as_ref().expect("breach");
    assert_eq!(breach.breach_type, BreachType::MaxDrawdown);
    // Reference is the 110k high-water mark, not the starting balance.
    assert_eq!(breach.breach_amount_micros, 11_000 * M);
    assert_eq!(out.phase_after.equity_micros, 99_000 * M);
    assert_eq!(out.phase_after.status, PhaseStatus::Failed);
}

#[test]
fn scenario_time_limit_failure_records_transition_without_breach() {
    let mut rules = one_step(50_000, 0, 0, DrawdownMode::Static);
    if let ProgramRules::OneStep { phase1, .. } = &mut rules {
        phase1.time_limit_days = Some(30);
    }
    let (account, phase) = fresh_account(&rules);
    let day = Utc.with_ymd_and_hms(2026, 4, 10, 0, 0, 0).unwrap(); // day 39

    let out = evaluate_trade(
        &account,
        &phase,
        None,
        &rules,
        &closing_trade(1, day, 100),
        day + Duration::hours(16),
    )
    .unwrap();

    assert!(out.breach.is_none(), "time limit is not a drawdown breach");
    assert_eq!(out.phase_after.status, PhaseStatus::Failed);
    assert_eq!(
        out.transition.as_ref().unwrap().reason,
        TransitionReason::TimeLimitExceeded
    );
    assert!(out.progress.as_ref().unwrap().time_limit_exceeded);
}
