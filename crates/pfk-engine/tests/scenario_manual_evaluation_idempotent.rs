use chrono::{TimeZone, Utc};
use pfk_engine::evaluate_phase;
use pfk_schemas::{
    AccountStatus, DailyAnchor, DrawdownMode, MasterAccount, PhaseAccount, PhaseRules, PhaseStatus,
    ProgramRules, ProgramType, MICROS_SCALE as M,
};
use uuid::Uuid;

fn setup() -> (MasterAccount, PhaseAccount, ProgramRules) {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    let base = PhaseRules {
        profit_target_micros: 4_000 * M,
        daily_drawdown_limit_micros: 2_500 * M,
        max_drawdown_limit_micros: 5_000 * M,
        drawdown_mode: DrawdownMode::Static,
        min_trading_days: 4,
        consistency_max_bps: 0,
        time_limit_days: None,
        starting_balance_micros: 50_000 * M,
    };
    let rules = ProgramRules::OneStep {
        phase1: base.clone(),
        funded: PhaseRules {
            profit_target_micros: 0,
            ..base
        },
    };
    let account_id = Uuid::new_v4();
    let phase = PhaseAccount::open(account_id, rules.first_phase_type(), rules.rules_for(rules.first_phase_type()).unwrap().clone(), t0);
    let account = MasterAccount {
        account_id,
        program: ProgramType::OneStep,
        starting_balance_micros: 50_000 * M,
        current_phase_number: 1,
        active: true,
        status: AccountStatus::Active,
        active_phase_id: Some(phase.phase_id),
        allow_manual_reset: false,
        created_at: t0,
    };
    (account, phase, rules)
}

#[test]
fn scenario_double_manual_evaluation_is_a_no_op() {
    let (account, phase, rules) = setup();
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
    let anchor = DailyAnchor {
        account_id: account.account_id,
        day_id: 20260302,
        anchor_equity_micros: 50_000 * M,
        created_at: now,
    };

    let first = evaluate_phase(&account, &phase, Some(&anchor), &rules, now).unwrap();
    assert!(!first.has_records(), "healthy phase produces no records");
    assert_eq!(first.phase_after.status, PhaseStatus::Active);

    // Second invocation with no intervening trades: still nothing.
    let second =
        evaluate_phase(&first.account_after, &first.phase_after, Some(&anchor), &rules, now)
            .unwrap();
    assert!(!second.has_records());
    assert_eq!(second.phase_after, first.phase_after);
    assert_eq!(second.account_after, first.account_after);
}

#[test]
fn scenario_manual_evaluation_on_failed_phase_produces_nothing() {
    let (mut account, mut phase, rules) = setup();
    phase.status = PhaseStatus::Failed;
    account.active = false;
    account.status = AccountStatus::Failed;
    account.active_phase_id = None;

    let now = Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap();
    let out = evaluate_phase(&account, &phase, None, &rules, now).unwrap();
    assert!(!out.has_records());
    assert!(out.drawdown.is_none());
    assert!(out.new_anchor.is_none());
}

#[test]
fn scenario_manual_evaluation_heals_missing_anchor_once() {
    let (account, phase, rules) = setup();
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();

    let first = evaluate_phase(&account, &phase, None, &rules, now).unwrap();
    let created = first.new_anchor.as_ref().expect("anchor healed lazily");
    assert_eq!(created.day_id, 20260302);
    assert_eq!(created.anchor_equity_micros, 50_000 * M);

    // With the anchor now present, a re-run creates nothing.
    let second =
        evaluate_phase(&first.account_after, &first.phase_after, Some(created), &rules, now)
            .unwrap();
    assert!(second.new_anchor.is_none());
}
