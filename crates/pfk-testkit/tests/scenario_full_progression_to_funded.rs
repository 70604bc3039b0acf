//! Full two-step progression: phase 1 → phase 2 → funded.
//!
//! GREEN when each target hit passes the phase, opens the next at its own
//! starting balance, and reaching funded flips the account status.

use chrono::{Duration, TimeZone, Utc};
use pfk_schemas::{AccountStatus, PhaseStatus, PhaseType, TransitionReason, MICROS_SCALE as M};
use pfk_testkit::{closing_trade, two_step_50k_rules, MemStore};

#[test]
fn scenario_two_step_account_reaches_funded() {
    let store = MemStore::new();
    let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    let (account, phase1) = store.init_account(two_step_50k_rules(), false, t0);
    let id = account.account_id;

    // Phase 1: 8% of 50k = 4,000 target, hit in one trade.
    let out = store
        .ingest_trade(id, &closing_trade(1, t0, 4_000), t0 + Duration::hours(16))
        .expect("phase 1 target trade");
    assert_eq!(out.phase_after.phase_id, phase1.phase_id);
    assert_eq!(out.phase_after.status, PhaseStatus::Passed);
    let phase2 = out.new_phase.as_ref().expect("phase 2 opened");
    assert_eq!(phase2.phase_type, PhaseType::Phase2);
    // Equity is not carried over: the new phase starts at its own balance.
    assert_eq!(phase2.equity_micros, 50_000 * M);
    assert_eq!(phase2.last_seq, 0, "sequence is per phase");
    assert_eq!(
        out.transition.as_ref().unwrap().reason,
        TransitionReason::PhasePassed
    );
    assert_eq!(out.account_after.current_phase_number, 2);
    assert_eq!(out.account_after.status, AccountStatus::Active);

    // Phase 2: 5% of 50k = 2,500 target.
    let day1 = t0 + Duration::days(1);
    let out = store
        .ingest_trade(id, &closing_trade(1, day1, 2_500), day1 + Duration::hours(16))
        .expect("phase 2 target trade");
    assert_eq!(out.phase_after.status, PhaseStatus::Passed);
    let funded = out.new_phase.as_ref().expect("funded phase opened");
    assert_eq!(funded.phase_type, PhaseType::Funded);
    assert_eq!(
        out.transition.as_ref().unwrap().reason,
        TransitionReason::Promoted
    );
    assert_eq!(out.account_after.status, AccountStatus::Funded);
    assert_eq!(out.account_after.current_phase_number, 3);
    assert_eq!(out.account_after.active_phase_id, Some(funded.phase_id));

    // Funded phases have no profit target; profits accumulate without a pass.
    let day2 = t0 + Duration::days(2);
    let out = store
        .ingest_trade(id, &closing_trade(1, day2, 9_000), day2 + Duration::hours(16))
        .expect("funded trade");
    assert_eq!(out.phase_after.status, PhaseStatus::Active);
    assert!(out.new_phase.is_none(), "no phase beyond funded");

    let state = store.state(id);
    assert_eq!(state.phases.len(), 3);
    assert_eq!(state.transitions.len(), 2);
}
