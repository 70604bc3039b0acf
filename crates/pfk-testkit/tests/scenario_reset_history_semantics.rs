//! Reset history semantics: anchors always cleared, trade rows only on request.

use chrono::{Duration, TimeZone, Utc};
use pfk_engine::ResetRequest;
use pfk_schemas::{day_id_utc, PhaseStatus, MICROS_SCALE as M};
use pfk_testkit::{closing_trade, two_step_50k_rules, MemStore};

fn breached_account(store: &MemStore) -> uuid::Uuid {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    let (account, _) = store.init_account(two_step_50k_rules(), true, t0);
    store
        .ingest_trade(
            account.account_id,
            &closing_trade(1, t0, -2_600),
            t0 + Duration::hours(16),
        )
        .expect("breaching trade");
    account.account_id
}

#[test]
fn scenario_reset_keeps_trade_rows_by_default() {
    let store = MemStore::new();
    let id = breached_account(&store);
    let now = Utc.with_ymd_and_hms(2026, 3, 9, 8, 0, 0).unwrap();

    let out = store
        .reset_account(
            id,
            &ResetRequest {
                manual: true,
                actor: "ops".into(),
                reason: "re-enrollment".into(),
                clear_trade_history: false,
            },
            now,
        )
        .expect("reset");

    let state = store.state(id);
    assert_eq!(state.trades.len(), 1, "historical trade rows retained");
    assert_eq!(state.anchors.len(), 1, "only the fresh day-zero anchor");
    assert_eq!(
        state.anchors.get(&day_id_utc(now)).unwrap().anchor_equity_micros,
        50_000 * M
    );
    assert_eq!(out.new_phase.status, PhaseStatus::Active);
    assert_eq!(state.current_phase().phase_id, out.new_phase.phase_id);
}

#[test]
fn scenario_reset_clears_trade_rows_on_request() {
    let store = MemStore::new();
    let id = breached_account(&store);
    let now = Utc.with_ymd_and_hms(2026, 3, 9, 8, 0, 0).unwrap();

    store
        .reset_account(
            id,
            &ResetRequest {
                manual: true,
                actor: "ops".into(),
                reason: "clean slate".into(),
                clear_trade_history: true,
            },
            now,
        )
        .expect("reset");

    let state = store.state(id);
    assert!(state.trades.is_empty(), "trade rows cleared on request");
    // The breach and transition records are audit history and survive.
    assert_eq!(state.breaches.len(), 1);
    assert!(state.transitions.len() >= 2);
}
