use chrono::{Duration, TimeZone, Utc};
use pfk_ledger::{apply_trade, LedgerError};
use pfk_schemas::{
    DrawdownMode, PhaseAccount, PhaseRules, PhaseStatus, PhaseType, TradeRecord, TradeSide,
    MICROS_SCALE as M,
};
use uuid::Uuid;

fn fifty_k_phase() -> PhaseAccount {
    let rules = PhaseRules {
        profit_target_micros: 4_000 * M,
        daily_drawdown_limit_micros: 2_500 * M,
        max_drawdown_limit_micros: 5_000 * M,
        drawdown_mode: DrawdownMode::Static,
        min_trading_days: 4,
        consistency_max_bps: 0,
        time_limit_days: None,
        starting_balance_micros: 50_000 * M,
    };
    PhaseAccount::open(
        Uuid::new_v4(),
        PhaseType::Phase1,
        rules,
        Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
    )
}

fn closing_trade(seq: u64, pnl: i64) -> TradeRecord {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap() + Duration::hours(seq as i64);
    TradeRecord {
        symbol: "ES".into(),
        side: TradeSide::Long,
        qty: 1,
        entry_price_micros: 5_000 * M,
        exit_price_micros: Some((5_000 + pnl) * M),
        entry_time: t0,
        exit_time: Some(t0 + Duration::minutes(10)),
        fees_micros: 0,
        commission_micros: 0,
        realized_pnl_micros: None,
        seq,
    }
}

#[test]
fn scenario_closing_trade_moves_equity_by_net_pnl() {
    let mut phase = fifty_k_phase();
    let before = phase.equity_micros;

    let applied = apply_trade(&mut phase, &closing_trade(1, 250)).expect("apply");

    assert!(applied.closed);
    assert_eq!(phase.trade_count, 1);
    assert_eq!(phase.equity_micros, before + 250 * M);
    assert_eq!(phase.balance_micros, before + 250 * M);
    assert_eq!(phase.net_profit_micros, 250 * M);
    assert_eq!(phase.win_count, 1);
}

#[test]
fn scenario_high_water_mark_is_monotone_across_trades() {
    let mut phase = fifty_k_phase();
    let pnls = [500i64, -300, 800, -1_200, 100];

    let mut hwm = phase.high_water_mark_micros;
    for (i, pnl) in pnls.iter().enumerate() {
        apply_trade(&mut phase, &closing_trade(i as u64 + 1, *pnl)).expect("apply");
        assert!(phase.high_water_mark_micros >= hwm, "hwm regressed");
        hwm = phase.high_water_mark_micros;
    }
    // 50,000 + 500 + (-300) + 800 = 51,000 peak
    assert_eq!(hwm, 51_000 * M);
}

#[test]
fn scenario_open_trade_counts_but_moves_no_equity() {
    let mut phase = fifty_k_phase();
    let mut rec = closing_trade(1, 0);
    rec.exit_price_micros = None;
    rec.exit_time = None;

    let applied = apply_trade(&mut phase, &rec).expect("apply");
    assert!(!applied.closed);
    assert_eq!(applied.pnl_micros, 0);
    assert_eq!(phase.trade_count, 1);
    assert_eq!(phase.equity_micros, 50_000 * M);
    assert!(phase.day_profits.is_empty());
}

#[test]
fn scenario_stale_sequence_rejected_without_mutation() {
    let mut phase = fifty_k_phase();
    apply_trade(&mut phase, &closing_trade(5, 100)).expect("apply");
    let snapshot = phase.clone();

    let err = apply_trade(&mut phase, &closing_trade(5, 100)).unwrap_err();
    assert_eq!(err, LedgerError::StaleSequence { supplied: 5, last: 5 });
    assert_eq!(phase, snapshot, "rejected trade must not mutate the phase");
}

#[test]
fn scenario_failed_phase_rejects_trades() {
    let mut phase = fifty_k_phase();
    phase.status = PhaseStatus::Failed;

    let err = apply_trade(&mut phase, &closing_trade(1, 100)).unwrap_err();
    assert_eq!(
        err,
        LedgerError::PhaseNotActive {
            status: PhaseStatus::Failed
        }
    );
}

#[test]
fn scenario_invalid_trade_rejected_before_any_mutation() {
    let mut phase = fifty_k_phase();
    let snapshot = phase.clone();

    let mut rec = closing_trade(1, 100);
    rec.qty = -3;
    let err = apply_trade(&mut phase, &rec).unwrap_err();
    assert!(err.is_invalid_trade_data());
    assert_eq!(phase, snapshot);
}
