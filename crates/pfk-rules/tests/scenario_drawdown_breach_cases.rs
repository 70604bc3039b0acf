use pfk_rules::*;
use pfk_schemas::{BreachType, DrawdownMode};

const M: i64 = 1_000_000;

#[test]
fn scenario_daily_drawdown_breach_on_fifty_k() {
    // 50k start, 2,500 daily limit, anchor 50k, cumulative loss 2,600.
    let r = assess_drawdown(
        DrawdownMode::Static,
        DrawdownLimits {
            daily_micros: 2_500 * M,
            max_micros: 5_000 * M,
        },
        &DrawdownInput {
            equity_micros: 47_400 * M,
            anchor_equity_micros: 50_000 * M,
            high_water_mark_micros: 50_000 * M,
            phase_start_balance_micros: 50_000 * M,
        },
    );
    assert_eq!(r.breach, Some(BreachType::DailyDrawdown));
    assert_eq!(r.breach_amount_micros(), 2_600 * M);
    assert_eq!(r.daily_remaining_micros, 0);
}

#[test]
fn scenario_trailing_max_drawdown_breaches_above_starting_balance() {
    // 100k start, equity rose to 110k (hwm), 10k max limit, drop to 99k.
    // Used = 11,000 > 10,000 even though equity is above the starting balance.
    let r = assess_drawdown(
        DrawdownMode::Trailing,
        DrawdownLimits {
            daily_micros: 0,
            max_micros: 10_000 * M,
        },
        &DrawdownInput {
            equity_micros: 99_000 * M,
            anchor_equity_micros: 104_000 * M,
            high_water_mark_micros: 110_000 * M,
            phase_start_balance_micros: 100_000 * M,
        },
    );
    assert_eq!(r.breach, Some(BreachType::MaxDrawdown));
    assert_eq!(r.max_used_micros, 11_000 * M);
}

#[test]
fn scenario_static_mode_ignores_high_water_mark() {
    // Same numbers in static mode: reference is the 100k start, used = 1,000.
    let r = assess_drawdown(
        DrawdownMode::Static,
        DrawdownLimits {
            daily_micros: 0,
            max_micros: 10_000 * M,
        },
        &DrawdownInput {
            equity_micros: 99_000 * M,
            anchor_equity_micros: 104_000 * M,
            high_water_mark_micros: 110_000 * M,
            phase_start_balance_micros: 100_000 * M,
        },
    );
    assert_eq!(r.breach, None);
    assert_eq!(r.max_used_micros, 1_000 * M);
    assert_eq!(r.max_remaining_micros, 9_000 * M);
}
