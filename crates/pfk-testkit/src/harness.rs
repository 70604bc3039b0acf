use chrono::{DateTime, Duration, Utc};
use pfk_config::ProgramCatalog;
use pfk_schemas::{ProgramRules, TradeRecord, TradeSide, MICROS_SCALE};

/// The catalog used across scenario tests. min_trading_days is 1 so short
/// scenarios can reach targets without padding days; tests that exercise
/// the minimum-days gate override the rules directly.
pub const STANDARD_CATALOG: &str = r#"{
    "programs": {
        "two_step_50k": {
            "type": "two_step",
            "starting_balance": 50000,
            "phase1": {
                "profit_target_pct": 8.0,
                "daily_drawdown_pct": 5.0,
                "max_drawdown_pct": 10.0,
                "drawdown_mode": "static",
                "min_trading_days": 1
            },
            "phase2": {
                "profit_target_pct": 5.0,
                "daily_drawdown_pct": 5.0,
                "max_drawdown_pct": 10.0,
                "drawdown_mode": "static",
                "min_trading_days": 1
            },
            "funded": {
                "daily_drawdown_pct": 5.0,
                "max_drawdown_pct": 10.0,
                "drawdown_mode": "trailing"
            }
        },
        "one_step_100k_trailing": {
            "type": "one_step",
            "starting_balance": 100000,
            "phase1": {
                "profit_target_pct": 10.0,
                "max_drawdown_pct": 10.0,
                "drawdown_mode": "trailing",
                "min_trading_days": 1
            },
            "funded": {
                "daily_drawdown_pct": 5.0,
                "max_drawdown_pct": 10.0,
                "drawdown_mode": "trailing"
            }
        }
    }
}"#;

pub fn two_step_50k_rules() -> ProgramRules {
    ProgramCatalog::from_json(STANDARD_CATALOG)
        .expect("standard catalog parses")
        .resolve("two_step_50k")
        .expect("two_step_50k resolves")
}

pub fn one_step_100k_trailing_rules() -> ProgramRules {
    ProgramCatalog::from_json(STANDARD_CATALOG)
        .expect("standard catalog parses")
        .resolve("one_step_100k_trailing")
        .expect("one_step_100k_trailing resolves")
}

/// A round-trip trade closed on `day` with the given whole-currency P&L.
pub fn closing_trade(seq: u64, day: DateTime<Utc>, pnl: i64) -> TradeRecord {
    TradeRecord {
        symbol: "ES".into(),
        side: TradeSide::Long,
        qty: 1,
        entry_price_micros: 5_000 * MICROS_SCALE,
        exit_price_micros: Some((5_000 + pnl) * MICROS_SCALE),
        entry_time: day + Duration::hours(14),
        exit_time: Some(day + Duration::hours(15)),
        fees_micros: 0,
        commission_micros: 0,
        realized_pnl_micros: None,
        seq,
    }
}

/// An entry with no exit yet.
pub fn open_trade(seq: u64, day: DateTime<Utc>) -> TradeRecord {
    TradeRecord {
        symbol: "ES".into(),
        side: TradeSide::Long,
        qty: 1,
        entry_price_micros: 5_000 * MICROS_SCALE,
        exit_price_micros: None,
        entry_time: day + Duration::hours(14),
        exit_time: None,
        fees_micros: 0,
        commission_micros: 0,
        realized_pnl_micros: None,
        seq,
    }
}
