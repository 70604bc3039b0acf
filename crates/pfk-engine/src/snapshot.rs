use pfk_rules::{assess_drawdown, DrawdownInput, DrawdownLimits};
use pfk_schemas::{DailyAnchor, PhaseAccount, PhaseStatus, PhaseType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display-facing view of a phase, for dashboards and the HTTP surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseSnapshot {
    pub account_id: Uuid,
    pub phase_id: Uuid,
    pub phase_type: PhaseType,
    pub status: PhaseStatus,

    pub equity_micros: i64,
    pub balance_micros: i64,
    pub net_profit_micros: i64,
    pub profit_target_micros: i64,

    pub daily_drawdown_remaining_micros: i64,
    pub max_drawdown_remaining_micros: i64,

    pub trading_days: u32,
    pub min_trading_days: u32,

    /// Net profit as a share of the target, 0..=100. 100 for phases with no
    /// target (nothing left to progress toward).
    pub progress_pct: f64,
}

/// Build the read-only snapshot exposed to external collaborators.
///
/// Falls back to the current balance as the day reference when the day's
/// anchor has not been created yet (same value the lazy anchor would take).
pub fn phase_snapshot(phase: &PhaseAccount, anchor: Option<&DailyAnchor>) -> PhaseSnapshot {
    let anchor_equity = anchor
        .map(|a| a.anchor_equity_micros)
        .unwrap_or(phase.balance_micros);

    let dd = assess_drawdown(
        phase.rules.drawdown_mode,
        DrawdownLimits {
            daily_micros: phase.rules.daily_drawdown_limit_micros,
            max_micros: phase.rules.max_drawdown_limit_micros,
        },
        &DrawdownInput {
            equity_micros: phase.equity_micros,
            anchor_equity_micros: anchor_equity,
            high_water_mark_micros: phase.high_water_mark_micros,
            phase_start_balance_micros: phase.starting_balance_micros,
        },
    );

    let progress_pct = if phase.rules.profit_target_micros <= 0 {
        100.0
    } else {
        let pct =
            (phase.net_profit_micros as f64 / phase.rules.profit_target_micros as f64) * 100.0;
        pct.clamp(0.0, 100.0)
    };

    PhaseSnapshot {
        account_id: phase.account_id,
        phase_id: phase.phase_id,
        phase_type: phase.phase_type,
        status: phase.status,
        equity_micros: phase.equity_micros,
        balance_micros: phase.balance_micros,
        net_profit_micros: phase.net_profit_micros,
        profit_target_micros: phase.rules.profit_target_micros,
        daily_drawdown_remaining_micros: dd.daily_remaining_micros,
        max_drawdown_remaining_micros: dd.max_remaining_micros,
        trading_days: phase.trading_days(),
        min_trading_days: phase.rules.min_trading_days,
        progress_pct,
    }
}
