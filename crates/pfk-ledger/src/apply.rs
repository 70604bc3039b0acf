use pfk_schemas::{day_id_utc, PhaseAccount, PhaseStatus, TradeRecord};

use crate::pnl::{realized_pnl, validate};
use crate::LedgerError;

/// What one `apply_trade` call did to the phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedTrade {
    /// Net realized P&L applied (0 for open trades).
    pub pnl_micros: i64,
    /// Whether the trade carried closing data (and therefore moved equity).
    pub closed: bool,
    /// Trading day the P&L landed on (exit day), when closed.
    pub day_id: Option<u32>,
    pub equity_after_micros: i64,
    pub balance_after_micros: i64,
    pub high_water_mark_after_micros: i64,
}

/// Apply one trade's realized P&L to the active phase.
///
/// Checks run in a fixed order — phase status, structural validation,
/// sequence position — and the phase is only mutated after all of them
/// pass. On error the phase is byte-identical to before the call.
///
/// Updates for a closing trade: equity and balance move by net P&L
/// (clamped at 0, equity and balance are never negative), the high-water
/// mark ratchets up, trade/win counters and the per-day profit map advance,
/// and the phase's last applied sequence is recorded.
pub fn apply_trade(
    phase: &mut PhaseAccount,
    rec: &TradeRecord,
) -> Result<AppliedTrade, LedgerError> {
    if phase.status != PhaseStatus::Active {
        return Err(LedgerError::PhaseNotActive {
            status: phase.status,
        });
    }

    validate(rec)?;

    if rec.seq <= phase.last_seq {
        return Err(LedgerError::StaleSequence {
            supplied: rec.seq,
            last: phase.last_seq,
        });
    }

    let closed = rec.is_closed();
    let pnl = if closed { realized_pnl(rec) } else { 0 };

    phase.trade_count += 1;
    phase.last_seq = rec.seq;

    let mut day_id = None;
    if closed {
        phase.equity_micros = phase.equity_micros.saturating_add(pnl).max(0);
        phase.balance_micros = phase.balance_micros.saturating_add(pnl).max(0);
        if phase.equity_micros > phase.high_water_mark_micros {
            phase.high_water_mark_micros = phase.equity_micros;
        }
        phase.net_profit_micros = phase.net_profit_micros.saturating_add(pnl);
        if pnl > 0 {
            phase.win_count += 1;
        }

        // exit_time presence is guaranteed by is_closed + validation
        let day = day_id_utc(rec.exit_time.unwrap_or(rec.entry_time));
        *phase.day_profits.entry(day).or_insert(0) += pnl;
        day_id = Some(day);
    }

    Ok(AppliedTrade {
        pnl_micros: pnl,
        closed,
        day_id,
        equity_after_micros: phase.equity_micros,
        balance_after_micros: phase.balance_micros,
        high_water_mark_after_micros: phase.high_water_mark_micros,
    })
}
