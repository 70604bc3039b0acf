use pfk_schemas::{TradeRecord, TradeSide};

use crate::LedgerError;

fn mul_qty_price_micros(qty: i64, price_diff_micros: i64) -> i64 {
    let wide = (qty as i128) * (price_diff_micros as i128);
    i128_to_i64_clamp(wide)
}

fn i128_to_i64_clamp(x: i128) -> i64 {
    if x > i64::MAX as i128 {
        i64::MAX
    } else if x < i64::MIN as i128 {
        i64::MIN
    } else {
        x as i64
    }
}

/// Structural validation of a trade record. Runs before any state mutation;
/// a failure here means nothing was applied.
pub fn validate(rec: &TradeRecord) -> Result<(), LedgerError> {
    if rec.symbol.trim().is_empty() {
        return Err(LedgerError::EmptySymbol);
    }
    if rec.qty <= 0 {
        return Err(LedgerError::NonPositiveQty { qty: rec.qty });
    }
    if rec.entry_price_micros <= 0 {
        return Err(LedgerError::NonPositivePrice {
            price_micros: rec.entry_price_micros,
        });
    }
    if rec.fees_micros < 0 {
        return Err(LedgerError::NegativeFee {
            fee_micros: rec.fees_micros,
        });
    }
    if rec.commission_micros < 0 {
        return Err(LedgerError::NegativeFee {
            fee_micros: rec.commission_micros,
        });
    }

    // Exit data is all-or-none.
    match (rec.exit_price_micros, rec.exit_time) {
        (None, None) => {}
        (Some(px), Some(t)) => {
            if px <= 0 {
                return Err(LedgerError::NonPositivePrice { price_micros: px });
            }
            if t < rec.entry_time {
                return Err(LedgerError::ExitBeforeEntry);
            }
        }
        _ => return Err(LedgerError::IncompleteExit),
    }

    Ok(())
}

/// Net realized P&L of a closed trade, in micros.
///
/// Uses the upstream-computed value when present; otherwise derives it from
/// entry/exit price, quantity, side, fees and commission. Open trades
/// realize nothing.
pub fn realized_pnl(rec: &TradeRecord) -> i64 {
    if let Some(pnl) = rec.realized_pnl_micros {
        return pnl;
    }
    let exit = match rec.exit_price_micros {
        Some(px) => px,
        None => return 0,
    };

    let diff = match rec.side {
        TradeSide::Long => exit.saturating_sub(rec.entry_price_micros),
        TradeSide::Short => rec.entry_price_micros.saturating_sub(exit),
    };

    mul_qty_price_micros(rec.qty, diff)
        .saturating_sub(rec.fees_micros)
        .saturating_sub(rec.commission_micros)
}
