use pfk_schemas::{BreachType, DrawdownMode};

/// Inputs for one drawdown assessment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawdownInput {
    /// Equity after the trade under evaluation.
    pub equity_micros: i64,
    /// Today's anchor equity (the day-start reference). The anchor manager
    /// guarantees presence; this kernel takes a concrete value.
    pub anchor_equity_micros: i64,
    /// Greatest equity observed since phase start. Monotone non-decreasing.
    pub high_water_mark_micros: i64,
    /// Balance the phase started from.
    pub phase_start_balance_micros: i64,
}

/// Absolute limits, resolved to micros once at phase creation.
/// A limit of 0 disables that check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawdownLimits {
    pub daily_micros: i64,
    pub max_micros: i64,
}

/// Drawdown usage and breach status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawdownReport {
    pub daily_used_micros: i64,
    /// Limit minus usage, clamped at 0. Reported as 0 when the check is disabled.
    pub daily_remaining_micros: i64,
    pub max_used_micros: i64,
    pub max_remaining_micros: i64,
    pub breach: Option<BreachType>,
}

impl DrawdownReport {
    pub fn breached(&self) -> bool {
        self.breach.is_some()
    }

    /// Usage of the breached limit, 0 when not breached.
    pub fn breach_amount_micros(&self) -> i64 {
        match self.breach {
            Some(BreachType::DailyDrawdown) => self.daily_used_micros,
            Some(BreachType::MaxDrawdown) => self.max_used_micros,
            None => 0,
        }
    }
}

/// Compute daily and maximum drawdown usage and breach status.
///
/// - Daily usage is the decline from today's anchor equity, clamped ≥ 0.
/// - Maximum usage is the decline from the mode's reference point: the phase
///   starting balance (`Static`) or the high-water mark (`Trailing`).
/// - When both limits are exceeded by the same state, the maximum-drawdown
///   breach wins — it is the more severe, terminal condition.
///
/// The high-water mark can never sit below the starting balance (phases open
/// with hwm = starting balance and it only ratchets upward); a violation is a
/// bug upstream, so this asserts rather than silently correcting.
pub fn assess_drawdown(
    mode: DrawdownMode,
    limits: DrawdownLimits,
    inp: &DrawdownInput,
) -> DrawdownReport {
    assert!(
        inp.high_water_mark_micros >= inp.phase_start_balance_micros,
        "high-water mark {} below phase start balance {}",
        inp.high_water_mark_micros,
        inp.phase_start_balance_micros,
    );

    let daily_used = (inp.anchor_equity_micros.saturating_sub(inp.equity_micros)).max(0);

    let reference = match mode {
        DrawdownMode::Static => inp.phase_start_balance_micros,
        DrawdownMode::Trailing => inp.high_water_mark_micros,
    };
    let max_used = (reference.saturating_sub(inp.equity_micros)).max(0);

    let daily_breach = limits.daily_micros > 0 && daily_used > limits.daily_micros;
    let max_breach = limits.max_micros > 0 && max_used > limits.max_micros;

    // Max takes precedence when both hold simultaneously.
    let breach = if max_breach {
        Some(BreachType::MaxDrawdown)
    } else if daily_breach {
        Some(BreachType::DailyDrawdown)
    } else {
        None
    };

    DrawdownReport {
        daily_used_micros: daily_used,
        daily_remaining_micros: remaining(limits.daily_micros, daily_used),
        max_used_micros: max_used,
        max_remaining_micros: remaining(limits.max_micros, max_used),
        breach,
    }
}

fn remaining(limit: i64, used: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    limit.saturating_sub(used).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pfk_schemas::MICROS_SCALE as M;

    fn inp(equity: i64, anchor: i64, hwm: i64, start: i64) -> DrawdownInput {
        DrawdownInput {
            equity_micros: equity * M,
            anchor_equity_micros: anchor * M,
            high_water_mark_micros: hwm * M,
            phase_start_balance_micros: start * M,
        }
    }

    #[test]
    fn no_usage_when_equity_above_anchor() {
        let r = assess_drawdown(
            DrawdownMode::Static,
            DrawdownLimits { daily_micros: 2_500 * M, max_micros: 5_000 * M },
            &inp(51_000, 50_000, 51_000, 50_000),
        );
        assert_eq!(r.daily_used_micros, 0);
        assert_eq!(r.max_used_micros, 0);
        assert_eq!(r.breach, None);
    }

    #[test]
    fn max_precedence_over_daily_when_both_exceeded() {
        // Daily used 6,000 > 2,500 and static max used 6,000 > 5,000.
        let r = assess_drawdown(
            DrawdownMode::Static,
            DrawdownLimits { daily_micros: 2_500 * M, max_micros: 5_000 * M },
            &inp(44_000, 50_000, 50_000, 50_000),
        );
        assert_eq!(r.breach, Some(BreachType::MaxDrawdown));
        assert_eq!(r.breach_amount_micros(), 6_000 * M);
    }

    #[test]
    fn zero_limit_disables_check() {
        let r = assess_drawdown(
            DrawdownMode::Static,
            DrawdownLimits { daily_micros: 0, max_micros: 0 },
            &inp(10_000, 50_000, 50_000, 50_000),
        );
        assert_eq!(r.breach, None);
        assert_eq!(r.daily_remaining_micros, 0);
    }

    #[test]
    #[should_panic(expected = "high-water mark")]
    fn hwm_below_start_balance_asserts() {
        let _ = assess_drawdown(
            DrawdownMode::Trailing,
            DrawdownLimits { daily_micros: 0, max_micros: 1_000 * M },
            &inp(49_000, 50_000, 49_500, 50_000),
        );
    }
}
