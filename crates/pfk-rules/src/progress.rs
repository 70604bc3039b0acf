/// Exit criteria for a phase, resolved to absolute amounts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressCriteria {
    /// 0 = no profit target: the phase never advances via progression.
    pub profit_target_micros: i64,
    pub min_trading_days: u32,
    /// Max share of total profit one day may contribute, in basis points.
    /// 0 disables the consistency rule.
    pub consistency_max_bps: u32,
    /// Calendar days allowed to complete the phase. None = no limit.
    pub time_limit_days: Option<u32>,
}

/// State of the phase under evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressInput<'a> {
    pub net_profit_micros: i64,
    pub trading_days: u32,
    /// Net realized profit per distinct trading day.
    pub day_profits: &'a [i64],
    /// Whole calendar days since phase start.
    pub elapsed_days: u32,
}

/// One unsatisfied exit criterion, for diagnostics. Listed in the same
/// order the checks run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnmetCriterion {
    /// Phase has no profit target (e.g. funded); progression never applies.
    NoProfitTarget,
    ProfitTargetNotReached {
        net_profit_micros: i64,
        target_micros: i64,
    },
    InsufficientTradingDays {
        days: u32,
        min_days: u32,
    },
    ConsistencyViolated {
        day_profit_micros: i64,
        max_allowed_micros: i64,
    },
    TimeLimitExceeded {
        elapsed_days: u32,
        limit_days: u32,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressReport {
    /// All exit criteria satisfied; the phase may advance.
    pub ready: bool,
    /// Time limit was exceeded — a failure condition, not merely "not ready".
    pub time_limit_exceeded: bool,
    pub unmet: Vec<UnmetCriterion>,
}

/// Evaluate whether a phase's exit criteria are all satisfied.
///
/// Advance is permitted only when every configured criterion holds. The
/// report lists each unsatisfied criterion; callers treat
/// `time_limit_exceeded` as terminal (same path as a breach) rather than
/// waiting for more trades.
pub fn evaluate_progress(criteria: &ProgressCriteria, inp: &ProgressInput<'_>) -> ProgressReport {
    let mut unmet = Vec::new();
    let mut time_limit_exceeded = false;

    if criteria.profit_target_micros <= 0 {
        unmet.push(UnmetCriterion::NoProfitTarget);
    } else if inp.net_profit_micros < criteria.profit_target_micros {
        unmet.push(UnmetCriterion::ProfitTargetNotReached {
            net_profit_micros: inp.net_profit_micros,
            target_micros: criteria.profit_target_micros,
        });
    }

    if inp.trading_days < criteria.min_trading_days {
        unmet.push(UnmetCriterion::InsufficientTradingDays {
            days: inp.trading_days,
            min_days: criteria.min_trading_days,
        });
    }

    if criteria.consistency_max_bps > 0 && inp.net_profit_micros > 0 {
        let max_allowed = mul_bps(inp.net_profit_micros, criteria.consistency_max_bps);
        // Report the single worst offending day.
        if let Some(&worst) = inp
            .day_profits
            .iter()
            .filter(|p| **p > max_allowed)
            .max()
        {
            unmet.push(UnmetCriterion::ConsistencyViolated {
                day_profit_micros: worst,
                max_allowed_micros: max_allowed,
            });
        }
    }

    if let Some(limit) = criteria.time_limit_days {
        if inp.elapsed_days > limit {
            time_limit_exceeded = true;
            unmet.push(UnmetCriterion::TimeLimitExceeded {
                elapsed_days: inp.elapsed_days,
                limit_days: limit,
            });
        }
    }

    ProgressReport {
        ready: unmet.is_empty(),
        time_limit_exceeded,
        unmet,
    }
}

/// amount * bps / 10_000 with an i128 intermediate.
fn mul_bps(amount_micros: i64, bps: u32) -> i64 {
    let wide = (amount_micros as i128) * (bps as i128) / 10_000;
    if wide > i64::MAX as i128 {
        i64::MAX
    } else if wide < i64::MIN as i128 {
        i64::MIN
    } else {
        wide as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: i64 = 1_000_000;

    fn criteria() -> ProgressCriteria {
        ProgressCriteria {
            profit_target_micros: 4_000 * M,
            min_trading_days: 4,
            consistency_max_bps: 5_000, // no day above 50% of total
            time_limit_days: None,
        }
    }

    #[test]
    fn all_criteria_met_is_ready() {
        let days = [1_000 * M, 1_050 * M, 1_000 * M, 1_000 * M];
        let r = evaluate_progress(
            &criteria(),
            &ProgressInput {
                net_profit_micros: 4_050 * M,
                trading_days: 4,
                day_profits: &days,
                elapsed_days: 10,
            },
        );
        assert!(r.ready, "unmet: {:?}", r.unmet);
        assert!(!r.time_limit_exceeded);
    }

    #[test]
    fn profit_target_short_is_not_ready() {
        let days = [2_000 * M, 1_900 * M];
        let r = evaluate_progress(
            &criteria(),
            &ProgressInput {
                net_profit_micros: 3_900 * M,
                trading_days: 4,
                day_profits: &days,
                elapsed_days: 5,
            },
        );
        assert!(!r.ready);
        assert!(matches!(
            r.unmet[0],
            UnmetCriterion::ProfitTargetNotReached { .. }
        ));
    }

    #[test]
    fn zero_target_never_advances() {
        let r = evaluate_progress(
            &ProgressCriteria {
                profit_target_micros: 0,
                min_trading_days: 0,
                consistency_max_bps: 0,
                time_limit_days: None,
            },
            &ProgressInput {
                net_profit_micros: 100_000 * M,
                trading_days: 30,
                day_profits: &[],
                elapsed_days: 30,
            },
        );
        assert!(!r.ready);
        assert_eq!(r.unmet, vec![UnmetCriterion::NoProfitTarget]);
    }

    #[test]
    fn single_outsized_day_violates_consistency() {
        // 3,000 of 4,100 total on one day = 73% > 50%.
        let days = [3_000 * M, 600 * M, 500 * M, 0];
        let r = evaluate_progress(
            &criteria(),
            &ProgressInput {
                net_profit_micros: 4_100 * M,
                trading_days: 4,
                day_profits: &days,
                elapsed_days: 8,
            },
        );
        assert!(!r.ready);
        assert!(r
            .unmet
            .iter()
            .any(|u| matches!(u, UnmetCriterion::ConsistencyViolated { .. })));
    }

    #[test]
    fn time_limit_exceeded_is_failure_not_pending() {
        let mut c = criteria();
        c.time_limit_days = Some(30);
        let r = evaluate_progress(
            &c,
            &ProgressInput {
                net_profit_micros: 0,
                trading_days: 1,
                day_profits: &[0],
                elapsed_days: 31,
            },
        );
        assert!(!r.ready);
        assert!(r.time_limit_exceeded);
    }
}
