use chrono::{DateTime, Utc};
use pfk_schemas::DailyAnchor;
use uuid::Uuid;

/// Ensure exactly one anchor exists for (account, day).
///
/// Returns the anchor to insert when the day has none yet; `None` when one
/// already exists. An existing anchor is never overwritten — replacing it
/// would retroactively corrupt the day's drawdown reference point.
///
/// `balance_micros` must be the account's balance *before* the state change
/// being evaluated: the first trade of a new day measures its drawdown from
/// where the day opened, not from where the trade left it.
///
/// Anchors are keyed per (account, day), not per phase. A phase opened
/// mid-day trades against the anchor the prior phase recorded for that day
/// until the next day's anchor is written.
pub fn ensure_anchor(
    existing: Option<&DailyAnchor>,
    account_id: Uuid,
    day_id: u32,
    balance_micros: i64,
    now: DateTime<Utc>,
) -> Option<DailyAnchor> {
    if let Some(a) = existing {
        if a.day_id == day_id {
            return None;
        }
    }
    Some(DailyAnchor {
        account_id,
        day_id,
        anchor_equity_micros: balance_micros,
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn existing_day_anchor_is_a_no_op() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let id = Uuid::new_v4();
        let existing = DailyAnchor {
            account_id: id,
            day_id: 20260302,
            anchor_equity_micros: 50_000_000_000,
            created_at: now,
        };
        assert_eq!(
            ensure_anchor(Some(&existing), id, 20260302, 49_000_000_000, now),
            None
        );
    }

    #[test]
    fn missing_anchor_is_created_from_balance() {
        let now = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
        let id = Uuid::new_v4();
        let a = ensure_anchor(None, id, 20260303, 51_250_000_000, now).expect("created");
        assert_eq!(a.day_id, 20260303);
        assert_eq!(a.anchor_equity_micros, 51_250_000_000);
    }
}
