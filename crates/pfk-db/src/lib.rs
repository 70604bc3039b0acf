//! pfk-db
//!
//! Postgres persistence for the evaluation kernel. The engine itself is
//! pure; every write path here loads the account's rows inside a
//! transaction, locks the master account row (`SELECT ... FOR UPDATE`, the
//! per-account exclusion scope), runs the engine, and commits the resulting
//! [`Outcome`] atomically. Serialization failures are retried a bounded
//! number of times before surfacing `ConcurrencyConflict`.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

use pfk_engine::{
    evaluate_phase, evaluate_trade, phase_snapshot, plan_reset, EngineError, Outcome, PhaseSnapshot,
    ResetOutcome, ResetRequest,
};
use pfk_schemas::{
    day_id_utc, AccountStatus, Breach, BreachType, DailyAnchor, MasterAccount, PhaseAccount,
    PhaseStatus, PhaseType, ProgramRules, ProgramType, Trade, TradeRecord, TradeSide, Transition,
    TransitionReason,
};

pub const ENV_DB_URL: &str = "PFK_DATABASE_URL";

/// Bounded retry budget for serialization/deadlock failures.
const MAX_RETRIES: u32 = 3;

/// Connect to Postgres using PFK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='master_accounts'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_accounts_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_accounts_table: bool,
}

/// Count accounts still mid-evaluation. Used by CLI guardrails to prevent
/// accidental migration of a live DB.
pub async fn count_active_accounts(pool: &PgPool) -> Result<i64> {
    // If schema doesn't exist yet, treat as 0 (safe) rather than failing.
    let st = status(pool).await?;
    if !st.has_accounts_table {
        return Ok(0);
    }

    let (n,): (i64,) =
        sqlx::query_as::<_, (i64,)>("select count(*)::bigint from master_accounts where active")
            .fetch_one(pool)
            .await
            .context("count_active_accounts failed")?;

    Ok(n)
}

/// Convenience boolean.
pub async fn has_active_accounts(pool: &PgPool) -> Result<bool> {
    Ok(count_active_accounts(pool).await? > 0)
}

// ---------------------------------------------------------------------------
// Enrollment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub account_id: Uuid,
    pub rules: ProgramRules,
    pub allow_manual_reset: bool,
}

/// An account row together with its resolved program rule set.
#[derive(Debug, Clone)]
pub struct AccountBundle {
    pub account: MasterAccount,
    pub rules: ProgramRules,
}

/// Enroll a new account: master row, first Active phase, and the day-zero
/// anchor, in one transaction.
pub async fn init_account(
    pool: &PgPool,
    new: &NewAccount,
    now: DateTime<Utc>,
) -> Result<(MasterAccount, PhaseAccount)> {
    let first_type = new.rules.first_phase_type();
    let phase_rules = new
        .rules
        .rules_for(first_type)
        .ok_or_else(|| anyhow!("program rules missing for {}", first_type.as_str()))?
        .clone();
    let phase = PhaseAccount::open(new.account_id, first_type, phase_rules, now);

    let status = if first_type == PhaseType::Funded {
        AccountStatus::Funded
    } else {
        AccountStatus::Active
    };
    let account = MasterAccount {
        account_id: new.account_id,
        program: new.rules.program_type(),
        starting_balance_micros: phase.starting_balance_micros,
        current_phase_number: 1,
        active: true,
        status,
        active_phase_id: Some(phase.phase_id),
        allow_manual_reset: new.allow_manual_reset,
        created_at: now,
    };

    let mut tx = pool.begin().await.context("init_account begin tx")?;

    sqlx::query(
        r#"
        insert into master_accounts (
          account_id, program, program_rules, starting_balance_micros,
          current_phase_number, active, status, active_phase_id,
          allow_manual_reset, created_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(account.account_id)
    .bind(account.program.as_str())
    .bind(serde_json::to_value(&new.rules).context("serialize program rules")?)
    .bind(account.starting_balance_micros)
    .bind(account.current_phase_number as i32)
    .bind(account.active)
    .bind(account.status.as_str())
    .bind(account.active_phase_id)
    .bind(account.allow_manual_reset)
    .bind(account.created_at)
    .execute(&mut *tx)
    .await
    .context("insert master_account failed")?;

    insert_phase(&mut tx, &phase).await?;

    let anchor = DailyAnchor {
        account_id: account.account_id,
        day_id: day_id_utc(now),
        anchor_equity_micros: phase.starting_balance_micros,
        created_at: now,
    };
    insert_anchor(&mut tx, &anchor).await?;

    tx.commit().await.context("init_account commit")?;
    Ok((account, phase))
}

// ---------------------------------------------------------------------------
// Fetches
// ---------------------------------------------------------------------------

pub async fn fetch_account(pool: &PgPool, account_id: Uuid) -> Result<AccountBundle> {
    account_query(pool, account_id, false).await
}

async fn fetch_account_for_update(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
) -> Result<AccountBundle> {
    account_query(&mut **tx, account_id, true).await
}

async fn account_query<'e>(
    ex: impl PgExecutor<'e>,
    account_id: Uuid,
    lock: bool,
) -> Result<AccountBundle> {
    let base = r#"
        select
          account_id, program, program_rules, starting_balance_micros,
          current_phase_number, active, status, active_phase_id,
          allow_manual_reset, created_at
        from master_accounts
        where account_id = $1
        "#;
    let sql = if lock {
        format!("{base} for update")
    } else {
        base.to_string()
    };

    let row = sqlx::query(&sql)
        .bind(account_id)
        .fetch_optional(ex)
        .await
        .context("fetch_account failed")?
        .ok_or_else(|| anyhow!("unknown account {account_id}"))?;

    let program_str: String = row.try_get("program")?;
    let status_str: String = row.try_get("status")?;
    let rules: ProgramRules = serde_json::from_value(row.try_get("program_rules")?)
        .context("deserialize program rules")?;

    let account = MasterAccount {
        account_id: row.try_get("account_id")?,
        program: ProgramType::parse(&program_str)
            .ok_or_else(|| anyhow!("invalid program type: {program_str}"))?,
        starting_balance_micros: row.try_get("starting_balance_micros")?,
        current_phase_number: row.try_get::<i32, _>("current_phase_number")? as u32,
        active: row.try_get("active")?,
        status: AccountStatus::parse(&status_str)
            .ok_or_else(|| anyhow!("invalid account status: {status_str}"))?,
        active_phase_id: row.try_get("active_phase_id")?,
        allow_manual_reset: row.try_get("allow_manual_reset")?,
        created_at: row.try_get("created_at")?,
    };

    Ok(AccountBundle { account, rules })
}

const PHASE_COLUMNS: &str = r#"
    phase_id, account_id, phase_type, status, rules,
    starting_balance_micros, equity_micros, balance_micros,
    high_water_mark_micros, net_profit_micros, trade_count, win_count,
    day_profits, last_seq, started_at, ended_at
"#;

pub async fn fetch_phase(pool: &PgPool, phase_id: Uuid) -> Result<PhaseAccount> {
    fetch_phase_ex(pool, phase_id).await
}

async fn fetch_phase_ex<'e>(ex: impl PgExecutor<'e>, phase_id: Uuid) -> Result<PhaseAccount> {
    let row = sqlx::query(&format!(
        "select {PHASE_COLUMNS} from phase_accounts where phase_id = $1"
    ))
    .bind(phase_id)
    .fetch_one(ex)
    .await
    .context("fetch_phase failed")?;
    phase_from_row(&row)
}

/// The phase the account's `active_phase_id` pointer names, or, for a
/// deactivated account, the most recently started phase (so PhaseNotActive
/// carries the real terminal status).
pub async fn fetch_current_phase(pool: &PgPool, account_id: Uuid) -> Result<PhaseAccount> {
    let bundle = fetch_account(pool, account_id).await?;
    current_phase_ex(pool, &bundle.account).await
}

async fn current_phase_ex<'e>(
    ex: impl PgExecutor<'e>,
    account: &MasterAccount,
) -> Result<PhaseAccount> {
    if let Some(phase_id) = account.active_phase_id {
        return fetch_phase_ex(ex, phase_id).await;
    }
    let row = sqlx::query(&format!(
        "select {PHASE_COLUMNS} from phase_accounts where account_id = $1 \
         order by started_at desc limit 1"
    ))
    .bind(account.account_id)
    .fetch_optional(ex)
    .await
    .context("fetch latest phase failed")?
    .ok_or_else(|| anyhow!("account {} has no phases", account.account_id))?;
    phase_from_row(&row)
}

pub async fn fetch_anchor(
    pool: &PgPool,
    account_id: Uuid,
    day_id: u32,
) -> Result<Option<DailyAnchor>> {
    fetch_anchor_ex(pool, account_id, day_id).await
}

async fn fetch_anchor_ex<'e>(
    ex: impl PgExecutor<'e>,
    account_id: Uuid,
    day_id: u32,
) -> Result<Option<DailyAnchor>> {
    let row = sqlx::query(
        r#"
        select account_id, day_id, anchor_equity_micros, created_at
        from daily_anchors
        where account_id = $1 and day_id = $2
        "#,
    )
    .bind(account_id)
    .bind(day_id as i32)
    .fetch_optional(ex)
    .await
    .context("fetch_anchor failed")?;

    row.map(|r| {
        Ok(DailyAnchor {
            account_id: r.try_get("account_id")?,
            day_id: r.try_get::<i32, _>("day_id")? as u32,
            anchor_equity_micros: r.try_get("anchor_equity_micros")?,
            created_at: r.try_get("created_at")?,
        })
    })
    .transpose()
}

/// Account bundle plus the current phase's read-only snapshot, using the
/// evaluation day's anchor (falling back to balance when none exists yet).
pub async fn load_phase_snapshot(
    pool: &PgPool,
    account_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(AccountBundle, PhaseSnapshot)> {
    let bundle = fetch_account(pool, account_id).await?;
    let phase = current_phase_ex(pool, &bundle.account).await?;
    let anchor = fetch_anchor(pool, account_id, day_id_utc(now)).await?;
    let snap = phase_snapshot(&phase, anchor.as_ref());
    Ok((bundle, snap))
}

fn phase_from_row(row: &sqlx::postgres::PgRow) -> Result<PhaseAccount> {
    let phase_type_str: String = row.try_get("phase_type")?;
    let status_str: String = row.try_get("status")?;

    Ok(PhaseAccount {
        phase_id: row.try_get("phase_id")?,
        account_id: row.try_get("account_id")?,
        phase_type: PhaseType::parse(&phase_type_str)
            .ok_or_else(|| anyhow!("invalid phase type: {phase_type_str}"))?,
        status: PhaseStatus::parse(&status_str)
            .ok_or_else(|| anyhow!("invalid phase status: {status_str}"))?,
        rules: serde_json::from_value(row.try_get("rules")?).context("deserialize phase rules")?,
        starting_balance_micros: row.try_get("starting_balance_micros")?,
        equity_micros: row.try_get("equity_micros")?,
        balance_micros: row.try_get("balance_micros")?,
        high_water_mark_micros: row.try_get("high_water_mark_micros")?,
        net_profit_micros: row.try_get("net_profit_micros")?,
        trade_count: row.try_get::<i32, _>("trade_count")? as u32,
        win_count: row.try_get::<i32, _>("win_count")? as u32,
        day_profits: serde_json::from_value(row.try_get("day_profits")?)
            .context("deserialize day profits")?,
        last_seq: row.try_get::<i64, _>("last_seq")? as u64,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

// ---------------------------------------------------------------------------
// Write paths
// ---------------------------------------------------------------------------

/// Ingest one trade: lock, evaluate, commit the outcome. Retries bounded
/// on serialization/deadlock SQLSTATEs; duplicate (phase, seq) surfaces as
/// a sequence conflict rather than a raw constraint error.
pub async fn ingest_trade(
    pool: &PgPool,
    account_id: Uuid,
    rec: &TradeRecord,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    let mut attempt: u32 = 0;
    loop {
        match try_ingest(pool, account_id, rec, now).await {
            Ok(out) => return Ok(out),
            Err(e) => {
                if is_unique_violation(&e, "uq_phase_trade_seq") {
                    return Err(anyhow::Error::new(EngineError::SequenceConflict {
                        supplied: rec.seq,
                        last: rec.seq,
                    }));
                }
                if is_retryable(&e) {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        return Err(anyhow::Error::new(EngineError::ConcurrencyConflict {
                            retries: MAX_RETRIES,
                        }));
                    }
                    tokio::time::sleep(Duration::from_millis(25 << attempt)).await;
                    continue;
                }
                return Err(e);
            }
        }
    }
}

async fn try_ingest(
    pool: &PgPool,
    account_id: Uuid,
    rec: &TradeRecord,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    let mut tx = pool.begin().await.context("ingest begin tx")?;

    let bundle = fetch_account_for_update(&mut tx, account_id).await?;
    let phase = current_phase_ex(&mut *tx, &bundle.account).await?;

    let day_id = day_id_utc(rec.exit_time.unwrap_or(rec.entry_time));
    let anchor = fetch_anchor_ex(&mut *tx, account_id, day_id).await?;

    let out = evaluate_trade(&bundle.account, &phase, anchor.as_ref(), &bundle.rules, rec, now)?;
    commit_outcome(&mut tx, &out).await?;

    tx.commit().await.context("ingest commit")?;
    Ok(out)
}

/// Manual evaluation trigger: re-run drawdown + progress against current
/// state. Committing twice in a row appends nothing the second time.
pub async fn run_manual_evaluation(
    pool: &PgPool,
    account_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    let mut attempt: u32 = 0;
    loop {
        match try_manual_evaluation(pool, account_id, now).await {
            Ok(out) => return Ok(out),
            Err(e) if is_retryable(&e) => {
                attempt += 1;
                if attempt > MAX_RETRIES {
                    return Err(anyhow::Error::new(EngineError::ConcurrencyConflict {
                        retries: MAX_RETRIES,
                    }));
                }
                tokio::time::sleep(Duration::from_millis(25 << attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn try_manual_evaluation(
    pool: &PgPool,
    account_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    let mut tx = pool.begin().await.context("evaluate begin tx")?;

    let bundle = fetch_account_for_update(&mut tx, account_id).await?;
    let phase = current_phase_ex(&mut *tx, &bundle.account).await?;
    let anchor = fetch_anchor_ex(&mut *tx, account_id, day_id_utc(now)).await?;

    let out = evaluate_phase(&bundle.account, &phase, anchor.as_ref(), &bundle.rules, now)?;
    commit_outcome(&mut tx, &out).await?;

    tx.commit().await.context("evaluate commit")?;
    Ok(out)
}

/// Anchor all active accounts for the given day at their current phase
/// balance. Write-once: accounts already anchored are skipped. Returns the
/// number of anchors created.
pub async fn anchor_sweep(pool: &PgPool, day_id: u32, now: DateTime<Utc>) -> Result<u64> {
    let res = sqlx::query(
        r#"
        insert into daily_anchors (account_id, day_id, anchor_equity_micros, created_at)
        select ma.account_id, $1, pa.balance_micros, $2
        from master_accounts ma
        join phase_accounts pa on pa.phase_id = ma.active_phase_id
        where ma.active
        on conflict (account_id, day_id) do nothing
        "#,
    )
    .bind(day_id as i32)
    .bind(now)
    .execute(pool)
    .await
    .context("anchor_sweep failed")?;

    Ok(res.rows_affected())
}

/// Reset an account per the engine's plan: close the prior phase, open the
/// new one, re-anchor day zero, and clear transient history (trade rows
/// only when the request says so).
pub async fn reset_account(
    pool: &PgPool,
    account_id: Uuid,
    req: &ResetRequest,
    now: DateTime<Utc>,
) -> Result<ResetOutcome> {
    let mut tx = pool.begin().await.context("reset begin tx")?;

    let bundle = fetch_account_for_update(&mut tx, account_id).await?;
    let phase = current_phase_ex(&mut *tx, &bundle.account).await?;

    let out = plan_reset(&bundle.account, &phase, &bundle.rules, req, now)?;

    update_phase(&mut tx, &out.closed_phase).await?;
    insert_phase(&mut tx, &out.new_phase).await?;
    update_account(&mut tx, &out.account_after).await?;

    if out.clear_trade_history {
        sqlx::query("delete from trades where account_id = $1")
            .bind(account_id)
            .execute(&mut *tx)
            .await
            .context("reset delete trades failed")?;
    }
    sqlx::query("delete from daily_anchors where account_id = $1")
        .bind(account_id)
        .execute(&mut *tx)
        .await
        .context("reset delete anchors failed")?;

    insert_anchor(&mut tx, &out.new_anchor).await?;
    insert_transition(&mut tx, &out.transition).await?;

    tx.commit().await.context("reset commit")?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Outcome commit
// ---------------------------------------------------------------------------

/// Apply every effect of an [`Outcome`] inside the caller's transaction.
async fn commit_outcome(tx: &mut Transaction<'_, Postgres>, out: &Outcome) -> Result<()> {
    if let Some(anchor) = &out.new_anchor {
        insert_anchor(tx, anchor).await?;
    }
    if let Some(trade) = &out.trade {
        insert_trade(tx, trade).await?;
    }

    update_phase(tx, &out.phase_after).await?;

    if let Some(new_phase) = &out.new_phase {
        insert_phase(tx, new_phase).await?;
    }
    update_account(tx, &out.account_after).await?;

    if let Some(breach) = &out.breach {
        insert_breach(tx, breach).await?;
    }
    if let Some(transition) = &out.transition {
        insert_transition(tx, transition).await?;
    }
    Ok(())
}

async fn insert_phase(tx: &mut Transaction<'_, Postgres>, phase: &PhaseAccount) -> Result<()> {
    sqlx::query(
        r#"
        insert into phase_accounts (
          phase_id, account_id, phase_type, status, rules,
          starting_balance_micros, equity_micros, balance_micros,
          high_water_mark_micros, net_profit_micros, trade_count, win_count,
          day_profits, last_seq, started_at, ended_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(phase.phase_id)
    .bind(phase.account_id)
    .bind(phase.phase_type.as_str())
    .bind(phase.status.as_str())
    .bind(serde_json::to_value(&phase.rules).context("serialize phase rules")?)
    .bind(phase.starting_balance_micros)
    .bind(phase.equity_micros)
    .bind(phase.balance_micros)
    .bind(phase.high_water_mark_micros)
    .bind(phase.net_profit_micros)
    .bind(phase.trade_count as i32)
    .bind(phase.win_count as i32)
    .bind(serde_json::to_value(&phase.day_profits).context("serialize day profits")?)
    .bind(phase.last_seq as i64)
    .bind(phase.started_at)
    .bind(phase.ended_at)
    .execute(&mut **tx)
    .await
    .context("insert phase_account failed")?;
    Ok(())
}

async fn update_phase(tx: &mut Transaction<'_, Postgres>, phase: &PhaseAccount) -> Result<()> {
    sqlx::query(
        r#"
        update phase_accounts
        set status = $2,
            equity_micros = $3,
            balance_micros = $4,
            high_water_mark_micros = $5,
            net_profit_micros = $6,
            trade_count = $7,
            win_count = $8,
            day_profits = $9,
            last_seq = $10,
            ended_at = $11
        where phase_id = $1
        "#,
    )
    .bind(phase.phase_id)
    .bind(phase.status.as_str())
    .bind(phase.equity_micros)
    .bind(phase.balance_micros)
    .bind(phase.high_water_mark_micros)
    .bind(phase.net_profit_micros)
    .bind(phase.trade_count as i32)
    .bind(phase.win_count as i32)
    .bind(serde_json::to_value(&phase.day_profits).context("serialize day profits")?)
    .bind(phase.last_seq as i64)
    .bind(phase.ended_at)
    .execute(&mut **tx)
    .await
    .context("update phase_account failed")?;
    Ok(())
}

async fn update_account(tx: &mut Transaction<'_, Postgres>, account: &MasterAccount) -> Result<()> {
    sqlx::query(
        r#"
        update master_accounts
        set current_phase_number = $2,
            active = $3,
            status = $4,
            active_phase_id = $5
        where account_id = $1
        "#,
    )
    .bind(account.account_id)
    .bind(account.current_phase_number as i32)
    .bind(account.active)
    .bind(account.status.as_str())
    .bind(account.active_phase_id)
    .execute(&mut **tx)
    .await
    .context("update master_account failed")?;
    Ok(())
}

async fn insert_trade(tx: &mut Transaction<'_, Postgres>, trade: &Trade) -> Result<()> {
    sqlx::query(
        r#"
        insert into trades (
          trade_id, account_id, phase_id, symbol, side, qty,
          entry_price_micros, exit_price_micros, entry_time, exit_time,
          fees_micros, commission_micros, applied_pnl_micros, seq, applied_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(trade.trade_id)
    .bind(trade.account_id)
    .bind(trade.phase_id)
    .bind(&trade.record.symbol)
    .bind(trade.record.side.as_str())
    .bind(trade.record.qty)
    .bind(trade.record.entry_price_micros)
    .bind(trade.record.exit_price_micros)
    .bind(trade.record.entry_time)
    .bind(trade.record.exit_time)
    .bind(trade.record.fees_micros)
    .bind(trade.record.commission_micros)
    .bind(trade.applied_pnl_micros)
    .bind(trade.record.seq as i64)
    .bind(trade.applied_at)
    .execute(&mut **tx)
    .await
    .context("insert trade failed")?;
    Ok(())
}

async fn insert_anchor(tx: &mut Transaction<'_, Postgres>, anchor: &DailyAnchor) -> Result<()> {
    // Write-once: a concurrent writer winning the race is fine, the anchor
    // value is the same either way.
    sqlx::query(
        r#"
        insert into daily_anchors (account_id, day_id, anchor_equity_micros, created_at)
        values ($1, $2, $3, $4)
        on conflict (account_id, day_id) do nothing
        "#,
    )
    .bind(anchor.account_id)
    .bind(anchor.day_id as i32)
    .bind(anchor.anchor_equity_micros)
    .bind(anchor.created_at)
    .execute(&mut **tx)
    .await
    .context("insert daily_anchor failed")?;
    Ok(())
}

async fn insert_breach(tx: &mut Transaction<'_, Postgres>, breach: &Breach) -> Result<()> {
    sqlx::query(
        r#"
        insert into breaches (
          breach_id, account_id, phase_id, breach_type, breach_amount_micros,
          equity_at_breach_micros, trade_id, ts
        ) values ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(breach.breach_id)
    .bind(breach.account_id)
    .bind(breach.phase_id)
    .bind(breach.breach_type.as_str())
    .bind(breach.breach_amount_micros)
    .bind(breach.equity_at_breach_micros)
    .bind(breach.trade_id)
    .bind(breach.ts)
    .execute(&mut **tx)
    .await
    .context("insert breach failed")?;
    Ok(())
}

async fn insert_transition(tx: &mut Transaction<'_, Postgres>, t: &Transition) -> Result<()> {
    sqlx::query(
        r#"
        insert into transitions (
          transition_id, account_id, from_phase, to_phase,
          from_status, to_status, reason, actor, ts
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(t.transition_id)
    .bind(t.account_id)
    .bind(t.from_phase)
    .bind(t.to_phase)
    .bind(&t.from_status)
    .bind(&t.to_status)
    .bind(t.reason.as_str())
    .bind(&t.actor)
    .bind(t.ts)
    .execute(&mut **tx)
    .await
    .context("insert transition failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

pub async fn recent_breaches(pool: &PgPool, limit: i64) -> Result<Vec<Breach>> {
    let rows = sqlx::query(
        r#"
        select breach_id, account_id, phase_id, breach_type,
               breach_amount_micros, equity_at_breach_micros, trade_id, ts
        from breaches
        order by ts desc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("recent_breaches failed")?;

    rows.iter()
        .map(|row| {
            let bt: String = row.try_get("breach_type")?;
            Ok(Breach {
                breach_id: row.try_get("breach_id")?,
                account_id: row.try_get("account_id")?,
                phase_id: row.try_get("phase_id")?,
                breach_type: BreachType::parse(&bt)
                    .ok_or_else(|| anyhow!("invalid breach type: {bt}"))?,
                breach_amount_micros: row.try_get("breach_amount_micros")?,
                equity_at_breach_micros: row.try_get("equity_at_breach_micros")?,
                trade_id: row.try_get("trade_id")?,
                ts: row.try_get("ts")?,
            })
        })
        .collect()
}

pub async fn recent_transitions(pool: &PgPool, limit: i64) -> Result<Vec<Transition>> {
    let rows = sqlx::query(
        r#"
        select transition_id, account_id, from_phase, to_phase,
               from_status, to_status, reason, actor, ts
        from transitions
        order by ts desc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("recent_transitions failed")?;

    rows.iter()
        .map(|row| {
            let reason: String = row.try_get("reason")?;
            Ok(Transition {
                transition_id: row.try_get("transition_id")?,
                account_id: row.try_get("account_id")?,
                from_phase: row.try_get("from_phase")?,
                to_phase: row.try_get("to_phase")?,
                from_status: row.try_get("from_status")?,
                to_status: row.try_get("to_status")?,
                reason: TransitionReason::parse(&reason)
                    .ok_or_else(|| anyhow!("invalid transition reason: {reason}"))?,
                actor: row.try_get("actor")?,
                ts: row.try_get("ts")?,
            })
        })
        .collect()
}

/// Most recent trades for an account, newest first.
pub async fn list_trades(pool: &PgPool, account_id: Uuid, limit: i64) -> Result<Vec<Trade>> {
    let rows = sqlx::query(
        r#"
        select trade_id, account_id, phase_id, symbol, side, qty,
               entry_price_micros, exit_price_micros, entry_time, exit_time,
               fees_micros, commission_micros, applied_pnl_micros, seq, applied_at
        from trades
        where account_id = $1
        order by applied_at desc
        limit $2
        "#,
    )
    .bind(account_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list_trades failed")?;

    rows.iter()
        .map(|row| {
            let side: String = row.try_get("side")?;
            let applied_pnl_micros: i64 = row.try_get("applied_pnl_micros")?;
            Ok(Trade {
                trade_id: row.try_get("trade_id")?,
                account_id: row.try_get("account_id")?,
                phase_id: row.try_get("phase_id")?,
                record: TradeRecord {
                    symbol: row.try_get("symbol")?,
                    side: TradeSide::parse(&side)
                        .ok_or_else(|| anyhow!("invalid trade side: {side}"))?,
                    qty: row.try_get("qty")?,
                    entry_price_micros: row.try_get("entry_price_micros")?,
                    exit_price_micros: row.try_get("exit_price_micros")?,
                    entry_time: row.try_get("entry_time")?,
                    exit_time: row.try_get("exit_time")?,
                    fees_micros: row.try_get("fees_micros")?,
                    commission_micros: row.try_get("commission_micros")?,
                    realized_pnl_micros: Some(applied_pnl_micros),
                    seq: row.try_get::<i64, _>("seq")? as u64,
                },
                applied_pnl_micros,
                applied_at: row.try_get("applied_at")?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

fn find_db_error(err: &anyhow::Error) -> Option<&(dyn sqlx::error::DatabaseError + 'static)> {
    err.chain()
        .filter_map(|c| c.downcast_ref::<sqlx::Error>())
        .find_map(|e| match e {
            sqlx::Error::Database(db) => Some(db.as_ref()),
            _ => None,
        })
}

/// serialization_failure (40001) and deadlock_detected (40P01) are safe to
/// retry once the transaction has rolled back.
fn is_retryable(err: &anyhow::Error) -> bool {
    find_db_error(err)
        .map(|db| matches!(db.code().as_deref(), Some("40001") | Some("40P01")))
        .unwrap_or(false)
}

fn is_unique_violation(err: &anyhow::Error, constraint: &str) -> bool {
    find_db_error(err)
        .map(|db| db.code().as_deref() == Some("23505") && db.constraint() == Some(constraint))
        .unwrap_or(false)
}
