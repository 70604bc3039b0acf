//! pfk-schemas
//!
//! Shared domain types for the evaluation kernel. Pure data: serde structs,
//! enum string forms for DB columns, and the day-id helper. No behavior
//! beyond trivial accessors lives here.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 1e-6 fixed-point scale. All currency amounts in this workspace are i64 micros.
pub const MICROS_SCALE: i64 = 1_000_000;

/// Deterministic trading day id: UTC date as YYYYMMDD.
pub fn day_id_utc(ts: DateTime<Utc>) -> u32 {
    let d = ts.date_naive();
    (d.year() as u32) * 10_000 + d.month() * 100 + d.day()
}

// ---------------------------------------------------------------------------
// Enums (string forms match DB column values)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramType {
    OneStep,
    TwoStep,
    Instant,
}

impl ProgramType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramType::OneStep => "ONE_STEP",
            ProgramType::TwoStep => "TWO_STEP",
            ProgramType::Instant => "INSTANT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ONE_STEP" => Some(ProgramType::OneStep),
            "TWO_STEP" => Some(ProgramType::TwoStep),
            "INSTANT" => Some(ProgramType::Instant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseType {
    Phase1,
    Phase2,
    Funded,
}

impl PhaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseType::Phase1 => "PHASE_1",
            PhaseType::Phase2 => "PHASE_2",
            PhaseType::Funded => "FUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PHASE_1" => Some(PhaseType::Phase1),
            "PHASE_2" => Some(PhaseType::Phase2),
            "FUNDED" => Some(PhaseType::Funded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Active,
    Passed,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Pending => "PENDING",
            PhaseStatus::Active => "ACTIVE",
            PhaseStatus::Passed => "PASSED",
            PhaseStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PhaseStatus::Pending),
            "ACTIVE" => Some(PhaseStatus::Active),
            "PASSED" => Some(PhaseStatus::Passed),
            "FAILED" => Some(PhaseStatus::Failed),
            _ => None,
        }
    }

    /// Passed and Failed phases never transition again; a new phase instance
    /// is created instead of resurrecting a terminal one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseStatus::Passed | PhaseStatus::Failed)
    }
}

/// Account-level status, derived from the active phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Failed,
    Funded,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Failed => "FAILED",
            AccountStatus::Funded => "FUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(AccountStatus::Active),
            "FAILED" => Some(AccountStatus::Failed),
            "FUNDED" => Some(AccountStatus::Funded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawdownMode {
    /// Max-drawdown reference point fixed at the phase's starting balance.
    Static,
    /// Max-drawdown reference point floats upward with the high-water mark.
    Trailing,
}

impl DrawdownMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrawdownMode::Static => "STATIC",
            DrawdownMode::Trailing => "TRAILING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STATIC" => Some(DrawdownMode::Static),
            "TRAILING" => Some(DrawdownMode::Trailing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachType {
    DailyDrawdown,
    MaxDrawdown,
}

impl BreachType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreachType::DailyDrawdown => "DAILY_DRAWDOWN",
            BreachType::MaxDrawdown => "MAX_DRAWDOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DAILY_DRAWDOWN" => Some(BreachType::DailyDrawdown),
            "MAX_DRAWDOWN" => Some(BreachType::MaxDrawdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Long => "LONG",
            TradeSide::Short => "SHORT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LONG" => Some(TradeSide::Long),
            "SHORT" => Some(TradeSide::Short),
            _ => None,
        }
    }
}

/// Why a Transition record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    PhasePassed,
    Promoted,
    DrawdownBreach,
    TimeLimitExceeded,
    ManualReset,
    AutoReset,
}

impl TransitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionReason::PhasePassed => "PHASE_PASSED",
            TransitionReason::Promoted => "PROMOTED",
            TransitionReason::DrawdownBreach => "DRAWDOWN_BREACH",
            TransitionReason::TimeLimitExceeded => "TIME_LIMIT_EXCEEDED",
            TransitionReason::ManualReset => "MANUAL_RESET",
            TransitionReason::AutoReset => "AUTO_RESET",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PHASE_PASSED" => Some(TransitionReason::PhasePassed),
            "PROMOTED" => Some(TransitionReason::Promoted),
            "DRAWDOWN_BREACH" => Some(TransitionReason::DrawdownBreach),
            "TIME_LIMIT_EXCEEDED" => Some(TransitionReason::TimeLimitExceeded),
            "MANUAL_RESET" => Some(TransitionReason::ManualReset),
            "AUTO_RESET" => Some(TransitionReason::AutoReset),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved rule sets
// ---------------------------------------------------------------------------

/// Per-phase rules with all limits resolved to absolute micros.
///
/// Percentage-based configuration is resolved once, against the program's
/// starting balance, when the phase is created — limits never drift as the
/// balance moves afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRules {
    /// 0 = no profit target (funded phases never advance via progression).
    pub profit_target_micros: i64,
    /// 0 disables the daily drawdown check.
    pub daily_drawdown_limit_micros: i64,
    /// 0 disables the maximum drawdown check.
    pub max_drawdown_limit_micros: i64,
    pub drawdown_mode: DrawdownMode,
    pub min_trading_days: u32,
    /// Max share of total profit one day may contribute, in basis points.
    /// 0 disables the consistency rule.
    pub consistency_max_bps: u32,
    /// Calendar-day limit for completing the phase; exceeding it fails the
    /// phase (not merely "not ready").
    pub time_limit_days: Option<u32>,
    /// Equity/balance every phase instance of this type starts from.
    pub starting_balance_micros: i64,
}

/// Program rule set, one variant per program type.
///
/// Each variant carries exactly the phases that exist for that program —
/// a tagged union instead of an all-optional record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgramRules {
    OneStep {
        phase1: PhaseRules,
        funded: PhaseRules,
    },
    TwoStep {
        phase1: PhaseRules,
        phase2: PhaseRules,
        funded: PhaseRules,
    },
    Instant {
        funded: PhaseRules,
    },
}

impl ProgramRules {
    pub fn program_type(&self) -> ProgramType {
        match self {
            ProgramRules::OneStep { .. } => ProgramType::OneStep,
            ProgramRules::TwoStep { .. } => ProgramType::TwoStep,
            ProgramRules::Instant { .. } => ProgramType::Instant,
        }
    }

    /// The phase type a fresh enrollment (or reset) starts in.
    pub fn first_phase_type(&self) -> PhaseType {
        match self {
            ProgramRules::OneStep { .. } | ProgramRules::TwoStep { .. } => PhaseType::Phase1,
            ProgramRules::Instant { .. } => PhaseType::Funded,
        }
    }

    /// The phase type that follows `current` on a pass, if any.
    pub fn next_phase_type(&self, current: PhaseType) -> Option<PhaseType> {
        match (self, current) {
            (ProgramRules::OneStep { .. }, PhaseType::Phase1) => Some(PhaseType::Funded),
            (ProgramRules::TwoStep { .. }, PhaseType::Phase1) => Some(PhaseType::Phase2),
            (ProgramRules::TwoStep { .. }, PhaseType::Phase2) => Some(PhaseType::Funded),
            _ => None,
        }
    }

    pub fn rules_for(&self, phase_type: PhaseType) -> Option<&PhaseRules> {
        match (self, phase_type) {
            (ProgramRules::OneStep { phase1, .. }, PhaseType::Phase1) => Some(phase1),
            (ProgramRules::OneStep { funded, .. }, PhaseType::Funded) => Some(funded),
            (ProgramRules::TwoStep { phase1, .. }, PhaseType::Phase1) => Some(phase1),
            (ProgramRules::TwoStep { phase2, .. }, PhaseType::Phase2) => Some(phase2),
            (ProgramRules::TwoStep { funded, .. }, PhaseType::Funded) => Some(funded),
            (ProgramRules::Instant { funded }, PhaseType::Funded) => Some(funded),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// The user's persistent enrollment in an evaluation program.
///
/// `active_phase_id` is the single authoritative "current phase" pointer; it
/// is written only by the transition engine, never inferred ad hoc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterAccount {
    pub account_id: Uuid,
    pub program: ProgramType,
    pub starting_balance_micros: i64,
    pub current_phase_number: u32,
    pub active: bool,
    pub status: AccountStatus,
    pub active_phase_id: Option<Uuid>,
    /// Manual resets require this; automatic post-breach resets do not.
    pub allow_manual_reset: bool,
    pub created_at: DateTime<Utc>,
}

/// One stage of evaluation. Immutable once it leaves Active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseAccount {
    pub phase_id: Uuid,
    pub account_id: Uuid,
    pub phase_type: PhaseType,
    pub status: PhaseStatus,

    pub rules: PhaseRules,

    pub starting_balance_micros: i64,
    pub equity_micros: i64,
    pub balance_micros: i64,
    pub high_water_mark_micros: i64,
    pub net_profit_micros: i64,

    pub trade_count: u32,
    pub win_count: u32,

    /// Net realized profit per trading day id. The key set doubles as the
    /// distinct-trading-day counter; values feed the consistency rule.
    pub day_profits: BTreeMap<u32, i64>,

    /// Highest trade sequence number applied to this phase.
    pub last_seq: u64,

    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl PhaseAccount {
    /// Fresh Active phase with equity/balance/HWM at the phase's starting
    /// balance (each phase is evaluated independently; equity is not carried
    /// over from the prior phase).
    pub fn open(
        account_id: Uuid,
        phase_type: PhaseType,
        rules: PhaseRules,
        now: DateTime<Utc>,
    ) -> Self {
        let start = rules.starting_balance_micros;
        Self {
            phase_id: Uuid::new_v4(),
            account_id,
            phase_type,
            status: PhaseStatus::Active,
            rules,
            starting_balance_micros: start,
            equity_micros: start,
            balance_micros: start,
            high_water_mark_micros: start,
            net_profit_micros: 0,
            trade_count: 0,
            win_count: 0,
            day_profits: BTreeMap::new(),
            last_seq: 0,
            started_at: now,
            ended_at: None,
        }
    }

    pub fn trading_days(&self) -> u32 {
        self.day_profits.len() as u32
    }
}

/// Trade ingestion payload, as received from the outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: TradeSide,
    /// Contracts / shares. Strictly positive.
    pub qty: i64,
    pub entry_price_micros: i64,
    pub exit_price_micros: Option<i64>,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub fees_micros: i64,
    pub commission_micros: i64,
    /// Realized P&L, if already computed upstream. Recomputed otherwise.
    pub realized_pnl_micros: Option<i64>,
    /// Durable per-account sequence position. Strictly increasing per phase.
    pub seq: u64,
}

impl TradeRecord {
    pub fn is_closed(&self) -> bool {
        self.exit_price_micros.is_some() && self.exit_time.is_some()
    }
}

/// A persisted trade, linked to exactly one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub account_id: Uuid,
    pub phase_id: Uuid,
    pub record: TradeRecord,
    /// Net realized P&L actually applied to the phase (0 for open trades).
    pub applied_pnl_micros: i64,
    pub applied_at: DateTime<Utc>,
}

/// One equity reference value per (account, calendar day). Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAnchor {
    pub account_id: Uuid,
    pub day_id: u32,
    pub anchor_equity_micros: i64,
    pub created_at: DateTime<Utc>,
}

/// Immutable record of a drawdown violation. Created exactly once per
/// violating event; permanently fails its phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breach {
    pub breach_id: Uuid,
    pub account_id: Uuid,
    pub phase_id: Uuid,
    pub breach_type: BreachType,
    /// Drawdown used at the moment of breach (the amount that exceeded the limit).
    pub breach_amount_micros: i64,
    pub equity_at_breach_micros: i64,
    pub trade_id: Option<Uuid>,
    pub ts: DateTime<Utc>,
}

/// Append-only audit record of a phase/status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub transition_id: Uuid,
    pub account_id: Uuid,
    pub from_phase: Option<Uuid>,
    pub to_phase: Option<Uuid>,
    pub from_status: String,
    pub to_status: String,
    pub reason: TransitionReason,
    pub actor: String,
    pub ts: DateTime<Utc>,
}
