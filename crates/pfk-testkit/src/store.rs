use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use pfk_engine::{
    evaluate_phase, evaluate_trade, phase_snapshot, plan_reset, EngineError, EngineEvent, Outcome,
    PhaseSnapshot, ResetOutcome, ResetRequest,
};
use pfk_schemas::{
    day_id_utc, AccountStatus, Breach, DailyAnchor, MasterAccount, PhaseAccount, PhaseType,
    ProgramRules, Trade, TradeRecord, Transition,
};

/// Everything the store holds for one account. The per-account mutex plays
/// the role of pfk-db's `SELECT ... FOR UPDATE`: one unit of work per
/// account at a time, accounts independent of each other.
#[derive(Debug, Clone)]
pub struct AccountState {
    pub account: MasterAccount,
    pub rules: ProgramRules,
    pub phases: HashMap<Uuid, PhaseAccount>,
    pub trades: Vec<Trade>,
    pub anchors: BTreeMap<u32, DailyAnchor>,
    pub breaches: Vec<Breach>,
    pub transitions: Vec<Transition>,
    pub events: Vec<EngineEvent>,
}

impl AccountState {
    /// The phase `active_phase_id` names, or the most recently started one
    /// for a deactivated account.
    pub fn current_phase(&self) -> PhaseAccount {
        if let Some(id) = self.account.active_phase_id {
            return self.phases[&id].clone();
        }
        self.phases
            .values()
            .max_by_key(|p| p.started_at)
            .expect("account has at least one phase")
            .clone()
    }
}

/// In-memory store with the same commit discipline as pfk-db.
#[derive(Default)]
pub struct MemStore {
    accounts: Mutex<HashMap<Uuid, Arc<Mutex<AccountState>>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll an account: master row, first Active phase, day-zero anchor.
    pub fn init_account(
        &self,
        rules: ProgramRules,
        allow_manual_reset: bool,
        now: DateTime<Utc>,
    ) -> (MasterAccount, PhaseAccount) {
        let account_id = Uuid::new_v4();
        let first_type = rules.first_phase_type();
        let phase_rules = rules
            .rules_for(first_type)
            .expect("program rules cover the first phase")
            .clone();
        let phase = PhaseAccount::open(account_id, first_type, phase_rules, now);

        let account = MasterAccount {
            account_id,
            program: rules.program_type(),
            starting_balance_micros: phase.starting_balance_micros,
            current_phase_number: 1,
            active: true,
            status: if first_type == PhaseType::Funded {
                AccountStatus::Funded
            } else {
                AccountStatus::Active
            },
            active_phase_id: Some(phase.phase_id),
            allow_manual_reset,
            created_at: now,
        };

        let mut anchors = BTreeMap::new();
        anchors.insert(
            day_id_utc(now),
            DailyAnchor {
                account_id,
                day_id: day_id_utc(now),
                anchor_equity_micros: phase.starting_balance_micros,
                created_at: now,
            },
        );

        let mut phases = HashMap::new();
        phases.insert(phase.phase_id, phase.clone());

        let state = AccountState {
            account: account.clone(),
            rules,
            phases,
            trades: Vec::new(),
            anchors,
            breaches: Vec::new(),
            transitions: Vec::new(),
            events: Vec::new(),
        };
        self.accounts
            .lock()
            .expect("account registry lock")
            .insert(account_id, Arc::new(Mutex::new(state)));

        (account, phase)
    }

    fn entry(&self, account_id: Uuid) -> Arc<Mutex<AccountState>> {
        self.accounts
            .lock()
            .expect("account registry lock")
            .get(&account_id)
            .expect("known account")
            .clone()
    }

    /// Snapshot of the account's state (copy, safe to inspect outside the lock).
    pub fn state(&self, account_id: Uuid) -> AccountState {
        self.entry(account_id).lock().expect("account lock").clone()
    }

    pub fn ingest_trade(
        &self,
        account_id: Uuid,
        rec: &TradeRecord,
        now: DateTime<Utc>,
    ) -> Result<Outcome, EngineError> {
        let entry = self.entry(account_id);
        let mut state = entry.lock().expect("account lock");

        let phase = state.current_phase();
        let day_id = day_id_utc(rec.exit_time.unwrap_or(rec.entry_time));
        let anchor = state.anchors.get(&day_id).cloned();

        let out = evaluate_trade(&state.account, &phase, anchor.as_ref(), &state.rules, rec, now)?;
        commit_outcome(&mut state, &out);
        Ok(out)
    }

    pub fn run_manual_evaluation(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Outcome, EngineError> {
        let entry = self.entry(account_id);
        let mut state = entry.lock().expect("account lock");

        let phase = state.current_phase();
        let anchor = state.anchors.get(&day_id_utc(now)).cloned();

        let out = evaluate_phase(&state.account, &phase, anchor.as_ref(), &state.rules, now)?;
        commit_outcome(&mut state, &out);
        Ok(out)
    }

    /// Anchor every active account for the day, write-once. Returns the
    /// number of anchors created.
    pub fn anchor_sweep(&self, day_id: u32, now: DateTime<Utc>) -> usize {
        let entries: Vec<_> = self
            .accounts
            .lock()
            .expect("account registry lock")
            .values()
            .cloned()
            .collect();

        let mut created = 0;
        for entry in entries {
            let mut state = entry.lock().expect("account lock");
            if !state.account.active || state.anchors.contains_key(&day_id) {
                continue;
            }
            let balance = state.current_phase().balance_micros;
            let account_id = state.account.account_id;
            state.anchors.insert(
                day_id,
                DailyAnchor {
                    account_id,
                    day_id,
                    anchor_equity_micros: balance,
                    created_at: now,
                },
            );
            created += 1;
        }
        created
    }

    pub fn reset_account(
        &self,
        account_id: Uuid,
        req: &ResetRequest,
        now: DateTime<Utc>,
    ) -> Result<ResetOutcome, EngineError> {
        let entry = self.entry(account_id);
        let mut state = entry.lock().expect("account lock");

        let phase = state.current_phase();
        let out = plan_reset(&state.account, &phase, &state.rules, req, now)?;

        state
            .phases
            .insert(out.closed_phase.phase_id, out.closed_phase.clone());
        state
            .phases
            .insert(out.new_phase.phase_id, out.new_phase.clone());
        state.account = out.account_after.clone();

        if out.clear_trade_history {
            state.trades.clear();
        }
        state.anchors.clear();
        state
            .anchors
            .insert(out.new_anchor.day_id, out.new_anchor.clone());
        state.transitions.push(out.transition.clone());
        state.events.extend(out.events.iter().cloned());

        Ok(out)
    }

    pub fn snapshot(&self, account_id: Uuid, now: DateTime<Utc>) -> PhaseSnapshot {
        let entry = self.entry(account_id);
        let state = entry.lock().expect("account lock");
        let phase = state.current_phase();
        let anchor = state.anchors.get(&day_id_utc(now)).cloned();
        phase_snapshot(&phase, anchor.as_ref())
    }
}

/// Mirror of pfk-db's transactional commit, against plain memory.
fn commit_outcome(state: &mut AccountState, out: &Outcome) {
    if let Some(anchor) = &out.new_anchor {
        // Write-once.
        state.anchors.entry(anchor.day_id).or_insert(anchor.clone());
    }
    if let Some(trade) = &out.trade {
        state.trades.push(trade.clone());
    }
    state
        .phases
        .insert(out.phase_after.phase_id, out.phase_after.clone());
    if let Some(new_phase) = &out.new_phase {
        state.phases.insert(new_phase.phase_id, new_phase.clone());
    }
    state.account = out.account_after.clone();
    if let Some(breach) = &out.breach {
        state.breaches.push(breach.clone());
    }
    if let Some(transition) = &out.transition {
        state.transitions.push(transition.clone());
    }
    state.events.extend(out.events.iter().cloned());
}
