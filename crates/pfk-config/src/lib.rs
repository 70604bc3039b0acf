//! pfk-config
//!
//! Program catalog loading and rule resolution.
//!
//! The catalog is a JSON document describing each evaluation program in
//! percentage terms (profit target, drawdown limits as a share of the
//! starting balance). Resolution to absolute micro amounts happens here,
//! once — phases carry the resolved limits for their whole lifetime, so a
//! balance moving later never shifts a limit.
//!
//! The canonical hash of the catalog is stamped onto audit events so a
//! rule-set change is always attributable.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use pfk_schemas::{DrawdownMode, PhaseRules, ProgramRules, ProgramType, MICROS_SCALE};

/// Percent-based rule spec for one phase, as written in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Share of starting balance. 0 = no profit target.
    #[serde(default)]
    pub profit_target_pct: f64,
    /// 0 disables the daily drawdown check.
    #[serde(default)]
    pub daily_drawdown_pct: f64,
    /// 0 disables the maximum drawdown check.
    #[serde(default)]
    pub max_drawdown_pct: f64,
    pub drawdown_mode: DrawdownMode,
    #[serde(default)]
    pub min_trading_days: u32,
    /// Max share of total profit one day may contribute. 0 disables.
    #[serde(default)]
    pub consistency_max_pct: f64,
    #[serde(default)]
    pub time_limit_days: Option<u32>,
}

/// One program entry in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSpec {
    #[serde(rename = "type")]
    pub program_type: ProgramType,
    /// Whole currency units (e.g. 50000.0 for a 50k account).
    pub starting_balance: f64,
    #[serde(default)]
    pub phase1: Option<PhaseSpec>,
    #[serde(default)]
    pub phase2: Option<PhaseSpec>,
    pub funded: PhaseSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramCatalog {
    pub programs: BTreeMap<String, ProgramSpec>,
}

impl ProgramCatalog {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read program catalog {path:?}"))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let catalog: ProgramCatalog =
            serde_json::from_str(raw).context("parse program catalog json")?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Structural validation. Fails closed: a malformed catalog never loads.
    fn validate(&self) -> Result<()> {
        if self.programs.is_empty() {
            bail!("program catalog has no programs");
        }
        for (code, spec) in &self.programs {
            if !(spec.starting_balance > 0.0) {
                bail!("program {code}: starting_balance must be > 0");
            }
            match spec.program_type {
                ProgramType::OneStep => {
                    if spec.phase1.is_none() {
                        bail!("program {code}: one_step requires phase1");
                    }
                    if spec.phase2.is_some() {
                        bail!("program {code}: one_step must not define phase2");
                    }
                }
                ProgramType::TwoStep => {
                    if spec.phase1.is_none() || spec.phase2.is_none() {
                        bail!("program {code}: two_step requires phase1 and phase2");
                    }
                }
                ProgramType::Instant => {
                    if spec.phase1.is_some() || spec.phase2.is_some() {
                        bail!("program {code}: instant defines only funded rules");
                    }
                }
            }
            for (name, phase) in [
                ("phase1", spec.phase1.as_ref()),
                ("phase2", spec.phase2.as_ref()),
                ("funded", Some(&spec.funded)),
            ] {
                let Some(p) = phase else { continue };
                for (field, v) in [
                    ("profit_target_pct", p.profit_target_pct),
                    ("daily_drawdown_pct", p.daily_drawdown_pct),
                    ("max_drawdown_pct", p.max_drawdown_pct),
                    ("consistency_max_pct", p.consistency_max_pct),
                ] {
                    if !(0.0..=100.0).contains(&v) {
                        bail!("program {code}: {name}.{field} out of range: {v}");
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve a program's percentage spec into absolute micro limits.
    pub fn resolve(&self, program_code: &str) -> Result<ProgramRules> {
        let spec = self
            .programs
            .get(program_code)
            .with_context(|| format!("unknown program {program_code}"))?;

        let start_micros = to_micros(spec.starting_balance);
        let phase = |p: &PhaseSpec| resolve_phase(p, start_micros);

        Ok(match spec.program_type {
            ProgramType::OneStep => ProgramRules::OneStep {
                // validated above
                phase1: phase(spec.phase1.as_ref().expect("validated")),
                funded: phase(&spec.funded),
            },
            ProgramType::TwoStep => ProgramRules::TwoStep {
                phase1: phase(spec.phase1.as_ref().expect("validated")),
                phase2: phase(spec.phase2.as_ref().expect("validated")),
                funded: phase(&spec.funded),
            },
            ProgramType::Instant => ProgramRules::Instant {
                funded: phase(&spec.funded),
            },
        })
    }
}

fn to_micros(units: f64) -> i64 {
    (units * MICROS_SCALE as f64).round() as i64
}

fn pct_of(base_micros: i64, pct: f64) -> i64 {
    ((base_micros as f64) * pct / 100.0).round() as i64
}

fn resolve_phase(spec: &PhaseSpec, start_micros: i64) -> PhaseRules {
    PhaseRules {
        profit_target_micros: pct_of(start_micros, spec.profit_target_pct),
        daily_drawdown_limit_micros: pct_of(start_micros, spec.daily_drawdown_pct),
        max_drawdown_limit_micros: pct_of(start_micros, spec.max_drawdown_pct),
        drawdown_mode: spec.drawdown_mode,
        min_trading_days: spec.min_trading_days,
        consistency_max_bps: (spec.consistency_max_pct * 100.0).round() as u32,
        time_limit_days: spec.time_limit_days,
        starting_balance_micros: start_micros,
    }
}

// ---------------------------------------------------------------------------
// Canonical hashing
// ---------------------------------------------------------------------------

/// Serialize with object keys sorted recursively, so hashing is independent
/// of input key order.
pub fn canonical_json(v: &Value) -> Result<String> {
    let sorted = sort_value(v);
    serde_json::to_string(&sorted).context("canonical json serialize failed")
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, val)| (k, sort_value(val))).collect();
            serde_json::to_value(sorted).unwrap_or(Value::Null)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

/// SHA-256 hex of the canonical form of a catalog document.
pub fn config_hash(raw: &str) -> Result<String> {
    let v: Value = serde_json::from_str(raw).context("parse catalog for hashing")?;
    let canonical = canonical_json(&v)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "programs": {
            "two_step_50k": {
                "type": "two_step",
                "starting_balance": 50000,
                "phase1": {
                    "profit_target_pct": 8.0,
                    "daily_drawdown_pct": 5.0,
                    "max_drawdown_pct": 10.0,
                    "drawdown_mode": "static",
                    "min_trading_days": 4,
                    "consistency_max_pct": 40.0,
                    "time_limit_days": 30
                },
                "phase2": {
                    "profit_target_pct": 5.0,
                    "daily_drawdown_pct": 5.0,
                    "max_drawdown_pct": 10.0,
                    "drawdown_mode": "static",
                    "min_trading_days": 4
                },
                "funded": {
                    "daily_drawdown_pct": 5.0,
                    "max_drawdown_pct": 10.0,
                    "drawdown_mode": "trailing"
                }
            }
        }
    }"#;

    #[test]
    fn resolves_percentages_against_starting_balance() {
        let catalog = ProgramCatalog::from_json(CATALOG).expect("load");
        let rules = catalog.resolve("two_step_50k").expect("resolve");
        let ProgramRules::TwoStep { phase1, funded, .. } = &rules else {
            panic!("expected two_step");
        };
        // 8% of 50,000 = 4,000
        assert_eq!(phase1.profit_target_micros, 4_000 * MICROS_SCALE);
        assert_eq!(phase1.daily_drawdown_limit_micros, 2_500 * MICROS_SCALE);
        assert_eq!(phase1.max_drawdown_limit_micros, 5_000 * MICROS_SCALE);
        assert_eq!(phase1.consistency_max_bps, 4_000);
        assert_eq!(phase1.time_limit_days, Some(30));
        assert_eq!(funded.profit_target_micros, 0);
        assert_eq!(funded.drawdown_mode, DrawdownMode::Trailing);
    }

    #[test]
    fn unknown_program_is_an_error() {
        let catalog = ProgramCatalog::from_json(CATALOG).unwrap();
        assert!(catalog.resolve("nope").is_err());
    }

    #[test]
    fn instant_program_rejects_challenge_phases() {
        let raw = r#"{"programs":{"bad":{
            "type":"instant","starting_balance":25000,
            "phase1":{"drawdown_mode":"static"},
            "funded":{"drawdown_mode":"trailing"}
        }}}"#;
        assert!(ProgramCatalog::from_json(raw).is_err());
    }

    #[test]
    fn hash_ignores_key_order() {
        let a = r#"{"b": 1, "a": {"y": 2, "x": 3}}"#;
        let b = r#"{"a": {"x": 3, "y": 2}, "b": 1}"#;
        assert_eq!(config_hash(a).unwrap(), config_hash(b).unwrap());
        assert_ne!(
            config_hash(a).unwrap(),
            config_hash(r#"{"b": 1, "a": {"y": 2, "x": 4}}"#).unwrap()
        );
    }
}
