use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use pfk_engine::ResetRequest;
use pfk_schemas::{day_id_utc, TradeRecord};
use std::fs;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pfk")]
#[command(about = "Prop-firm evaluation kernel CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute the program catalog hash + print canonical JSON
    ConfigHash {
        /// Path to the program catalog JSON file
        #[arg(long)]
        catalog: String,
    },

    /// Account lifecycle commands
    Account {
        #[command(subcommand)]
        cmd: AccountCmd,
    },

    /// Trade ingestion and inspection
    Trade {
        #[command(subcommand)]
        cmd: TradeCmd,
    },

    /// Daily anchor utilities
    Anchor {
        #[command(subcommand)]
        cmd: AnchorCmd,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses when any account is ACTIVE unless --yes is provided.
    Migrate {
        /// Acknowledge you are migrating a DB with live evaluations in flight.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum AccountCmd {
    /// Enroll a new account in a program and print its id.
    Init {
        /// Program code in the catalog (e.g. two_step_50k)
        #[arg(long)]
        program: String,

        /// Path to the program catalog JSON file
        #[arg(long)]
        catalog: String,

        /// Permit manual resets for this account
        #[arg(long, default_value_t = false)]
        allow_manual_reset: bool,
    },

    /// Print the current phase snapshot for an account.
    Snapshot {
        #[arg(long)]
        account: String,
    },

    /// Run a manual end-of-day evaluation (progress gates, time limit).
    Evaluate {
        #[arg(long)]
        account: String,
    },

    /// Reset an account to a fresh first phase (requires the account's permission flag).
    Reset {
        #[arg(long)]
        account: String,

        /// Operator identity recorded on the transition row
        #[arg(long)]
        actor: String,

        #[arg(long)]
        reason: String,

        /// Also delete the closed phase's trade rows
        #[arg(long, default_value_t = false)]
        clear_trade_history: bool,
    },
}

#[derive(Subcommand)]
enum TradeCmd {
    /// Ingest one trade record (JSON) and print the evaluation result.
    Ingest {
        #[arg(long)]
        account: String,

        /// Trade record JSON string
        #[arg(long, conflicts_with = "file")]
        json: Option<String>,

        /// Path to a trade record JSON file
        #[arg(long, conflicts_with = "json")]
        file: Option<String>,
    },

    /// Print recent trades for an account.
    List {
        #[arg(long)]
        account: String,

        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum AnchorCmd {
    /// Write today's daily anchor for every account missing one.
    Sweep {
        /// UTC day id (YYYYMMDD); defaults to today
        #[arg(long)]
        day: Option<u32>,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify a JSONL audit trail's hash chain.
    Verify {
        #[arg(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = pfk_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = pfk_db::status(&pool).await?;
                    println!("db_ok={} has_accounts_table={}", s.ok, s.has_accounts_table);
                }
                DbCmd::Migrate { yes } => {
                    // Guardrail: refuse migrations while any account is ACTIVE
                    // unless the operator explicitly acknowledges with --yes.
                    let n = pfk_db::count_active_accounts(&pool).await?;
                    if n > 0 && !yes {
                        anyhow::bail!(
                            "REFUSING MIGRATE: detected {} ACTIVE account(s). Re-run with: `pfk db migrate --yes`",
                            n
                        );
                    }

                    pfk_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { catalog } => {
            let raw = fs::read_to_string(&catalog)
                .with_context(|| format!("read catalog failed: {catalog}"))?;
            // Parse with validation first so a broken catalog never prints a hash.
            pfk_config::ProgramCatalog::from_json(&raw)?;
            let hash = pfk_config::config_hash(&raw)?;
            let canonical = pfk_config::canonical_json(&serde_json::from_str(&raw)?)?;
            println!("config_hash={hash}");
            println!("{canonical}");
        }

        Commands::Account { cmd } => match cmd {
            AccountCmd::Init {
                program,
                catalog,
                allow_manual_reset,
            } => {
                let pool = pfk_db::connect_from_env().await?;
                let rules = pfk_config::ProgramCatalog::from_path(&catalog)?.resolve(&program)?;

                let new = pfk_db::NewAccount {
                    account_id: Uuid::new_v4(),
                    rules,
                    allow_manual_reset,
                };
                let (master, phase) = pfk_db::init_account(&pool, &new, Utc::now()).await?;

                println!("account_id={}", master.account_id);
                println!("program={}", master.program.as_str());
                println!("starting_balance_micros={}", master.starting_balance_micros);
                println!("status={}", master.status.as_str());
                println!("phase_id={}", phase.phase_id);
                println!("phase_type={}", phase.phase_type.as_str());
                println!("allow_manual_reset={}", master.allow_manual_reset);
            }

            AccountCmd::Snapshot { account } => {
                let pool = pfk_db::connect_from_env().await?;
                let account_id = parse_account(&account)?;

                let (bundle, snap) =
                    pfk_db::load_phase_snapshot(&pool, account_id, Utc::now()).await?;

                println!("account_id={}", account_id);
                println!("account_status={}", bundle.account.status.as_str());
                println!("phase_id={}", snap.phase_id);
                println!("phase_type={}", snap.phase_type.as_str());
                println!("phase_status={}", snap.status.as_str());
                println!("equity_micros={}", snap.equity_micros);
                println!("balance_micros={}", snap.balance_micros);
                println!("net_profit_micros={}", snap.net_profit_micros);
                println!("profit_target_micros={}", snap.profit_target_micros);
                println!(
                    "daily_drawdown_remaining_micros={}",
                    snap.daily_drawdown_remaining_micros
                );
                println!(
                    "max_drawdown_remaining_micros={}",
                    snap.max_drawdown_remaining_micros
                );
                println!(
                    "trading_days={} min_trading_days={}",
                    snap.trading_days, snap.min_trading_days
                );
                println!("progress_pct={:.2}", snap.progress_pct);
            }

            AccountCmd::Evaluate { account } => {
                let pool = pfk_db::connect_from_env().await?;
                let account_id = parse_account(&account)?;

                let out = pfk_db::run_manual_evaluation(&pool, account_id, Utc::now()).await?;
                print_outcome(account_id, &out);
            }

            AccountCmd::Reset {
                account,
                actor,
                reason,
                clear_trade_history,
            } => {
                let pool = pfk_db::connect_from_env().await?;
                let account_id = parse_account(&account)?;

                let req = ResetRequest {
                    manual: true,
                    actor,
                    reason,
                    clear_trade_history,
                };
                let out = pfk_db::reset_account(&pool, account_id, &req, Utc::now()).await?;

                println!("reset=true account_id={}", account_id);
                println!(
                    "closed_phase_id={} closed_status={}",
                    out.closed_phase.phase_id,
                    out.closed_phase.status.as_str()
                );
                println!(
                    "new_phase_id={} new_phase_type={}",
                    out.new_phase.phase_id,
                    out.new_phase.phase_type.as_str()
                );
                println!("account_status={}", out.account_after.status.as_str());
            }
        },

        Commands::Trade { cmd } => match cmd {
            TradeCmd::Ingest {
                account,
                json,
                file,
            } => {
                let pool = pfk_db::connect_from_env().await?;
                let account_id = parse_account(&account)?;
                let rec = load_trade_record(json, file)?;

                let out = pfk_db::ingest_trade(&pool, account_id, &rec, Utc::now()).await?;
                print_outcome(account_id, &out);
            }

            TradeCmd::List { account, limit } => {
                let pool = pfk_db::connect_from_env().await?;
                let account_id = parse_account(&account)?;

                let trades = pfk_db::list_trades(&pool, account_id, limit).await?;
                for t in &trades {
                    println!(
                        "seq={} symbol={} side={} qty={} pnl_micros={} exit_time={}",
                        t.record.seq,
                        t.record.symbol,
                        t.record.side.as_str(),
                        t.record.qty,
                        t.applied_pnl_micros,
                        t.record
                            .exit_time
                            .map(|d| d.to_rfc3339())
                            .unwrap_or_default()
                    );
                }
                println!("trade_count={}", trades.len());
            }
        },

        Commands::Anchor { cmd } => match cmd {
            AnchorCmd::Sweep { day } => {
                let pool = pfk_db::connect_from_env().await?;
                let now = Utc::now();
                let day_id = day.unwrap_or_else(|| day_id_utc(now));
                let created = pfk_db::anchor_sweep(&pool, day_id, now).await?;
                println!("day_id={day_id} anchors_created={created}");
            }
        },

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => match pfk_audit::verify_hash_chain(&path)? {
                pfk_audit::VerifyResult::Valid { lines } => {
                    println!("chain_valid=true lines={lines}");
                }
                pfk_audit::VerifyResult::Broken { line, reason } => {
                    println!("chain_valid=false line={line} reason={reason}");
                    std::process::exit(1);
                }
            },
        },
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}

fn parse_account(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).context("invalid account uuid")
}

fn load_trade_record(json: Option<String>, file: Option<String>) -> Result<TradeRecord> {
    if let Some(p) = file {
        // Read raw bytes to handle UTF-8 BOM cleanly on Windows.
        let bytes = fs::read(&p).with_context(|| format!("read trade file failed: {p}"))?;
        let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);

        let raw = String::from_utf8(bytes.to_vec()).context("trade file must be UTF-8 text")?;
        let rec: TradeRecord = serde_json::from_str(raw.trim())
            .context("trade file must contain a valid trade record")?;
        return Ok(rec);
    }

    let raw = json.context("must provide --json or --file")?;
    let rec: TradeRecord =
        serde_json::from_str(raw.trim()).context("--json must be a valid trade record")?;
    Ok(rec)
}

fn print_outcome(account_id: Uuid, out: &pfk_engine::Outcome) {
    println!("account_id={}", account_id);
    println!("phase_id={}", out.phase_after.phase_id);
    println!("phase_status={}", out.phase_after.status.as_str());
    println!("equity_micros={}", out.phase_after.equity_micros);
    println!("net_profit_micros={}", out.phase_after.net_profit_micros);
    if let Some(b) = &out.breach {
        println!(
            "breach=true breach_type={} breach_amount_micros={}",
            b.breach_type.as_str(),
            b.breach_amount_micros
        );
    }
    if let Some(t) = &out.transition {
        println!(
            "transition=true from_status={} to_status={} reason={}",
            t.from_status,
            t.to_status,
            t.reason.as_str()
        );
    }
    if let Some(p) = &out.new_phase {
        println!(
            "new_phase_id={} new_phase_type={}",
            p.phase_id,
            p.phase_type.as_str()
        );
    }
}
