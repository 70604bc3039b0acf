//! pfk-testkit
//!
//! DB-free scenario harness. [`MemStore`] commits engine outcomes to
//! in-memory state under a per-account lock, mirroring what pfk-db does in
//! a Postgres transaction, so every end-to-end property can be exercised
//! without a database.

mod harness;
mod store;

pub use harness::{
    closing_trade, one_step_100k_trailing_rules, open_trade, two_step_50k_rules, STANDARD_CATALOG,
};
pub use store::{AccountState, MemStore};
