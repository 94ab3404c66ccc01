//! Ledger/chain balance reconciliation.
//!
//! A [`ReconciliationWorker`] periodically compares the event-derived ledger
//! balance of each candidate account/token pair against the chain balance
//! at the last fully indexed block, snapshots every observation and records
//! and applies a correction for any drift. Hosts supply a [`LedgerStore`]
//! and a [`BalanceOracle`]; Postgres and EVM JSON-RPC implementations ship
//! with the crate.

pub mod bootstrap;
pub mod chain;
pub mod config;
pub mod error;
pub mod ledger;
pub mod reconciliation;

pub use chain::BalanceOracle;
pub use error::{AppError, AppResult};
pub use ledger::LedgerStore;
pub use reconciliation::{ReconciliationWorker, WorkerRunStats};
