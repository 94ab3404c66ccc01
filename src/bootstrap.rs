use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    chain::EvmBalanceOracle,
    config::Config,
    error::AppResult,
    ledger::PgLedgerStore,
    reconciliation::ReconciliationWorker,
};

/// Build a ready-to-start worker from host configuration
pub async fn initialize_worker(config: &Config) -> AppResult<ReconciliationWorker> {
    info!("Initializing reconciliation components ...");

    let pool = initialize_database(&config.database_url, config.db_max_connections).await?;
    let store = Arc::new(PgLedgerStore::new(pool, config.worker.chain_id));

    let oracle = Arc::new(EvmBalanceOracle::new(
        &config.rpc_url,
        config.worker.rpc_timeout_ms,
    )?);

    let probe = oracle.probe().await;
    match probe.chain_id {
        Some(id) if id != config.worker.chain_id => warn!(
            "⚠️ RPC endpoint reports chain {} but CHAIN_ID is {}",
            id, config.worker.chain_id
        ),
        Some(id) => info!("✅ RPC endpoint connected to chain {}", id),
        None => warn!("⚠️ Could not confirm RPC chain id"),
    }
    if let Some(head) = probe.head_block {
        info!("⛓️  Chain head at block {}", head);
    }

    let worker = ReconciliationWorker::new(config.worker.clone(), store, oracle)?;
    info!("✅ Reconciliation worker initialized");

    Ok(worker)
}

async fn initialize_database(database_url: &str, max_connections: u32) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: {} max connections", max_connections);

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
