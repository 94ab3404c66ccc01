use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::BigDecimal;
use sqlx::{FromRow, PgExecutor, PgPool};
use tracing::{debug, error, info};

use super::models::*;
use super::store::LedgerStore;
use crate::error::{AppError, AppResult};
use crate::reconciliation::safe_block::SafeBlock;

/// Postgres-backed ledger store for one chain
pub struct PgLedgerStore {
    pub pool: PgPool,
    chain_id: i64,
}

#[derive(Debug, FromRow)]
struct CandidateRow {
    send_account_address: Vec<u8>,
    chain_id: i64,
    token_address: Vec<u8>,
    calculated_balance: BigDecimal,
    is_rebasing: bool,
    last_snapshot: Option<DateTime<Utc>>,
    usd_value: Option<Decimal>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<CandidateRow> for BalancePair {
    type Error = AppError;

    fn try_from(row: CandidateRow) -> AppResult<Self> {
        let key = PairKey {
            account: Address::from_bytes(&row.send_account_address)?,
            chain_id: row.chain_id,
            token: Address::from_bytes(&row.token_address)?,
        };

        Ok(BalancePair {
            key,
            calculated_balance: integral_amount(row.calculated_balance)?,
            is_rebasing: row.is_rebasing,
            last_snapshot: row.last_snapshot,
            usd_value: row.usd_value,
            last_updated_time: row.updated_at,
        })
    }
}

/// Convert candidate rows, dropping the ones that do not decode. A malformed
/// row is logged and left out so the rest of the batch still runs.
fn decode_candidates(rows: Vec<CandidateRow>) -> Vec<BalancePair> {
    rows.into_iter()
        .filter_map(|row| {
            let account = hex::encode(&row.send_account_address);
            let token = hex::encode(&row.token_address);
            let chain_id = row.chain_id;
            match BalancePair::try_from(row) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    error!(
                        account = %account,
                        token = %token,
                        chain_id,
                        error = %e,
                        "❌ Skipping undecodable token balance row"
                    );
                    None
                }
            }
        })
        .collect()
}

impl PgLedgerStore {
    pub fn new(pool: PgPool, chain_id: i64) -> Self {
        Self { pool, chain_id }
    }

    async fn adjust_balance<'e, E: PgExecutor<'e>>(
        executor: E,
        key: &PairKey,
        adjustment: &BigDecimal,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE token_balances
            SET calculated_balance = calculated_balance + $4,
                updated_at = NOW()
            WHERE send_account_address = $1 AND chain_id = $2 AND token_address = $3
            "#,
        )
        .bind(key.account.to_bytes())
        .bind(key.chain_id)
        .bind(key.token.to_bytes())
        .bind(adjustment.clone())
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("token balance row for {}", key)));
        }

        Ok(())
    }

    async fn insert_record<'e, E: PgExecutor<'e>>(
        executor: E,
        record: &ReconciliationRecord,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO balance_reconciliations (
                send_account_address, chain_id, token_address, drift_amount,
                db_balance_before, rpc_balance, reconciliation_reason, reconciled_block
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (
                send_account_address, chain_id, token_address, reconciled_block, db_balance_before
            )
            DO NOTHING
            "#,
        )
        .bind(record.key.account.to_bytes())
        .bind(record.key.chain_id)
        .bind(record.key.token.to_bytes())
        .bind(record.drift.clone())
        .bind(record.balance_before.clone())
        .bind(record.balance_observed.clone())
        .bind(record.reason.as_str())
        .bind(record.block.as_i64())
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn fetch_reconciliation_candidates(&self, limit: i64) -> AppResult<Vec<BalancePair>> {
        let rows = sqlx::query_as::<_, CandidateRow>(
            r#"
            SELECT send_account_address, chain_id, token_address, calculated_balance,
                   is_rebasing, last_snapshot, usd_value, updated_at
            FROM token_balances
            WHERE chain_id = $1
            ORDER BY last_snapshot ASC NULLS FIRST, usd_value DESC NULLS LAST
            LIMIT $2
            "#,
        )
        .bind(self.chain_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_candidates(rows))
    }

    async fn fetch_last_indexed_block(&self, key: &PairKey) -> AppResult<Option<i64>> {
        let block = sqlx::query_scalar::<_, Option<i64>>(
            r#"
            SELECT MAX(block_num)
            FROM send_account_transfers
            WHERE chain_id = $1 AND log_addr = $2 AND (f = $3 OR t = $3)
            "#,
        )
        .bind(key.chain_id)
        .bind(key.token.to_bytes())
        .bind(key.account.to_bytes())
        .fetch_one(&self.pool)
        .await?;

        Ok(block)
    }

    async fn write_snapshot(&self, snapshot: &BalanceSnapshot) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO balance_snapshots (
                send_account_address, chain_id, token_address, balance,
                snapshot_block, drift_from_calculated
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.key.account.to_bytes())
        .bind(snapshot.key.chain_id)
        .bind(snapshot.key.token.to_bytes())
        .bind(snapshot.balance.clone())
        .bind(snapshot.block.as_i64())
        .bind(snapshot.drift.clone())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE token_balances
            SET last_snapshot = NOW()
            WHERE send_account_address = $1 AND chain_id = $2 AND token_address = $3
            "#,
        )
        .bind(snapshot.key.account.to_bytes())
        .bind(snapshot.key.chain_id)
        .bind(snapshot.key.token.to_bytes())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("📸 Snapshot stored for {} at block {}", snapshot.key, snapshot.block);
        Ok(())
    }

    async fn write_reconciliation_record(&self, record: &ReconciliationRecord) -> AppResult<()> {
        if !Self::insert_record(&self.pool, record).await? {
            debug!(
                "Reconciliation record for {} at block {} from balance {} already exists",
                record.key, record.block, record.balance_before
            );
        }
        Ok(())
    }

    async fn apply_balance_adjustment(
        &self,
        key: &PairKey,
        adjustment: &BigDecimal,
        block: SafeBlock,
    ) -> AppResult<()> {
        Self::adjust_balance(&self.pool, key, adjustment).await?;
        debug!("Adjusted {} by {} as of block {}", key, adjustment, block);
        Ok(())
    }

    async fn record_reconciliation(&self, record: &ReconciliationRecord) -> AppResult<RecordOutcome> {
        let mut tx = self.pool.begin().await?;

        if !Self::insert_record(&mut *tx, record).await? {
            tx.rollback().await?;
            info!(
                "⏭️ Correction for {} at block {} from balance {} already applied",
                record.key, record.block, record.balance_before
            );
            return Ok(RecordOutcome::AlreadyApplied);
        }

        Self::adjust_balance(&mut *tx, &record.key, &record.drift).await?;
        tx.commit().await?;

        Ok(RecordOutcome::Applied)
    }
}
