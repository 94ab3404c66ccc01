use async_trait::async_trait;
use sqlx::types::BigDecimal;

use super::models::*;
use crate::error::AppResult;
use crate::reconciliation::safe_block::SafeBlock;

/// Ledger persistence used by the reconciliation engine
///
/// Implementations must tolerate concurrent access; the engine itself
/// never issues overlapping calls for the same pair.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Pairs due for reconciliation, at most `limit`
    async fn fetch_reconciliation_candidates(&self, limit: i64) -> AppResult<Vec<BalancePair>>;

    /// Highest block the indexer has recorded a transfer for on this pair
    async fn fetch_last_indexed_block(&self, key: &PairKey) -> AppResult<Option<i64>>;

    /// Append a snapshot. Written on every successful read, drift or not.
    async fn write_snapshot(&self, snapshot: &BalanceSnapshot) -> AppResult<()>;

    async fn write_reconciliation_record(&self, record: &ReconciliationRecord) -> AppResult<()>;

    /// Add `adjustment` to the pair's calculated balance
    async fn apply_balance_adjustment(
        &self,
        key: &PairKey,
        adjustment: &BigDecimal,
        block: SafeBlock,
    ) -> AppResult<()>;

    /// Record the drift and apply the matching adjustment.
    ///
    /// The default runs the two writes back to back. Stores that can do so
    /// should override it with a single transaction that refuses to apply
    /// a record twice (see [`ReconciliationRecord::is_replay_of`]).
    async fn record_reconciliation(&self, record: &ReconciliationRecord) -> AppResult<RecordOutcome> {
        self.write_reconciliation_record(record).await?;
        self.apply_balance_adjustment(&record.key, &record.drift, record.block)
            .await?;
        Ok(RecordOutcome::Applied)
    }
}
