use std::sync::Arc;
use tracing::warn;

use super::bounded;
use super::drift::DriftAssessment;
use crate::error::AppResult;
use crate::ledger::models::RecordOutcome;
use crate::ledger::LedgerStore;

/// What the recorder persisted for one assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingResult {
    /// Snapshot only
    InSync,
    /// Snapshot, record and adjustment
    Reconciled,
    /// Snapshot only; the correction for this block was already on file
    AlreadyReconciled,
}

/// Persists snapshots and corrections
pub struct ReconciliationRecorder {
    store: Arc<dyn LedgerStore>,
    store_timeout_ms: u64,
}

impl ReconciliationRecorder {
    pub fn new(store: Arc<dyn LedgerStore>, store_timeout_ms: u64) -> Self {
        Self {
            store,
            store_timeout_ms,
        }
    }

    /// Snapshot first, always. Then, for non-zero drift, the record and the
    /// adjustment as one unit. Failures propagate to the caller untouched.
    pub async fn persist(&self, assessment: &DriftAssessment) -> AppResult<RecordingResult> {
        let snapshot = assessment.snapshot();
        bounded(
            "write_snapshot",
            self.store_timeout_ms,
            self.store.write_snapshot(&snapshot),
        )
        .await?;

        let Some(record) = assessment.record() else {
            return Ok(RecordingResult::InSync);
        };

        warn!(
            account = %record.key.account.short(),
            token = %record.key.token.short(),
            chain_id = record.key.chain_id,
            db_balance = %record.balance_before,
            rpc_balance = %record.balance_observed,
            drift = %record.drift,
            reason = %record.reason,
            block = %record.block,
            "⚠️ Balance drift detected, reconciling"
        );

        let outcome = bounded(
            "record_reconciliation",
            self.store_timeout_ms,
            self.store.record_reconciliation(&record),
        )
        .await?;

        Ok(match outcome {
            RecordOutcome::Applied => RecordingResult::Reconciled,
            RecordOutcome::AlreadyApplied => RecordingResult::AlreadyReconciled,
        })
    }
}
