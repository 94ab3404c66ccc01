use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::bounded;
use super::drift::DriftDetector;
use super::rate_limit::RateLimiter;
use super::recorder::{ReconciliationRecorder, RecordingResult};
use super::safe_block::SafeBlock;
use super::scheduler::StopSignal;
use super::stats::WorkerRunStats;
use crate::chain::BalanceOracle;
use crate::config::WorkerConfig;
use crate::error::{AppResult, ChainError};
use crate::ledger::models::BalancePair;
use crate::ledger::LedgerStore;

/// Result of one pair that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// No trustworthy block yet; nothing read or written
    Skipped,
    InSync,
    Reconciled,
    AlreadyReconciled,
}

impl From<RecordingResult> for PairOutcome {
    fn from(result: RecordingResult) -> Self {
        match result {
            RecordingResult::InSync => PairOutcome::InSync,
            RecordingResult::Reconciled => PairOutcome::Reconciled,
            RecordingResult::AlreadyReconciled => PairOutcome::AlreadyReconciled,
        }
    }
}

/// Runs safe-block resolution, drift detection and recording for each pair
pub struct PairProcessor {
    store: Arc<dyn LedgerStore>,
    detector: DriftDetector,
    recorder: ReconciliationRecorder,
    rate_limiter: RateLimiter,
    chain_id: i64,
    store_timeout_ms: u64,
}

impl PairProcessor {
    pub fn new(
        config: &WorkerConfig,
        store: Arc<dyn LedgerStore>,
        oracle: Arc<dyn BalanceOracle>,
    ) -> Self {
        Self {
            detector: DriftDetector::new(oracle, config.rpc_timeout_ms),
            recorder: ReconciliationRecorder::new(store.clone(), config.store_timeout_ms),
            rate_limiter: RateLimiter::new(config.rate_limit_ms),
            chain_id: config.chain_id,
            store_timeout_ms: config.store_timeout_ms,
            store,
        }
    }

    /// One pair, start to finish
    pub async fn process(&self, pair: &BalancePair) -> AppResult<PairOutcome> {
        if pair.key.chain_id != self.chain_id {
            return Err(ChainError::ChainMismatch {
                expected: self.chain_id,
                actual: pair.key.chain_id,
            }
            .into());
        }

        let last_indexed = bounded(
            "fetch_last_indexed_block",
            self.store_timeout_ms,
            self.store.fetch_last_indexed_block(&pair.key),
        )
        .await?;

        let Some(block) = SafeBlock::resolve(last_indexed) else {
            debug!(
                account = %pair.key.account.short(),
                token = %pair.key.token.short(),
                chain_id = pair.key.chain_id,
                last_indexed = ?last_indexed,
                "No settled indexed block for this pair, skipping"
            );
            return Ok(PairOutcome::Skipped);
        };

        let assessment = self.detector.detect(pair, block).await?;
        let result = self.recorder.persist(&assessment).await?;

        Ok(result.into())
    }

    /// Process a batch sequentially. Pair failures are logged and counted;
    /// they never abort the batch. A stop ends the batch at the next pair
    /// boundary or during the delay, whichever comes first.
    pub async fn process_batch(
        &self,
        run_id: Uuid,
        pairs: &[BalancePair],
        mut stop: StopSignal,
        stats: &mut WorkerRunStats,
    ) {
        for (index, pair) in pairs.iter().enumerate() {
            if stop.is_stopped() {
                info!(%run_id, "🛑 Worker stopped during reconciliation run");
                break;
            }

            match self.process(pair).await {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    stats.record_error();
                    error!(
                        %run_id,
                        account = %pair.key.account.short(),
                        token = %pair.key.token.short(),
                        chain_id = pair.key.chain_id,
                        error = %e,
                        "❌ Failed to reconcile balance"
                    );
                }
            }

            let is_last = index + 1 == pairs.len();
            if !is_last && !self.rate_limiter.wait_or_cancel(&mut stop).await {
                info!(%run_id, "🛑 Worker stopped during reconciliation run");
                break;
            }
        }
    }
}
