use sqlx::types::BigDecimal;
use std::sync::Arc;

use super::bounded;
use super::safe_block::SafeBlock;
use crate::chain::BalanceOracle;
use crate::error::AppResult;
use crate::ledger::models::*;

/// Comparison of the ledger balance against the chain at one safe block.
///
/// Every write for a pair is derived from the same assessment so the
/// snapshot, record and adjustment can never disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftAssessment {
    pub key: PairKey,
    pub block: SafeBlock,
    pub calculated: BigDecimal,
    pub observed: BigDecimal,
    /// observed - calculated
    pub drift: BigDecimal,
    pub reason: ReconciliationReason,
}

impl DriftAssessment {
    pub fn new(pair: &BalancePair, observed: BigDecimal, block: SafeBlock) -> Self {
        let drift = &observed - &pair.calculated_balance;
        Self {
            key: pair.key.clone(),
            block,
            calculated: pair.calculated_balance.clone(),
            observed,
            drift,
            reason: classify(pair),
        }
    }

    /// Any non-zero drift is reconciled; there is no materiality threshold.
    pub fn needs_reconciliation(&self) -> bool {
        self.drift != BigDecimal::from(0)
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            key: self.key.clone(),
            balance: self.observed.clone(),
            block: self.block,
            drift: self.drift.clone(),
        }
    }

    pub fn record(&self) -> Option<ReconciliationRecord> {
        if !self.needs_reconciliation() {
            return None;
        }

        Some(ReconciliationRecord {
            key: self.key.clone(),
            drift: self.drift.clone(),
            balance_before: self.calculated.clone(),
            balance_observed: self.observed.clone(),
            reason: self.reason,
            block: self.block,
        })
    }
}

/// Two buckets only. Finer causes (missed transfers, airdrops) are not
/// distinguished.
pub fn classify(pair: &BalancePair) -> ReconciliationReason {
    if pair.is_rebasing {
        ReconciliationReason::Rebasing
    } else {
        ReconciliationReason::Unknown
    }
}

/// Reads the chain at the safe block and assesses drift
pub struct DriftDetector {
    oracle: Arc<dyn BalanceOracle>,
    rpc_timeout_ms: u64,
}

impl DriftDetector {
    pub fn new(oracle: Arc<dyn BalanceOracle>, rpc_timeout_ms: u64) -> Self {
        Self {
            oracle,
            rpc_timeout_ms,
        }
    }

    pub async fn detect(&self, pair: &BalancePair, block: SafeBlock) -> AppResult<DriftAssessment> {
        let observed = bounded(
            "read_balance_at_block",
            self.rpc_timeout_ms,
            self.oracle
                .read_balance_at_block(&pair.key.token, &pair.key.account, block),
        )
        .await?;

        let observed = integral_amount(observed)?;
        Ok(DriftAssessment::new(pair, observed, block))
    }
}
