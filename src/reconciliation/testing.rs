// In-memory collaborators for engine tests

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::types::BigDecimal;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::safe_block::SafeBlock;
use crate::chain::BalanceOracle;
use crate::error::{AppError, AppResult, ChainError};
use crate::ledger::models::*;
use crate::ledger::LedgerStore;

pub const TEST_CHAIN_ID: i64 = 8453;

/// Pair `n` on the default test chain: account `0x11..n`, token `0xab..n`
pub fn pair(n: u8, calculated: i64, is_rebasing: bool) -> BalancePair {
    pair_on_chain(n, TEST_CHAIN_ID, calculated, is_rebasing)
}

pub fn pair_on_chain(n: u8, chain_id: i64, calculated: i64, is_rebasing: bool) -> BalancePair {
    let mut account = [0x11u8; 20];
    let mut token = [0xabu8; 20];
    account[19] = n;
    token[19] = n;

    let key = PairKey {
        account: Address::from_bytes(&account).unwrap(),
        chain_id,
        token: Address::from_bytes(&token).unwrap(),
    };
    BalancePair::new(key, BigDecimal::from(calculated), is_rebasing)
}

#[derive(Default)]
struct LedgerState {
    pairs: Vec<BalancePair>,
    last_indexed: HashMap<PairKey, i64>,
    snapshots: Vec<BalanceSnapshot>,
    records: Vec<ReconciliationRecord>,
    adjustments: Vec<(PairKey, BigDecimal, SafeBlock)>,
    candidate_limits: Vec<i64>,
    fail_candidates: bool,
    fail_records: bool,
}

/// Ledger store that keeps everything in memory and applies adjustments to
/// its own candidate rows
pub struct MemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl MemoryLedgerStore {
    pub fn new(pairs: Vec<BalancePair>) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                pairs,
                ..LedgerState::default()
            }),
        }
    }

    pub fn set_last_indexed(&self, key: &PairKey, block: i64) {
        self.state.lock().last_indexed.insert(key.clone(), block);
    }

    /// Overwrite a ledger balance, as an indexer backfill would
    pub fn set_calculated_balance(&self, key: &PairKey, balance: i64) {
        if let Some(row) = self.state.lock().pairs.iter_mut().find(|p| &p.key == key) {
            row.calculated_balance = BigDecimal::from(balance);
        }
    }

    pub fn fail_candidates(&self) {
        self.state.lock().fail_candidates = true;
    }

    pub fn fail_records(&self) {
        self.state.lock().fail_records = true;
    }

    pub fn pairs(&self) -> Vec<BalancePair> {
        self.state.lock().pairs.clone()
    }

    pub fn snapshots(&self) -> Vec<BalanceSnapshot> {
        self.state.lock().snapshots.clone()
    }

    pub fn records(&self) -> Vec<ReconciliationRecord> {
        self.state.lock().records.clone()
    }

    pub fn adjustments(&self) -> Vec<(PairKey, BigDecimal, SafeBlock)> {
        self.state.lock().adjustments.clone()
    }

    pub fn candidate_limits(&self) -> Vec<i64> {
        self.state.lock().candidate_limits.clone()
    }

    pub fn calculated_balance(&self, key: &PairKey) -> Option<BigDecimal> {
        self.state
            .lock()
            .pairs
            .iter()
            .find(|p| &p.key == key)
            .map(|p| p.calculated_balance.clone())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn fetch_reconciliation_candidates(&self, limit: i64) -> AppResult<Vec<BalancePair>> {
        let mut state = self.state.lock();
        state.candidate_limits.push(limit);
        if state.fail_candidates {
            return Err(AppError::Internal("candidate query failed".to_string()));
        }
        Ok(state.pairs.iter().take(limit as usize).cloned().collect())
    }

    async fn fetch_last_indexed_block(&self, key: &PairKey) -> AppResult<Option<i64>> {
        Ok(self.state.lock().last_indexed.get(key).copied())
    }

    async fn write_snapshot(&self, snapshot: &BalanceSnapshot) -> AppResult<()> {
        self.state.lock().snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn write_reconciliation_record(&self, record: &ReconciliationRecord) -> AppResult<()> {
        let mut state = self.state.lock();
        if state.fail_records {
            return Err(AppError::Internal("record insert failed".to_string()));
        }
        state.records.push(record.clone());
        Ok(())
    }

    async fn apply_balance_adjustment(
        &self,
        key: &PairKey,
        adjustment: &BigDecimal,
        block: SafeBlock,
    ) -> AppResult<()> {
        let mut state = self.state.lock();
        let row = state
            .pairs
            .iter_mut()
            .find(|p| &p.key == key)
            .ok_or_else(|| AppError::NotFound(key.to_string()))?;
        row.calculated_balance = &row.calculated_balance + adjustment;
        state.adjustments.push((key.clone(), adjustment.clone(), block));
        Ok(())
    }

    /// Single critical section, mirroring the Postgres transaction
    async fn record_reconciliation(&self, record: &ReconciliationRecord) -> AppResult<RecordOutcome> {
        let mut state = self.state.lock();
        if state.fail_records {
            return Err(AppError::Internal("record insert failed".to_string()));
        }
        if state.records.iter().any(|r| record.is_replay_of(r)) {
            return Ok(RecordOutcome::AlreadyApplied);
        }

        let row = state
            .pairs
            .iter_mut()
            .find(|p| p.key == record.key)
            .ok_or_else(|| AppError::NotFound(record.key.to_string()))?;
        row.calculated_balance = &row.calculated_balance + &record.drift;

        state.records.push(record.clone());
        state
            .adjustments
            .push((record.key.clone(), record.drift.clone(), record.block));
        Ok(RecordOutcome::Applied)
    }
}

/// Delegates everything except `record_reconciliation`, so the trait's
/// default two-step write is what runs
pub struct SplitWriteStore(pub MemoryLedgerStore);

#[async_trait]
impl LedgerStore for SplitWriteStore {
    async fn fetch_reconciliation_candidates(&self, limit: i64) -> AppResult<Vec<BalancePair>> {
        self.0.fetch_reconciliation_candidates(limit).await
    }

    async fn fetch_last_indexed_block(&self, key: &PairKey) -> AppResult<Option<i64>> {
        self.0.fetch_last_indexed_block(key).await
    }

    async fn write_snapshot(&self, snapshot: &BalanceSnapshot) -> AppResult<()> {
        self.0.write_snapshot(snapshot).await
    }

    async fn write_reconciliation_record(&self, record: &ReconciliationRecord) -> AppResult<()> {
        self.0.write_reconciliation_record(record).await
    }

    async fn apply_balance_adjustment(
        &self,
        key: &PairKey,
        adjustment: &BigDecimal,
        block: SafeBlock,
    ) -> AppResult<()> {
        self.0.apply_balance_adjustment(key, adjustment, block).await
    }
}

/// Oracle serving fixed balances and logging every block it was asked about
pub struct MockOracle {
    balances: Mutex<HashMap<(Address, Address), BigDecimal>>,
    failing: Mutex<HashSet<(Address, Address)>>,
    reads: Mutex<Vec<u64>>,
    delay: Option<Duration>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            reads: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_balance(&self, key: &PairKey, balance: i64) {
        self.balances
            .lock()
            .insert((key.token.clone(), key.account.clone()), BigDecimal::from(balance));
    }

    pub fn fail_for(&self, key: &PairKey) {
        self.failing
            .lock()
            .insert((key.token.clone(), key.account.clone()));
    }

    pub fn read_blocks(&self) -> Vec<u64> {
        self.reads.lock().clone()
    }
}

#[async_trait]
impl BalanceOracle for MockOracle {
    async fn read_balance_at_block(
        &self,
        token: &Address,
        account: &Address,
        block: SafeBlock,
    ) -> AppResult<BigDecimal> {
        self.reads.lock().push(block.height());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let lookup = (token.clone(), account.clone());
        if self.failing.lock().contains(&lookup) {
            return Err(ChainError::Rpc {
                code: -32000,
                message: "missing trie node".to_string(),
            }
            .into());
        }

        self.balances
            .lock()
            .get(&lookup)
            .cloned()
            .ok_or_else(|| ChainError::Decode("execution reverted".to_string()).into())
    }
}
