use async_trait::async_trait;
use sqlx::types::BigDecimal;

use crate::error::AppResult;
use crate::ledger::models::Address;
use crate::reconciliation::safe_block::SafeBlock;

/// Authoritative source of token balances
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    /// Balance of `account` in `token` as of `block`, never the latest state
    async fn read_balance_at_block(
        &self,
        token: &Address,
        account: &Address,
        block: SafeBlock,
    ) -> AppResult<BigDecimal>;
}
