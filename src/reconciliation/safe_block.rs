// Safe-block resolution
//
// The indexer may still be writing transfers for the newest block it has
// seen, so only the block before it is treated as fully settled.

use alloy::eips::BlockId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Block height that the indexer has fully processed for a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SafeBlock(u64);

impl SafeBlock {
    /// `last_indexed - 1`, or `None` when there is nothing trustworthy yet
    /// (no indexed block, height zero, or a negative height).
    pub fn resolve(last_indexed: Option<i64>) -> Option<SafeBlock> {
        let last = last_indexed?;
        if last <= 0 {
            return None;
        }
        Some(SafeBlock((last - 1) as u64))
    }

    pub fn height(&self) -> u64 {
        self.0
    }

    /// Height as stored in Postgres BIGINT columns
    pub fn as_i64(&self) -> i64 {
        // resolve() only yields heights derived from a positive i64
        self.0 as i64
    }

    /// Block selector for historical `eth_call` reads
    pub fn block_id(&self) -> BlockId {
        BlockId::number(self.0)
    }
}

impl fmt::Display for SafeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
