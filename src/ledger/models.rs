use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, AppResult, ChainError};
use crate::reconciliation::safe_block::SafeBlock;

/// 20-byte account or token address, stored as lowercase hex without prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub const BYTES: usize = 20;

    /// Accepts `0x`-prefixed, Postgres bytea (`\x`) or bare hex
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .or_else(|| trimmed.strip_prefix("\\x"))
            .unwrap_or(trimmed);

        let bytes = hex::decode(body)
            .map_err(|e| ChainError::InvalidAddress(format!("{}: {}", raw, e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        if bytes.len() != Self::BYTES {
            return Err(ChainError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                Self::BYTES,
                bytes.len()
            ))
            .into());
        }
        Ok(Self(hex::encode(bytes)))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Always valid hex: constructed only through parse/from_bytes
        hex::decode(&self.0).unwrap_or_default()
    }

    /// Bare lowercase hex
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Truncated form for log lines
    pub fn short(&self) -> String {
        format!("0x{}...", &self.0[..8])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.0)
    }
}

/// Identity of one unit of reconciliation work
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub account: Address,
    pub chain_id: i64,
    pub token: Address,
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.account.short(),
            self.token.short(),
            self.chain_id
        )
    }
}

/// Candidate row produced by the ledger store
#[derive(Debug, Clone, PartialEq)]
pub struct BalancePair {
    pub key: PairKey,
    /// Ledger balance in the token's smallest unit
    pub calculated_balance: BigDecimal,
    /// Balance moves without transfer events
    pub is_rebasing: bool,
    pub last_snapshot: Option<DateTime<Utc>>,
    pub usd_value: Option<rust_decimal::Decimal>,
    pub last_updated_time: Option<DateTime<Utc>>,
}

impl BalancePair {
    pub fn new(key: PairKey, calculated_balance: BigDecimal, is_rebasing: bool) -> Self {
        Self {
            key,
            calculated_balance,
            is_rebasing,
            last_snapshot: None,
            usd_value: None,
            last_updated_time: None,
        }
    }
}

/// Point-in-time observation of the chain balance at a safe block
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSnapshot {
    pub key: PairKey,
    pub balance: BigDecimal,
    pub block: SafeBlock,
    /// observed - calculated
    pub drift: BigDecimal,
}

/// Why a pair drifted. Downstream consumers key off the literal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationReason {
    Rebasing,
    Unknown,
}

impl ReconciliationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationReason::Rebasing => "rebasing",
            ReconciliationReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ReconciliationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit record written for every non-zero drift
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationRecord {
    pub key: PairKey,
    pub drift: BigDecimal,
    pub balance_before: BigDecimal,
    pub balance_observed: BigDecimal,
    pub reason: ReconciliationReason,
    pub block: SafeBlock,
}

impl ReconciliationRecord {
    /// Same pair, same safe block, same ledger balance going in. A replay of
    /// such a record would apply the same correction twice.
    pub fn is_replay_of(&self, other: &ReconciliationRecord) -> bool {
        self.key == other.key
            && self.block == other.block
            && self.balance_before == other.balance_before
    }
}

/// Result of the combined record + adjustment write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Applied,
    /// The same correction was already recorded and applied
    AlreadyApplied,
}

/// Parse a token amount, rejecting anything that is not a whole number
pub fn parse_amount(raw: &str) -> AppResult<BigDecimal> {
    let value = BigDecimal::from_str(raw.trim())
        .map_err(|e| AppError::InvalidInput(format!("invalid amount {:?}: {}", raw, e)))?;
    integral_amount(value)
}

pub fn integral_amount(value: BigDecimal) -> AppResult<BigDecimal> {
    if !value.is_integer() {
        return Err(AppError::InvalidInput(format!(
            "amount {} is not a whole number of base units",
            value
        )));
    }
    Ok(value.with_scale(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "0x1234567890abcdef1234567890abcdef12345678";

    #[test]
    fn test_address_prefix_forms_normalise() {
        let a = Address::parse(ACCOUNT).unwrap();
        let b = Address::parse("\\x1234567890ABCDEF1234567890ABCDEF12345678").unwrap();
        let c = Address::parse("1234567890abcdef1234567890abcdef12345678").unwrap();

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.to_string(), ACCOUNT);
        assert_eq!(a.to_bytes().len(), Address::BYTES);
    }

    #[test]
    fn test_address_short_form() {
        let a = Address::parse(ACCOUNT).unwrap();
        assert_eq!(a.short(), "0x12345678...");
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("0xzz34567890abcdef1234567890abcdef12345678").is_err());
    }

    #[test]
    fn test_reason_literals() {
        assert_eq!(ReconciliationReason::Rebasing.as_str(), "rebasing");
        assert_eq!(ReconciliationReason::Unknown.as_str(), "unknown");
        assert_eq!(
            serde_json::to_string(&ReconciliationReason::Rebasing).unwrap(),
            "\"rebasing\""
        );
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1000").unwrap(), BigDecimal::from(1000));
        assert_eq!(parse_amount("1000.000").unwrap().to_string(), "1000");
        assert_eq!(
            parse_amount("115792089237316195423570985008687907853269984665640564039457584007913129639935")
                .unwrap()
                .to_string(),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );
        assert!(parse_amount("10.5").is_err());
        assert!(parse_amount("ten").is_err());
    }
}
