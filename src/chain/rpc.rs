// EVM balance oracle
//
// Reads ERC-20 balances with `eth_call` pinned to an explicit block height.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address as EvmAddress, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::eth::TransactionRequest;
use alloy::sol_types::SolCall;
use alloy::transports::http::Http;
use async_trait::async_trait;
use reqwest::Client;
use sqlx::types::BigDecimal;
use std::str::FromStr;
use tracing::{debug, warn};

use super::oracle::BalanceOracle;
use crate::error::{AppError, AppResult, ChainError};
use crate::ledger::models::Address;
use crate::reconciliation::bounded;
use crate::reconciliation::safe_block::SafeBlock;

alloy::sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256 balance);
    }
}

/// What the endpoint reports about itself. Each field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainProbe {
    pub chain_id: Option<i64>,
    pub head_block: Option<u64>,
}

pub struct EvmBalanceOracle {
    provider: RootProvider<Http<Client>>,
    rpc_timeout_ms: u64,
}

impl EvmBalanceOracle {
    pub fn new(rpc_url: &str, rpc_timeout_ms: u64) -> AppResult<Self> {
        let url = rpc_url
            .parse()
            .map_err(|e| AppError::Config(format!("invalid RPC_URL {:?}: {}", rpc_url, e)))?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            provider,
            rpc_timeout_ms,
        })
    }

    /// Chain id and head block, read concurrently. A failed read is logged
    /// and left empty rather than failing the whole probe.
    pub async fn probe(&self) -> ChainProbe {
        let chain_id = bounded("eth_chainId", self.rpc_timeout_ms, async {
            self.provider
                .get_chain_id()
                .await
                .map_err(|e| AppError::from(ChainError::from(e)))
        });
        let head_block = bounded("eth_blockNumber", self.rpc_timeout_ms, async {
            self.provider
                .get_block_number()
                .await
                .map_err(|e| AppError::from(ChainError::from(e)))
        });
        let (chain_id, head_block) = futures::join!(chain_id, head_block);

        let chain_id = match chain_id {
            Ok(id) => Some(id as i64),
            Err(e) => {
                warn!("⚠️ Failed to read chain id: {}", e);
                None
            }
        };

        let head_block = match head_block {
            Ok(head) => Some(head),
            Err(e) => {
                warn!("⚠️ Failed to read head block: {}", e);
                None
            }
        };

        ChainProbe {
            chain_id,
            head_block,
        }
    }
}

#[async_trait]
impl BalanceOracle for EvmBalanceOracle {
    async fn read_balance_at_block(
        &self,
        token: &Address,
        account: &Address,
        block: SafeBlock,
    ) -> AppResult<BigDecimal> {
        let request = TransactionRequest::default()
            .with_to(to_evm_address(token)?)
            .with_input(balance_of_calldata(account)?);

        let raw = self
            .provider
            .call(&request)
            .block(block.block_id())
            .await
            .map_err(ChainError::from)?;

        let balance = decode_balance(&raw)?;
        debug!(
            "balanceOf({}) on {} at block {} = {}",
            account.short(),
            token.short(),
            block,
            balance
        );
        Ok(balance)
    }
}

pub fn to_evm_address(address: &Address) -> AppResult<EvmAddress> {
    EvmAddress::from_str(&address.to_string())
        .map_err(|e| ChainError::InvalidAddress(format!("{}: {}", address, e)).into())
}

/// ABI-encoded `balanceOf(account)` call
pub fn balance_of_calldata(account: &Address) -> AppResult<Bytes> {
    let call = IERC20::balanceOfCall {
        owner: to_evm_address(account)?,
    };
    Ok(Bytes::from(call.abi_encode()))
}

/// Decode `balanceOf` return data into a whole number of base units
pub fn decode_balance(raw: &[u8]) -> AppResult<BigDecimal> {
    if raw.is_empty() {
        return Err(ChainError::Decode("empty return data (no contract at address?)".to_string()).into());
    }

    let decoded = IERC20::balanceOfCall::abi_decode_returns(raw, true)
        .map_err(|e| ChainError::Decode(format!("balanceOf return data: {}", e)))?;
    u256_to_decimal(decoded.balance)
}

pub fn u256_to_decimal(value: U256) -> AppResult<BigDecimal> {
    BigDecimal::from_str(&value.to_string())
        .map_err(|e| ChainError::Decode(format!("uint256 {}: {}", value, e)).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(value: U256) -> Vec<u8> {
        value.to_be_bytes::<32>().to_vec()
    }

    #[test]
    fn test_balance_of_calldata() {
        let account = Address::parse("0x1234567890abcdef1234567890abcdef12345678").unwrap();
        let data = balance_of_calldata(&account).unwrap();

        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], &[0x70, 0xa0, 0x82, 0x31]);
        assert!(data[4..16].iter().all(|b| *b == 0));
        assert_eq!(&data[16..], account.to_bytes().as_slice());
    }

    #[test]
    fn test_address_conversion_keeps_bytes() {
        let account = Address::parse("0xabcdefabcdefabcdefabcdefabcdefabcdefabcd").unwrap();
        let evm = to_evm_address(&account).unwrap();
        assert_eq!(evm.as_slice(), account.to_bytes().as_slice());
    }

    #[test]
    fn test_decode_small_balance() {
        assert_eq!(decode_balance(&word(U256::from(1000u64))).unwrap(), BigDecimal::from(1000));
        assert_eq!(decode_balance(&word(U256::ZERO)).unwrap(), BigDecimal::from(0));
    }

    #[test]
    fn test_decode_max_uint256() {
        let value = decode_balance(&word(U256::MAX)).unwrap();
        assert_eq!(
            value.to_string(),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );
    }

    #[test]
    fn test_decode_crosses_128_bit_boundary() {
        let value = (U256::from(1u64) << 128) + U256::from(1u64);
        assert_eq!(
            decode_balance(&word(value)).unwrap().to_string(),
            "340282366920938463463374607431768211457"
        );
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode_balance(&[]).is_err());
        assert!(decode_balance(&[0x01; 16]).is_err());
    }

    #[test]
    fn test_invalid_rpc_url_is_config_error() {
        assert!(matches!(
            EvmBalanceOracle::new("not a url", 1_000),
            Err(AppError::Config(_))
        ));
    }
}
