// Chain access: the balance oracle trait and its EVM implementation
pub mod oracle;
pub mod rpc;

pub use oracle::BalanceOracle;
pub use rpc::{ChainProbe, EvmBalanceOracle};
