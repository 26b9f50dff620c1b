//! Block, transaction and configuration environments supplied by the caller.

use primitives::{Address, Bytes, U256};

/// Base-protocol revision passed through to the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpecId {
    /// Istanbul hard fork rules.
    #[default]
    Istanbul,
    /// Berlin hard fork rules.
    Berlin,
    /// London hard fork rules.
    London,
}

/// Engine configuration.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CfgEnv {
    /// Revision the interpreter executes under.
    pub spec: SpecId,
}

/// The block this transaction executes in.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockEnv {
    /// Beneficiary of the block reward.
    pub coinbase: Address,
    /// Block height.
    pub number: u64,
    /// Block timestamp in seconds.
    pub timestamp: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Block difficulty.
    pub difficulty: U256,
    /// Chain id.
    pub chain_id: U256,
}

/// One transaction's parameters.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TxEnv {
    /// Transaction sender.
    pub caller: Address,
    /// Gas price the sender offered.
    pub gas_price: U256,
    /// Gas limit of the transaction.
    pub gas_limit: i64,
    /// Destination of the transaction. The zero address signals contract
    /// creation.
    pub destination: Address,
    /// Value moved with the transaction.
    pub value: U256,
    /// Transaction input bytes.
    pub data: Bytes,
    /// When set, a gas trace is recorded and a minimal sufficient gas limit
    /// is estimated after a successful run.
    pub estimate_gas: bool,
}

/// Everything the host callbacks can observe about the surrounding
/// transaction and block.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Env {
    /// Engine configuration.
    pub cfg: CfgEnv,
    /// Block environment.
    pub block: BlockEnv,
    /// Transaction environment.
    pub tx: TxEnv,
}
