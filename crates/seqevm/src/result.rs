//! The change-set a finished transaction hands back to the caller.

use crate::{
    interpreter::ExecResult,
    state::{InternalCall, InternalReturn},
};
use primitives::{Address, Bytes, Log, B256, U256};

/// One changed account.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangedAccount {
    /// Account address.
    pub address: Address,
    /// Final balance.
    pub balance: U256,
    /// Final nonce.
    pub nonce: u64,
    /// Final storage sequence.
    pub sequence: u64,
    /// The account self-destructed and must be removed from the ledger.
    pub delete: bool,
}

/// One changed creation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangedCreationCounter {
    /// Address low byte keying the counter.
    pub low_byte: u8,
    /// Final counter value.
    pub counter: u64,
}

/// One changed contract code entry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangedBytecode {
    /// Contract address.
    pub address: Address,
    /// Final code; empty when the code was deleted.
    pub code: Bytes,
    /// Code hash matching `code`.
    pub code_hash: B256,
}

/// One changed storage value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangedValue {
    /// Storage-namespace sequence.
    pub sequence: u64,
    /// Slot key.
    pub key: B256,
    /// Final value; empty means the entry was deleted.
    pub value: Bytes,
}

/// Everything one transaction changed, ready to be persisted by the caller.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateChanges {
    /// Changed accounts, excluding untouched and still-empty ones.
    pub accounts: Vec<ChangedAccount>,
    /// Changed creation counters.
    pub creation_counters: Vec<ChangedCreationCounter>,
    /// Changed contract codes.
    pub bytecodes: Vec<ChangedBytecode>,
    /// Changed storage values.
    pub values: Vec<ChangedValue>,
    /// Logs emitted by the transaction, in order.
    pub logs: Vec<Log>,
    /// Accumulated gas refund counter.
    pub refund: u64,
    /// Parameters of every nested call, in call order.
    pub calls: Vec<InternalCall>,
    /// Results of every nested call, in return order.
    pub returns: Vec<InternalReturn>,
    /// Flat buffer holding the input/output bytes the call and return
    /// records point into.
    pub payload: Bytes,
}

/// Result of one transaction: the root frame's outcome plus the collected
/// state changes.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResultAndState {
    /// Root frame result.
    pub result: ExecResult,
    /// Collected state changes. Empty when the transaction was rejected
    /// before execution.
    pub state: StateChanges,
    /// Estimated minimal sufficient gas limit, when estimation was requested
    /// and the run succeeded. Negative means estimation failed.
    pub gas_estimate: Option<i64>,
}
