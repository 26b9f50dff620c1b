//! Gas schedule constants and intrinsic-gas computation.

/// Gas charged for a CALL that creates a new account.
pub const CALL_NEW_ACCOUNT_GAS: u64 = 25000;

/// Gas charged for a storage read.
pub const SLOAD_GAS: u64 = 800;
/// Gas charged for storing a value into an empty slot.
pub const SSTORE_SET_GAS: u64 = 20000;
/// Gas charged for overwriting an occupied slot.
pub const SSTORE_RESET_GAS: u64 = 5000;
/// Refund granted for clearing an occupied slot.
pub const SSTORE_CLEARS_SCHEDULE: u64 = 15000;
/// Refund granted for the first self-destruction of a contract.
pub const SELFDESTRUCT_REFUND_GAS: u64 = 24000;

/// Per-byte gas of depositing created contract code.
pub const CREATE_DATA_GAS: u64 = 200;

/// Base gas of a transaction not creating a contract.
pub const TX_GAS: u64 = 21000;
/// Base gas of a contract-creating transaction.
pub const TX_GAS_CONTRACT_CREATION: u64 = 53000;
/// Per zero byte of transaction input.
pub const TX_DATA_ZERO_GAS: u64 = 4;
/// Per non-zero byte of transaction input.
pub const TX_DATA_NON_ZERO_GAS: u64 = 16;

/// Safety margin added to a reported gas estimate to cover a trailing
/// storage write.
pub const ESTIMATE_STORAGE_MARGIN: i64 = 5000;

/// Gas consumed before the interpreter starts, derived from the transaction
/// kind and its input bytes. Saturates instead of overflowing.
pub fn intrinsic_gas(input: &[u8], is_contract_creation: bool) -> i64 {
    let mut gas = if is_contract_creation {
        TX_GAS_CONTRACT_CREATION
    } else {
        TX_GAS
    };
    if input.is_empty() {
        return gas as i64;
    }
    let nonzero = input.iter().filter(|b| **b != 0).count() as u64;
    let zero = input.len() as u64 - nonzero;
    gas = gas.saturating_add(nonzero.saturating_mul(TX_DATA_NON_ZERO_GAS));
    gas = gas.saturating_add(zero.saturating_mul(TX_DATA_ZERO_GAS));
    i64::try_from(gas).unwrap_or(i64::MAX)
}
