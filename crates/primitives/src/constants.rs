//! Engine-wide constants.

use alloy_primitives::{b256, B256};

/// Keccak-256 hash of the empty string, the canonical code hash of an
/// account without code.
pub const KECCAK_EMPTY: B256 =
    b256!("0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");

/// Nonce value marking an account that does not exist in the ledger.
pub const ABSENT_NONCE: u64 = u64::MAX;

/// Storage-namespace sequence of an externally owned account (no storage).
pub const EOA_SEQUENCE: u64 = u64::MAX;

/// Reserved sequence holding the native-token precompile's allowance
/// entries.
pub const TOKEN_SEQUENCE: u64 = 2000;

/// Maximum size of deployed contract code in bytes (EIP-170).
pub const MAX_CODE_SIZE: usize = 24576;
