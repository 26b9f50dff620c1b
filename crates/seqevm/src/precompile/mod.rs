//! Precompiled contracts and their routing.
//!
//! A precompile lives at an address whose upper 12 bytes are zero; the low
//! 8 bytes form its id. Ids 2–4 are the classic hash/identity contracts,
//! two product ids implement the key/value extension and the native-token
//! contract, and every other reserved id is forwarded to an injected
//! [`ExternalPrecompiles`] capability.

pub mod hash;
mod kvstore;
mod token;

pub use kvstore::{KVSTORE_GET_GAS_PER_BYTE, KVSTORE_SET_GAS_PER_BYTE, MAX_KEY_SIZE, MAX_VALUE_SIZE};
pub use token::{APPROVAL_EVENT_TOPIC, TRANSFER_EVENT_TOPIC};

use auto_impl::auto_impl;
use core::fmt;
use primitives::{Address, Bytes};

/// Id of the key/value extension precompile.
pub const KVSTORE_ID: i64 = 0x2712;
/// Id of the native-token precompile.
pub const TOKEN_ID: i64 = 0x2711;
/// Id of the staking precompile, served externally.
pub const STAKING_ID: i64 = 0x2710;

/// Extracts the precompile id of `address`: the low 8 bytes, provided the
/// upper 12 bytes are zero.
pub fn precompile_id(address: &Address) -> Option<i64> {
    if address[..12].iter().any(|b| *b != 0) {
        return None;
    }
    let mut id = 0i64;
    for byte in &address[12..] {
        id = (id << 8) | *byte as i64;
    }
    Some(id)
}

/// Whether the id is served natively or by the injected capability.
pub fn id_is_precompiled(id: i64) -> bool {
    (1..=9).contains(&id) || id == STAKING_ID || id == KVSTORE_ID || id == TOKEN_ID
}

/// Whether the address hosts a precompiled contract.
pub fn is_precompiled(address: &Address) -> bool {
    precompile_id(address).is_some_and(id_is_precompiled)
}

/// A precompile run result: output bytes plus the gas it consumed, or an
/// error the dispatcher converts into a status code.
pub type PrecompileResult = Result<PrecompileOutput, PrecompileError>;

/// Successful precompile output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecompileOutput {
    /// Gas consumed by the run.
    pub gas_used: u64,
    /// Output bytes.
    pub bytes: Bytes,
}

impl PrecompileOutput {
    /// Creates an output with the given gas consumption and bytes.
    pub fn new(gas_used: u64, bytes: Bytes) -> Self {
        Self { gas_used, bytes }
    }
}

/// Why a precompile refused to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecompileError {
    /// The gas limit does not cover the run.
    OutOfGas,
    /// Malformed selector or input; nothing was executed.
    Failure,
}

impl fmt::Display for PrecompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OutOfGas => "out of gas",
            Self::Failure => "precompile failure",
        })
    }
}

impl core::error::Error for PrecompileError {}

/// Externally provided precompiles for reserved ids without a native
/// implementation.
#[auto_impl(&, Box, Arc)]
pub trait ExternalPrecompiles {
    /// Runs the precompile at `address` on `input` with `gas_limit` gas.
    fn run(&self, address: &Address, input: &[u8], gas_limit: i64) -> PrecompileResult;
}

/// Linear precompile cost: `base + words(len) * word`.
pub(crate) fn linear_cost(len: usize, base: u64, word: u64) -> u64 {
    (len as u64).div_ceil(32) * word + base
}

/// Big-endian 4-byte function selector. Callers must have checked the input
/// is at least 4 bytes long.
pub(crate) fn selector(input: &[u8]) -> u32 {
    u32::from_be_bytes([input[0], input[1], input[2], input[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitives::address;

    #[test]
    fn id_requires_zero_prefix() {
        assert_eq!(
            precompile_id(&address!("0x0000000000000000000000000000000000000004")),
            Some(4)
        );
        assert_eq!(
            precompile_id(&address!("0x0000000000000000000000000000000000002712")),
            Some(KVSTORE_ID)
        );
        assert_eq!(
            precompile_id(&address!("0x0100000000000000000000000000000000000004")),
            None
        );
    }

    #[test]
    fn reserved_ids_route_natively() {
        assert!(id_is_precompiled(2));
        assert!(id_is_precompiled(9));
        assert!(id_is_precompiled(STAKING_ID));
        assert!(id_is_precompiled(TOKEN_ID));
        assert!(!id_is_precompiled(0));
        assert!(!id_is_precompiled(0x2713));
    }
}
