//! The classic hash and identity precompiles (ids 2, 3 and 4).

use super::{linear_cost, PrecompileError, PrecompileOutput, PrecompileResult};
use primitives::Bytes;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Computes the SHA-256 of the input.
pub fn sha256_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    let cost = linear_cost(input.len(), 60, 12);
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }
    let output = Sha256::digest(input);
    Ok(PrecompileOutput::new(cost, output.to_vec().into()))
}

/// Computes the RIPEMD-160 of the input, left-padded to 32 bytes.
pub fn ripemd160_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    let cost = linear_cost(input.len(), 600, 120);
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }
    let mut output = [0u8; 32];
    output[12..].copy_from_slice(&Ripemd160::digest(input));
    Ok(PrecompileOutput::new(cost, output.to_vec().into()))
}

/// Returns the input unchanged.
pub fn identity_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    let cost = linear_cost(input.len(), 15, 3);
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }
    Ok(PrecompileOutput::new(cost, Bytes::copy_from_slice(input)))
}
