//! The key/value extension precompile.
//!
//! Exposes GET and SET over arbitrary-length values in the calling
//! contract's storage namespace. Only reachable through a delegating call
//! from a contract: direct addressing and zero-depth callers are rejected.
//! Keys are hashed with SHA-256 before touching storage.

use super::{precompile_id, selector, KVSTORE_ID};
use crate::{
    controller::StorageStatus,
    db::WorldState,
    host::CallFrame,
    interpreter::{ExecResult, StatusCode},
};
use primitives::{B256, U256};
use sha2::{Digest, Sha256};

/// Maximum key length in bytes.
pub const MAX_KEY_SIZE: usize = 256;
/// Maximum value length in bytes.
pub const MAX_VALUE_SIZE: usize = 24576;

/// Gas per value byte beyond the first word, when reading.
pub const KVSTORE_GET_GAS_PER_BYTE: u64 = 25;
/// Gas per value byte beyond the first word, when writing.
pub const KVSTORE_SET_GAS_PER_BYTE: u64 = 75;

const SELECTOR_GET: u32 = 0xd6d7d525;
const SELECTOR_SET: u32 = 0xa18c751e;

fn sha256(data: &[u8]) -> B256 {
    B256::from_slice(&Sha256::digest(data))
}

impl<W: WorldState> CallFrame<'_, '_, W> {
    /// Runs the key/value precompile. Input layout and gas schedule are
    /// validated in full before anything is charged or written.
    pub(crate) fn run_kvstore(&mut self) -> ExecResult {
        // direct calls address the precompile itself; only delegating calls
        // rebind the destination to a real contract
        if precompile_id(&self.msg.destination) == Some(KVSTORE_ID) {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        // not reachable straight from an external transaction
        if self.msg.depth == 0 {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        if self.msg.input.len() < 4 {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let sel = selector(&self.msg.input);
        if sel != SELECTOR_GET && sel != SELECTOR_SET {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let offset_words = if sel == SELECTOR_GET { 1 } else { 2 };
        if self.msg.input.len() < 4 + offset_words * 64
            || self.msg.input.len() > 4 + 32 * 4 + MAX_KEY_SIZE + MAX_VALUE_SIZE
        {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let key_len = U256::from_be_slice(&self.msg.input[4 + offset_words * 32..][..32]);
        if key_len.is_zero() || key_len > U256::from(MAX_KEY_SIZE) {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let key_len = key_len.to::<usize>();
        let key_words = key_len.div_ceil(32);
        if self.msg.input.len() < 4 + offset_words * 64 + key_words * 32 {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let key_hash = sha256(&self.msg.input[4 + offset_words * 32 + 32..][..key_len]);
        if sel == SELECTOR_GET {
            self.kvstore_get(key_hash)
        } else {
            self.kvstore_set(key_hash, key_words)
        }
    }

    fn kvstore_get(&mut self, key_hash: B256) -> ExecResult {
        let destination = self.msg.destination;
        let value = self.ctrl.get_storage(destination, key_hash).clone();
        let mut gas = 800i64;
        if value.len() > 32 {
            gas += (value.len() as i64 - 32) * KVSTORE_GET_GAS_PER_BYTE as i64;
        }
        if gas > self.msg.gas {
            return ExecResult::from_status(StatusCode::OutOfGas);
        }
        // ABI-encoded bytes: offset word, length word, padded payload
        let word_count = 2 + value.len().div_ceil(32);
        let mut output = vec![0u8; word_count * 32];
        output[31] = 32;
        if !value.is_empty() {
            output[32..64].copy_from_slice(&B256::from(U256::from(value.len()))[..]);
            output[64..64 + value.len()].copy_from_slice(&value);
        }
        ExecResult::success_with_output(self.msg.gas - gas, output.into())
    }

    fn kvstore_set(&mut self, key_hash: B256, key_words: usize) -> ExecResult {
        if self.msg.is_static {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let value_len_at = 4 + 3 * 32 + key_words * 32;
        let value_len = U256::from_be_slice(&self.msg.input[value_len_at..][..32]);
        if value_len > U256::from(MAX_VALUE_SIZE) {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let value_len = value_len.to::<usize>();
        let mut gas = 0i64;
        if value_len > 32 {
            gas = (value_len as i64 - 32) * KVSTORE_SET_GAS_PER_BYTE as i64;
        }
        if self.msg.input.len() < 4 + 4 * 32 + key_words * 32 + value_len {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let destination = self.msg.destination;
        let value = self.msg.input.slice(value_len_at + 32..value_len_at + 32 + value_len);
        let status = self.ctrl.set_storage(destination, key_hash, &value);
        // first-word cost mirrors an ordinary storage write
        gas += match status {
            StorageStatus::Unchanged | StorageStatus::ModifiedAgain => 800,
            StorageStatus::Modified | StorageStatus::Deleted => 5000,
            StorageStatus::Added => 20000,
        };
        if gas > self.msg.gas {
            return ExecResult::from_status(StatusCode::OutOfGas);
        }
        ExecResult::success(self.msg.gas - gas)
    }
}
