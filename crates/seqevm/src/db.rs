//! Read-only access to the durable ledger.

use crate::state::AccountInfo;
use auto_impl::auto_impl;
use primitives::{Address, Bytes, HashMap, StorageKey, B256, KECCAK_EMPTY};

/// Read-only accessor for the persistent ledger this transaction executes
/// over. All methods are pure lookups; the engine caches every answer, so an
/// implementation may be called repeatedly for the same key.
#[auto_impl(&, &mut, Box, Arc)]
pub trait WorldState {
    /// Current creation counter for the given address low byte.
    fn creation_counter(&self, address_low_byte: u8) -> u64;

    /// Basic account information. Absent accounts are reported with the
    /// absent-nonce sentinel, never omitted.
    fn account(&self, address: Address) -> AccountInfo;

    /// A contract's code and code hash. Accounts without code return empty
    /// bytes.
    fn bytecode(&self, address: Address) -> (Bytes, B256);

    /// One storage value. Absent entries are empty bytes.
    fn storage(&self, sequence: u64, key: B256) -> Bytes;

    /// Hash of the block at the given height.
    fn block_hash(&self, number: u64) -> B256;
}

/// A ledger with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyWorldState;

impl WorldState for EmptyWorldState {
    fn creation_counter(&self, _address_low_byte: u8) -> u64 {
        0
    }

    fn account(&self, _address: Address) -> AccountInfo {
        AccountInfo::absent()
    }

    fn bytecode(&self, _address: Address) -> (Bytes, B256) {
        (Bytes::new(), KECCAK_EMPTY)
    }

    fn storage(&self, _sequence: u64, _key: B256) -> Bytes {
        Bytes::new()
    }

    fn block_hash(&self, _number: u64) -> B256 {
        B256::ZERO
    }
}

/// In-memory ledger, useful for tests and single-process callers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorldState {
    accounts: HashMap<Address, AccountInfo>,
    bytecodes: HashMap<Address, (Bytes, B256)>,
    values: HashMap<StorageKey, Bytes>,
    creation_counters: HashMap<u8, u64>,
    block_hashes: HashMap<u64, B256>,
}

impl InMemoryWorldState {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an account.
    pub fn insert_account(&mut self, address: Address, info: AccountInfo) {
        self.accounts.insert(address, info);
    }

    /// Installs contract code for an address.
    pub fn insert_bytecode(&mut self, address: Address, code: Bytes, code_hash: B256) {
        self.bytecodes.insert(address, (code, code_hash));
    }

    /// Sets one storage value.
    pub fn insert_value(&mut self, sequence: u64, key: B256, value: Bytes) {
        self.values.insert(StorageKey::new(sequence, key), value);
    }

    /// Sets a creation counter.
    pub fn set_creation_counter(&mut self, address_low_byte: u8, counter: u64) {
        self.creation_counters.insert(address_low_byte, counter);
    }

    /// Records a block hash.
    pub fn insert_block_hash(&mut self, number: u64, hash: B256) {
        self.block_hashes.insert(number, hash);
    }
}

impl WorldState for InMemoryWorldState {
    fn creation_counter(&self, address_low_byte: u8) -> u64 {
        self.creation_counters
            .get(&address_low_byte)
            .copied()
            .unwrap_or(0)
    }

    fn account(&self, address: Address) -> AccountInfo {
        self.accounts
            .get(&address)
            .copied()
            .unwrap_or_else(AccountInfo::absent)
    }

    fn bytecode(&self, address: Address) -> (Bytes, B256) {
        self.bytecodes
            .get(&address)
            .cloned()
            .unwrap_or_else(|| (Bytes::new(), KECCAK_EMPTY))
    }

    fn storage(&self, sequence: u64, key: B256) -> Bytes {
        self.values
            .get(&StorageKey::new(sequence, key))
            .cloned()
            .unwrap_or_default()
    }

    fn block_hash(&self, number: u64) -> B256 {
        self.block_hashes.get(&number).copied().unwrap_or(B256::ZERO)
    }
}
