//! Cached, dirty-tagged view of the world state for one transaction.
//!
//! Every account, bytecode and storage entry touched by the transaction is
//! pulled from the [`WorldState`] once and lives here until the transaction
//! ends. Mutators record the prior dirty flag so the journal can restore an
//! entry exactly; the `undo_*` family exists only for journal replay.

use crate::{
    db::WorldState,
    interpreter::{ExecResult, Message},
    result::StateChanges,
};
use primitives::{
    Address, Bytes, HashMap, Log, StorageKey, B256, U256, ABSENT_NONCE, EOA_SEQUENCE, KECCAK_EMPTY,
};

/// Basic account state: balance, nonce and the sequence identifying the
/// account's storage namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AccountInfo {
    /// Set once the account self-destructed in this transaction.
    pub selfdestructed: bool,
    /// Account balance.
    pub balance: U256,
    /// Account nonce; [`ABSENT_NONCE`] marks an account that does not exist.
    pub nonce: u64,
    /// Storage-namespace sequence; [`EOA_SEQUENCE`] for externally owned
    /// accounts.
    pub sequence: u64,
}

impl AccountInfo {
    /// The canonical "does not exist" account.
    pub const fn absent() -> Self {
        Self {
            selfdestructed: false,
            balance: U256::ZERO,
            nonce: ABSENT_NONCE,
            sequence: EOA_SEQUENCE,
        }
    }

    /// Whether the account does not exist in the ledger.
    #[inline]
    pub const fn is_absent(&self) -> bool {
        self.nonce == ABSENT_NONCE
    }

    /// Whether the account is externally owned (has no storage namespace).
    #[inline]
    pub const fn is_eoa(&self) -> bool {
        self.sequence == EOA_SEQUENCE
    }

    /// Whether the account exists but carries no nonce, balance or storage
    /// namespace.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.is_eoa()
    }
}

impl Default for AccountInfo {
    fn default() -> Self {
        Self::absent()
    }
}

/// Cache slot for one account.
#[derive(Debug, Clone, Copy)]
pub struct AccountEntry {
    /// Cached account state.
    pub info: AccountInfo,
    /// Set once the entry diverged from the ledger.
    pub dirty: bool,
}

/// Cache slot for one creation counter.
#[derive(Debug, Clone, Copy)]
pub struct CounterEntry {
    /// Counter value.
    pub counter: u64,
    /// Set once the entry diverged from the ledger.
    pub dirty: bool,
}

/// Cache slot for one contract's code.
#[derive(Debug, Clone)]
pub struct BytecodeEntry {
    /// Set when the code was deleted in this transaction.
    pub deleted: bool,
    /// Set once the entry diverged from the ledger.
    pub dirty: bool,
    /// Raw code bytes.
    pub code: Bytes,
    /// Code hash; [`KECCAK_EMPTY`] when the code is empty.
    pub code_hash: B256,
}

impl Default for BytecodeEntry {
    fn default() -> Self {
        Self {
            deleted: false,
            dirty: false,
            code: Bytes::new(),
            code_hash: KECCAK_EMPTY,
        }
    }
}

/// Parameters of one nested call, recorded for tooling.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InternalCall {
    /// Call kind, as in [`Message`].
    pub kind: crate::interpreter::CallKind,
    /// Static flag of the frame.
    pub is_static: bool,
    /// Call depth.
    pub depth: u32,
    /// Gas granted to the frame.
    pub gas: i64,
    /// Destination account.
    pub destination: Address,
    /// Frame sender.
    pub sender: Address,
    /// Value moved with the call.
    pub value: U256,
    /// Offset of the input bytes in the shared payload buffer.
    pub input_offset: usize,
    /// Length of the input bytes.
    pub input_len: usize,
}

/// Result of one nested call, recorded for tooling.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InternalReturn {
    /// Outcome classification of the frame.
    pub status: crate::interpreter::StatusCode,
    /// Gas left when the frame returned.
    pub gas_left: i64,
    /// Offset of the output bytes in the shared payload buffer.
    pub output_offset: usize,
    /// Length of the output bytes.
    pub output_len: usize,
    /// Created contract address, for creation frames.
    pub create_address: Option<Address>,
}

/// The cached subset of the world state one transaction runs against.
#[derive(Debug)]
pub struct CachedState<W> {
    accounts: HashMap<Address, AccountEntry>,
    creation_counters: HashMap<u8, CounterEntry>,
    bytecodes: HashMap<Address, BytecodeEntry>,
    values: HashMap<StorageKey, Bytes>,
    origin_values: HashMap<StorageKey, Bytes>,
    logs: Vec<Log>,
    internal_calls: Vec<InternalCall>,
    internal_returns: Vec<InternalReturn>,
    payload: Vec<u8>,
    /// Accumulated gas refund counter.
    pub refund: u64,
    world: W,
}

impl<W: WorldState> CachedState<W> {
    /// Creates an empty cache over `world`.
    pub fn new(world: W) -> Self {
        Self {
            accounts: HashMap::default(),
            creation_counters: HashMap::default(),
            bytecodes: HashMap::default(),
            values: HashMap::default(),
            origin_values: HashMap::default(),
            logs: Vec::new(),
            internal_calls: Vec::new(),
            internal_returns: Vec::new(),
            payload: Vec::with_capacity(2048),
            refund: 0,
            world,
        }
    }

    fn account_mut(&mut self, address: Address) -> &mut AccountEntry {
        self.accounts
            .get_mut(&address)
            .expect("account must be cached before mutation")
    }

    /// Account info from cache, pulling it from the world state on first
    /// touch.
    pub fn get_account(&mut self, address: Address) -> AccountInfo {
        if let Some(entry) = self.accounts.get(&address) {
            return entry.info;
        }
        let mut info = self.world.account(address);
        info.selfdestructed = false;
        self.accounts.insert(address, AccountEntry { info, dirty: false });
        info
    }

    /// Whether the account is already cached.
    pub fn has_account(&self, address: Address) -> bool {
        self.accounts.contains_key(&address)
    }

    /// Inserts a brand-new, dirty account with zero balance and nonce.
    pub fn new_account(&mut self, address: Address) {
        let info = AccountInfo {
            selfdestructed: false,
            balance: U256::ZERO,
            nonce: 0,
            sequence: EOA_SEQUENCE,
        };
        self.accounts.insert(address, AccountEntry { info, dirty: true });
    }

    pub(crate) fn remove_account(&mut self, address: Address) {
        self.accounts.remove(&address);
    }

    /// Increments a cached account's nonce; returns the prior dirty flag.
    pub fn incr_nonce(&mut self, address: Address) -> bool {
        let entry = self.account_mut(address);
        entry.info.nonce += 1;
        core::mem::replace(&mut entry.dirty, true)
    }

    pub(crate) fn undo_incr_nonce(&mut self, address: Address, dirty: bool) {
        let entry = self.account_mut(address);
        entry.info.nonce -= 1;
        entry.dirty = dirty;
    }

    /// Sets the self-destructed flag; returns the prior flag and the prior
    /// dirty flag.
    pub fn set_selfdestructed(&mut self, address: Address, flag: bool) -> (bool, bool) {
        let entry = self.account_mut(address);
        let had_flag = core::mem::replace(&mut entry.info.selfdestructed, flag);
        let was_dirty = core::mem::replace(&mut entry.dirty, true);
        (had_flag, was_dirty)
    }

    pub(crate) fn undo_set_selfdestructed(&mut self, address: Address, flag: bool, dirty: bool) {
        let entry = self.account_mut(address);
        entry.info.selfdestructed = flag;
        entry.dirty = dirty;
    }

    /// Adds `amount` to a cached account's balance. Returns the prior dirty
    /// flag, or `None` when the addition would overflow (the balance is left
    /// untouched).
    pub fn incr_balance(&mut self, address: Address, amount: U256) -> Option<bool> {
        let entry = self.account_mut(address);
        let new_balance = entry.info.balance.checked_add(amount)?;
        entry.info.balance = new_balance;
        Some(core::mem::replace(&mut entry.dirty, true))
    }

    /// Subtracts `amount` from a cached account's balance. Returns the prior
    /// dirty flag, or `None` when the balance is insufficient (the balance is
    /// left untouched).
    pub fn decr_balance(&mut self, address: Address, amount: U256) -> Option<bool> {
        let entry = self.account_mut(address);
        let new_balance = entry.info.balance.checked_sub(amount)?;
        entry.info.balance = new_balance;
        Some(core::mem::replace(&mut entry.dirty, true))
    }

    pub(crate) fn undo_debit(&mut self, address: Address, amount: U256, dirty: bool) {
        let entry = self.account_mut(address);
        entry.info.balance += amount;
        entry.dirty = dirty;
    }

    pub(crate) fn undo_credit(&mut self, address: Address, amount: U256, dirty: bool) {
        let entry = self.account_mut(address);
        entry.info.balance -= amount;
        entry.dirty = dirty;
    }

    /// Increments a creation counter, pulling it from the world state on
    /// first touch. Returns the new counter value and the prior dirty flag.
    pub fn incr_creation_counter(&mut self, low_byte: u8) -> (u64, bool) {
        if let Some(entry) = self.creation_counters.get_mut(&low_byte) {
            entry.counter += 1;
            return (entry.counter, core::mem::replace(&mut entry.dirty, true));
        }
        let counter = self.world.creation_counter(low_byte) + 1;
        self.creation_counters
            .insert(low_byte, CounterEntry { counter, dirty: true });
        (counter, false)
    }

    pub(crate) fn undo_incr_creation_counter(&mut self, low_byte: u8, dirty: bool) {
        let entry = self
            .creation_counters
            .get_mut(&low_byte)
            .expect("creation counter must be cached before undo");
        entry.counter -= 1;
        entry.dirty = dirty;
    }

    /// Bytecode entry from cache, pulling it from the world state on first
    /// touch. Empty code is normalized to [`KECCAK_EMPTY`].
    pub fn get_bytecode_entry(&mut self, address: Address) -> &BytecodeEntry {
        if !self.bytecodes.contains_key(&address) {
            let (code, mut code_hash) = self.world.bytecode(address);
            if code.is_empty() {
                code_hash = KECCAK_EMPTY;
            }
            self.bytecodes.insert(
                address,
                BytecodeEntry {
                    deleted: false,
                    dirty: false,
                    code,
                    code_hash,
                },
            );
        }
        &self.bytecodes[&address]
    }

    /// Marks a contract's code deleted; returns the prior dirty flag.
    pub fn delete_bytecode(&mut self, address: Address) -> bool {
        let entry = self.bytecodes.entry(address).or_default();
        entry.deleted = true;
        core::mem::replace(&mut entry.dirty, true)
    }

    pub(crate) fn undo_delete_bytecode(&mut self, address: Address, dirty: bool) {
        let entry = self.bytecodes.entry(address).or_default();
        entry.deleted = false;
        entry.dirty = dirty;
    }

    /// Installs code for a contract and binds the account to its fresh
    /// storage sequence; returns the prior dirty flag of the code entry.
    pub fn set_bytecode(
        &mut self,
        address: Address,
        sequence: u64,
        code: Bytes,
        code_hash: B256,
    ) -> bool {
        let was_dirty = self
            .bytecodes
            .get(&address)
            .map(|entry| entry.dirty)
            .unwrap_or(false);
        self.bytecodes.insert(
            address,
            BytecodeEntry {
                deleted: false,
                dirty: true,
                code,
                code_hash,
            },
        );
        self.account_mut(address).info.sequence = sequence;
        was_dirty
    }

    /// Replaces the code installed by [`Self::set_bytecode`]. The pair is
    /// atomic: one journal entry undoes both.
    pub fn update_bytecode(&mut self, address: Address, code: Bytes, code_hash: B256) {
        let entry = self.bytecodes.entry(address).or_default();
        entry.code = code;
        entry.code_hash = code_hash;
    }

    pub(crate) fn undo_set_bytecode(&mut self, address: Address, dirty: bool) {
        let entry = self.bytecodes.entry(address).or_default();
        entry.deleted = true;
        entry.dirty = dirty;
        self.account_mut(address).info.sequence = EOA_SEQUENCE;
    }

    /// Storage value from cache, pulling it from the world state on first
    /// touch per `(sequence, key)` and retaining the original alongside.
    pub fn get_value(&mut self, sequence: u64, key: B256) -> &Bytes {
        let storage_key = StorageKey::new(sequence, key);
        if !self.values.contains_key(&storage_key) {
            let value = self.world.storage(sequence, key);
            self.origin_values.insert(storage_key, value.clone());
            self.values.insert(storage_key, value);
        }
        &self.values[&storage_key]
    }

    /// The value as of transaction start. The slot must have been touched.
    pub fn get_origin_value(&self, sequence: u64, key: B256) -> &Bytes {
        self.origin_values
            .get(&StorageKey::new(sequence, key))
            .expect("origin value must be cached before read")
    }

    /// Whether the slot is already cached.
    pub fn has_value(&self, sequence: u64, key: B256) -> bool {
        self.values.contains_key(&StorageKey::new(sequence, key))
    }

    /// Replaces a storage value, pulling the slot first if it was never
    /// touched. Returns the previous value.
    pub fn set_value(&mut self, sequence: u64, key: B256, value: &[u8]) -> Bytes {
        let storage_key = StorageKey::new(sequence, key);
        if !self.values.contains_key(&storage_key) {
            let origin = self.world.storage(sequence, key);
            self.origin_values.insert(storage_key, origin.clone());
            self.values.insert(storage_key, origin);
        }
        let slot = self.values.get_mut(&storage_key).unwrap();
        core::mem::replace(slot, Bytes::copy_from_slice(value))
    }

    pub(crate) fn undo_set_value(&mut self, sequence: u64, key: B256, value: Bytes) {
        self.values.insert(StorageKey::new(sequence, key), value);
    }

    /// Appends a log to the transaction's log list.
    pub fn add_log(&mut self, log: Log) {
        self.logs.push(log);
    }

    /// Removes the most recent log; used by journal replay.
    pub fn pop_log(&mut self) {
        self.logs.pop();
    }

    /// Block hash lookup, forwarded to the world state.
    pub fn block_hash(&self, number: u64) -> B256 {
        self.world.block_hash(number)
    }

    /// Records the parameters of a nested call into the trace buffer.
    pub fn add_internal_call(&mut self, msg: &Message) {
        let input_offset = self.payload.len();
        self.payload.extend_from_slice(&msg.input);
        self.internal_calls.push(InternalCall {
            kind: msg.kind,
            is_static: msg.is_static,
            depth: msg.depth,
            gas: msg.gas,
            destination: msg.destination,
            sender: msg.sender,
            value: msg.value,
            input_offset,
            input_len: msg.input.len(),
        });
    }

    /// Records the result of a nested call into the trace buffer.
    pub fn add_internal_return(&mut self, result: &ExecResult) {
        let output_offset = self.payload.len();
        self.payload.extend_from_slice(&result.output);
        self.internal_returns.push(InternalReturn {
            status: result.status,
            gas_left: result.gas_left,
            output_offset,
            output_len: result.output.len(),
            create_address: result.create_address,
        });
    }

    /// Serializes every dirty entry into the change-set handed back to the
    /// caller. Untouched entries, absent accounts and accounts that stayed
    /// empty without being destructed are skipped.
    pub fn into_changes(self) -> StateChanges {
        let mut changes = StateChanges {
            refund: self.refund,
            logs: self.logs,
            calls: self.internal_calls,
            returns: self.internal_returns,
            payload: self.payload.into(),
            ..Default::default()
        };
        for (address, entry) in &self.accounts {
            if !entry.dirty || entry.info.is_absent() {
                continue;
            }
            if entry.info.is_empty() && !entry.info.selfdestructed {
                continue;
            }
            changes.accounts.push(crate::result::ChangedAccount {
                address: *address,
                balance: entry.info.balance,
                nonce: entry.info.nonce,
                sequence: entry.info.sequence,
                delete: entry.info.selfdestructed,
            });
        }
        for (low_byte, entry) in &self.creation_counters {
            if !entry.dirty {
                continue;
            }
            changes
                .creation_counters
                .push(crate::result::ChangedCreationCounter {
                    low_byte: *low_byte,
                    counter: entry.counter,
                });
        }
        for (address, entry) in &self.bytecodes {
            if !entry.dirty {
                continue;
            }
            changes.bytecodes.push(crate::result::ChangedBytecode {
                address: *address,
                code: if entry.deleted {
                    Bytes::new()
                } else {
                    entry.code.clone()
                },
                code_hash: entry.code_hash,
            });
        }
        for (key, value) in &self.values {
            if self.origin_values.get(key) == Some(value) {
                continue;
            }
            changes.values.push(crate::result::ChangedValue {
                sequence: key.sequence,
                key: key.key,
                value: value.clone(),
            });
        }
        changes
    }
}
