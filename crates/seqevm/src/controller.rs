//! The stateful orchestrator for one transaction.
//!
//! [`TxControl`] wraps [`CachedState`] with journaled high-level operations,
//! owns snapshot/revert, records the gas trace used for estimation, and
//! collects the final change-set.

use crate::{
    db::WorldState,
    env::Env,
    estimate,
    gas::{SLOAD_GAS, SSTORE_CLEARS_SCHEDULE, SSTORE_RESET_GAS, SSTORE_SET_GAS},
    interpreter::{ExecResult, ExecutorOverrides, Interpreter, Message},
    journal::JournalEntry,
    precompile::ExternalPrecompiles,
    result::StateChanges,
    state::{AccountInfo, BytecodeEntry, CachedState},
};
use primitives::{contract_sequence, Address, Bytes, Log, B256, U256};

/// EIP-2200 classification of one storage write, returned to the interpreter
/// so it can charge the right gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StorageStatus {
    /// The write is a no-op.
    Unchanged,
    /// A previously untouched slot now differs from its original value.
    Modified,
    /// A slot already modified in this transaction changed again.
    ModifiedAgain,
    /// An empty slot became occupied.
    Added,
    /// An occupied slot became empty; grants a refund.
    Deleted,
}

/// Whether an account or slot was already cached when accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccessStatus {
    /// First touch in this transaction.
    Cold,
    /// Already cached.
    Warm,
}

/// A snapshot of the journal; reverting to it undoes every mutation recorded
/// after it was taken.
pub type Snapshot = usize;

/// Controls the interpreter runs of one transaction.
pub struct TxControl<'a, W> {
    journal: Vec<JournalEntry>,
    // element with the sign bit set means gas granted to a nested call,
    // otherwise gas left on return
    gas_trace: Vec<i64>,
    state: CachedState<W>,
    env: Env,
    interpreter: &'a dyn Interpreter,
    overrides: Option<&'a dyn ExecutorOverrides>,
    external_precompiles: Option<&'a dyn ExternalPrecompiles>,
    estimate: bool,
}

impl<W> core::fmt::Debug for TxControl<'_, W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TxControl")
            .field("journal_len", &self.journal.len())
            .field("estimate", &self.estimate)
            .finish_non_exhaustive()
    }
}

impl<'a, W: WorldState> TxControl<'a, W> {
    /// Creates the controller for one transaction.
    pub fn new(
        world: W,
        env: Env,
        interpreter: &'a dyn Interpreter,
        overrides: Option<&'a dyn ExecutorOverrides>,
        external_precompiles: Option<&'a dyn ExternalPrecompiles>,
    ) -> Self {
        let estimate = env.tx.estimate_gas;
        Self {
            journal: Vec::with_capacity(100),
            gas_trace: if estimate {
                Vec::with_capacity(100)
            } else {
                Vec::new()
            },
            state: CachedState::new(world),
            env,
            interpreter,
            overrides,
            external_precompiles,
            estimate,
        }
    }

    /// The environment this transaction runs in.
    pub fn env(&self) -> &Env {
        &self.env
    }

    /// The executor responsible for `code_address`: a registered override if
    /// one exists, otherwise the default interpreter.
    pub fn executor_for(&self, code_address: &Address) -> &'a dyn Interpreter {
        self.overrides
            .and_then(|ovr| ovr.executor_for(code_address))
            .unwrap_or(self.interpreter)
    }

    /// The injected external precompile capability, if any.
    pub(crate) fn external_precompiles(&self) -> Option<&'a dyn ExternalPrecompiles> {
        self.external_precompiles
    }

    /// Takes a snapshot of the journal.
    pub fn snapshot(&self) -> Snapshot {
        self.journal.len()
    }

    /// Undoes every mutation recorded since `snapshot`, in reverse order.
    pub fn revert_to(&mut self, snapshot: Snapshot) {
        while self.journal.len() > snapshot {
            let entry = self.journal.pop().unwrap();
            entry.revert(&mut self.state);
        }
    }

    /// Number of journal entries recorded so far.
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    /// Records entry into a nested call granted `gas`.
    pub fn gas_trace_enter(&mut self, gas: i64) {
        if self.estimate {
            self.gas_trace.push(estimate::tag_call(gas));
        }
    }

    /// Records return from a nested call with `gas_left`.
    pub fn gas_trace_exit(&mut self, gas_left: i64) {
        if self.estimate {
            self.gas_trace.push(gas_left);
        }
    }

    /// Estimates the minimal sufficient gas limit from the recorded trace.
    /// Negative means the trace could not be estimated.
    pub fn estimate_gas(&self, init_guess: i64) -> i64 {
        estimate::estimate_gas(&self.gas_trace, init_guess)
    }

    /// Account info, cached on first touch.
    pub fn get_account(&mut self, address: Address) -> AccountInfo {
        self.state.get_account(address)
    }

    /// Whether the account self-destructed in this transaction.
    pub fn is_selfdestructed(&mut self, address: Address) -> bool {
        self.state.get_account(address).selfdestructed
    }

    /// Raw cached balance of an account.
    pub fn get_balance(&mut self, address: Address) -> U256 {
        self.state.get_account(address).balance
    }

    /// Bytecode entry, cached on first touch.
    pub fn get_bytecode_entry(&mut self, address: Address) -> &BytecodeEntry {
        self.state.get_bytecode_entry(address)
    }

    /// Moves `amount` from `from` to `to` as one journaled operation.
    /// Fails without any mutation if the debit would underflow or the credit
    /// would overflow.
    pub fn transfer(&mut self, from: Address, to: Address, amount: U256) -> bool {
        let Some(from_was_dirty) = self.state.decr_balance(from, amount) else {
            return false;
        };
        let Some(to_was_dirty) = self.state.incr_balance(to, amount) else {
            self.state.undo_debit(from, amount, from_was_dirty);
            return false;
        };
        self.journal.push(JournalEntry::BalanceTransfer {
            from,
            to: Some(to),
            amount,
            from_was_dirty,
            to_was_dirty,
        });
        true
    }

    /// Destroys `amount` of `from`'s balance; used when a contract
    /// self-destructs with itself as beneficiary.
    pub fn burn(&mut self, from: Address, amount: U256) {
        let from_was_dirty = self
            .state
            .decr_balance(from, amount)
            .expect("burn amount exceeds balance");
        self.journal.push(JournalEntry::BalanceTransfer {
            from,
            to: None,
            amount,
            from_was_dirty,
            to_was_dirty: false,
        });
    }

    /// Creates a brand-new account in the cache.
    pub fn new_account(&mut self, address: Address) {
        self.state.new_account(address);
        self.journal.push(JournalEntry::AccountCreated { address });
    }

    /// Increments an account's nonce.
    pub fn incr_nonce(&mut self, address: Address) {
        let was_dirty = self.state.incr_nonce(address);
        self.journal
            .push(JournalEntry::NonceChanged { address, was_dirty });
    }

    /// Installs contract code at `address`. The per-address creation counter
    /// is advanced first to derive a fresh storage sequence; the two steps
    /// are journaled together and always revert together.
    pub fn set_bytecode(&mut self, address: Address, code: Bytes, code_hash: B256) {
        let low_byte = address[19];
        let (counter, was_dirty) = self.state.incr_creation_counter(low_byte);
        self.journal
            .push(JournalEntry::CreationCounterIncremented { low_byte, was_dirty });
        let sequence = contract_sequence(counter, low_byte);
        let was_dirty = self.state.set_bytecode(address, sequence, code, code_hash);
        self.journal
            .push(JournalEntry::BytecodeCreated { address, was_dirty });
    }

    /// Replaces the code installed by [`Self::set_bytecode`]; the pair is
    /// undone by the single bytecode-creation journal entry.
    pub fn update_bytecode(&mut self, address: Address, code: Bytes, code_hash: B256) {
        self.state.update_bytecode(address, code, code_hash);
    }

    /// Marks the account destructed and its bytecode deleted, as two
    /// journaled steps (they live in separate maps). A second
    /// self-destruction of the same account in one transaction is a no-op.
    pub fn selfdestruct(&mut self, address: Address) {
        if self.state.get_account(address).selfdestructed {
            return;
        }
        let (had_flag, was_dirty) = self.state.set_selfdestructed(address, true);
        self.journal.push(JournalEntry::SelfdestructChanged {
            address,
            had_flag,
            was_dirty,
        });
        let was_dirty = self.state.delete_bytecode(address);
        self.journal
            .push(JournalEntry::BytecodeDeleted { address, was_dirty });
    }

    /// Storage value in the account's namespace, cached on first touch.
    pub fn get_storage(&mut self, address: Address, key: B256) -> &Bytes {
        let sequence = self.state.get_account(address).sequence;
        self.state.get_value(sequence, key)
    }

    /// Storage value by raw sequence, cached on first touch.
    pub fn get_value(&mut self, sequence: u64, key: B256) -> &Bytes {
        self.state.get_value(sequence, key)
    }

    /// Writes a storage value in the account's namespace.
    pub fn set_storage(&mut self, address: Address, key: B256, value: &[u8]) -> StorageStatus {
        let sequence = self.state.get_account(address).sequence;
        self.set_value(sequence, key, value)
    }

    /// Writes a storage value and classifies the write per EIP-2200,
    /// adjusting the refund counter accordingly. An empty `value` is a
    /// deletion.
    pub fn set_value(&mut self, sequence: u64, key: B256, value: &[u8]) -> StorageStatus {
        let prev = self.state.set_value(sequence, key, value);
        self.journal.push(JournalEntry::StorageChanged {
            sequence,
            key,
            had_value: prev.clone(),
        });
        // No-op write: only SLOAD_GAS is charged.
        if prev.as_ref() == value {
            return StorageStatus::Unchanged;
        }
        let origin = self.state.get_origin_value(sequence, key).clone();
        if origin == prev {
            // First write to this slot in the current execution context.
            if origin.is_empty() {
                StorageStatus::Added
            } else if value.is_empty() {
                self.add_refund(SSTORE_CLEARS_SCHEDULE);
                StorageStatus::Deleted
            } else {
                StorageStatus::Modified
            }
        } else {
            // The slot is dirty; only SLOAD_GAS is charged, refunds keep the
            // books straight.
            if !origin.is_empty() {
                if prev.is_empty() {
                    self.sub_refund(SSTORE_CLEARS_SCHEDULE);
                }
                if value.is_empty() {
                    self.add_refund(SSTORE_CLEARS_SCHEDULE);
                }
            }
            if origin.as_ref() == value {
                if origin.is_empty() {
                    self.add_refund(SSTORE_SET_GAS - SLOAD_GAS);
                } else {
                    self.add_refund(SSTORE_RESET_GAS - SLOAD_GAS);
                }
            }
            StorageStatus::ModifiedAgain
        }
    }

    /// Adds to the refund counter.
    pub fn add_refund(&mut self, delta: u64) {
        self.journal.push(JournalEntry::RefundChanged {
            had_refund: self.state.refund,
        });
        self.state.refund += delta;
    }

    /// Subtracts from the refund counter.
    pub fn sub_refund(&mut self, delta: u64) {
        self.journal.push(JournalEntry::RefundChanged {
            had_refund: self.state.refund,
        });
        self.state.refund -= delta;
    }

    /// Current refund counter.
    pub fn refund(&self) -> u64 {
        self.state.refund
    }

    /// Appends a log; journaled so revert drops it again.
    pub fn add_log(&mut self, log: Log) {
        self.journal.push(JournalEntry::LogAdded);
        self.state.add_log(log);
    }

    /// Whether the account was already touched in this transaction.
    pub fn access_account(&mut self, address: Address) -> AccessStatus {
        if self.state.has_account(address) {
            AccessStatus::Warm
        } else {
            AccessStatus::Cold
        }
    }

    /// Whether the slot was already touched in this transaction.
    pub fn access_storage(&mut self, address: Address, key: B256) -> AccessStatus {
        let sequence = self.state.get_account(address).sequence;
        if self.state.has_value(sequence, key) {
            AccessStatus::Warm
        } else {
            AccessStatus::Cold
        }
    }

    /// Block hash lookup.
    pub fn block_hash(&self, number: u64) -> B256 {
        self.state.block_hash(number)
    }

    /// Records a nested call's parameters in the internal trace.
    pub fn add_internal_call(&mut self, msg: &Message) {
        self.state.add_internal_call(msg);
    }

    /// Records a nested call's result in the internal trace.
    pub fn add_internal_return(&mut self, result: &ExecResult) {
        self.state.add_internal_return(result);
    }

    /// Finishes the transaction, serializing all dirty state.
    pub fn into_changes(self) -> StateChanges {
        self.state.into_changes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::InMemoryWorldState,
        env::SpecId,
        host::Host,
        interpreter::ExecResult,
    };
    use primitives::{address, b256, Bytes, Log, LogData, EOA_SEQUENCE};

    struct NullVm;

    impl Interpreter for NullVm {
        fn execute(
            &self,
            _host: &mut dyn Host,
            _spec: SpecId,
            msg: &Message,
            _code: &[u8],
        ) -> ExecResult {
            ExecResult::success(msg.gas)
        }
    }

    static NULL_VM: NullVm = NullVm;

    const ALICE: Address = address!("0x1000000000000000000000000000000000000001");
    const BOB: Address = address!("0x1000000000000000000000000000000000000002");
    const SLOT: B256 = b256!("0x00000000000000000000000000000000000000000000000000000000000000aa");

    fn funded_world() -> InMemoryWorldState {
        let mut world = InMemoryWorldState::new();
        world.insert_account(
            ALICE,
            AccountInfo {
                selfdestructed: false,
                balance: U256::from(1000),
                nonce: 5,
                sequence: EOA_SEQUENCE,
            },
        );
        world.insert_account(
            BOB,
            AccountInfo {
                selfdestructed: false,
                balance: U256::from(50),
                nonce: 1,
                sequence: 0x0302,
            },
        );
        world
    }

    fn new_ctrl(world: InMemoryWorldState) -> TxControl<'static, InMemoryWorldState> {
        TxControl::new(world, Env::default(), &NULL_VM, None, None)
    }

    #[test]
    fn revert_restores_every_field_and_dirty_flag() {
        let mut ctrl = new_ctrl(funded_world());
        ctrl.get_account(ALICE);
        ctrl.get_account(BOB);
        let before_alice = ctrl.get_account(ALICE);
        let before_bob = ctrl.get_account(BOB);
        let before_value = ctrl.get_value(0x0302, SLOT).clone();

        let snapshot = ctrl.snapshot();
        assert!(ctrl.transfer(ALICE, BOB, U256::from(30)));
        ctrl.incr_nonce(ALICE);
        ctrl.set_value(0x0302, SLOT, b"new value");
        ctrl.selfdestruct(BOB);
        ctrl.add_log(Log {
            address: BOB,
            data: LogData::new_unchecked(vec![], Bytes::new()),
        });
        ctrl.add_refund(15000);
        ctrl.revert_to(snapshot);

        assert_eq!(ctrl.get_account(ALICE), before_alice);
        assert_eq!(ctrl.get_account(BOB), before_bob);
        assert_eq!(*ctrl.get_value(0x0302, SLOT), before_value);
        assert_eq!(ctrl.refund(), 0);
        assert_eq!(ctrl.journal_len(), 0);
        // nothing may survive into the change-set
        let changes = ctrl.into_changes();
        assert!(changes.accounts.is_empty());
        assert!(changes.values.is_empty());
        assert!(changes.bytecodes.is_empty());
        assert!(changes.logs.is_empty());
    }

    #[test]
    fn nested_snapshots_compose() {
        let mut ctrl = new_ctrl(funded_world());
        ctrl.get_account(ALICE);
        ctrl.get_account(BOB);
        let before = (ctrl.get_account(ALICE), ctrl.get_account(BOB));

        let outer = ctrl.snapshot();
        assert!(ctrl.transfer(ALICE, BOB, U256::from(10)));
        let inner = ctrl.snapshot();
        assert!(ctrl.transfer(ALICE, BOB, U256::from(20)));
        ctrl.incr_nonce(BOB);
        // the inner snapshot is reverted, the outer one later undoes the
        // rest, including everything that happened after `inner`
        ctrl.revert_to(inner);
        assert!(ctrl.transfer(ALICE, BOB, U256::from(5)));
        ctrl.revert_to(outer);

        assert_eq!((ctrl.get_account(ALICE), ctrl.get_account(BOB)), before);
        assert_eq!(ctrl.journal_len(), 0);
    }

    #[test]
    fn transfer_applies_fully_or_not_at_all() {
        let mut ctrl = new_ctrl(funded_world());
        ctrl.get_account(ALICE);
        ctrl.get_account(BOB);

        assert!(!ctrl.transfer(ALICE, BOB, U256::from(100_000)));
        assert_eq!(ctrl.get_account(ALICE).balance, U256::from(1000));
        assert_eq!(ctrl.get_account(BOB).balance, U256::from(50));
        assert_eq!(ctrl.journal_len(), 0);

        assert!(ctrl.transfer(ALICE, BOB, U256::from(1000)));
        assert_eq!(ctrl.get_account(ALICE).balance, U256::ZERO);
        assert_eq!(ctrl.get_account(BOB).balance, U256::from(1050));
        assert_eq!(ctrl.journal_len(), 1);
    }

    #[test]
    fn transfer_undoes_debit_when_credit_overflows() {
        let mut world = funded_world();
        world.insert_account(
            BOB,
            AccountInfo {
                selfdestructed: false,
                balance: U256::MAX,
                nonce: 1,
                sequence: EOA_SEQUENCE,
            },
        );
        let mut ctrl = new_ctrl(world);
        ctrl.get_account(ALICE);
        ctrl.get_account(BOB);

        assert!(!ctrl.transfer(ALICE, BOB, U256::from(1)));
        assert_eq!(ctrl.get_account(ALICE).balance, U256::from(1000));
        assert_eq!(ctrl.get_account(BOB).balance, U256::MAX);
        assert_eq!(ctrl.journal_len(), 0);
    }

    #[test]
    fn selfdestruct_is_idempotent() {
        let mut ctrl = new_ctrl(funded_world());
        ctrl.get_account(BOB);
        ctrl.selfdestruct(BOB);
        let len = ctrl.journal_len();
        assert_eq!(len, 2); // flag change + bytecode deletion
        ctrl.selfdestruct(BOB);
        assert_eq!(ctrl.journal_len(), len);
        assert!(ctrl.is_selfdestructed(BOB));
    }

    #[test]
    fn set_bytecode_advances_the_creation_counter() {
        let mut world = funded_world();
        world.set_creation_counter(BOB[19], 7);
        let mut ctrl = new_ctrl(world);
        ctrl.get_account(BOB);
        ctrl.set_bytecode(BOB, Bytes::new(), primitives::KECCAK_EMPTY);
        assert_eq!(ctrl.journal_len(), 2); // counter bump + code creation
        assert_eq!(
            ctrl.get_account(BOB).sequence,
            contract_sequence(8, BOB[19])
        );
        // reverting both steps restores the original sequence
        ctrl.revert_to(0);
        assert_eq!(ctrl.get_account(BOB).sequence, 0x0302);
    }

    #[test]
    fn sstore_fresh_slot_classification() {
        let mut world = funded_world();
        world.insert_value(9, SLOT, Bytes::copy_from_slice(&[1u8; 32]));
        let mut ctrl = new_ctrl(world);

        // empty origin, empty prior, non-zero new
        let other = b256!("0x00000000000000000000000000000000000000000000000000000000000000bb");
        assert_eq!(ctrl.set_value(9, other, &[2u8; 32]), StorageStatus::Added);
        assert_eq!(ctrl.refund(), 0);

        // occupied origin written back unchanged
        assert_eq!(ctrl.set_value(9, SLOT, &[1u8; 32]), StorageStatus::Unchanged);

        // occupied origin overwritten with a different value
        assert_eq!(ctrl.set_value(9, SLOT, &[3u8; 32]), StorageStatus::Modified);
        assert_eq!(ctrl.refund(), 0);
    }

    #[test]
    fn sstore_delete_grants_refund_and_rewrite_takes_it_back() {
        let mut world = funded_world();
        world.insert_value(9, SLOT, Bytes::copy_from_slice(&[1u8; 32]));
        let mut ctrl = new_ctrl(world);

        assert_eq!(ctrl.set_value(9, SLOT, &[]), StorageStatus::Deleted);
        assert_eq!(ctrl.refund(), SSTORE_CLEARS_SCHEDULE);

        // the slot is dirty now; writing a non-zero value takes the clear
        // refund back
        assert_eq!(ctrl.set_value(9, SLOT, &[2u8; 32]), StorageStatus::ModifiedAgain);
        assert_eq!(ctrl.refund(), 0);
    }

    #[test]
    fn sstore_reset_to_original_refunds_the_difference() {
        let mut world = funded_world();
        world.insert_value(9, SLOT, Bytes::copy_from_slice(&[1u8; 32]));
        let mut ctrl = new_ctrl(world);

        assert_eq!(ctrl.set_value(9, SLOT, &[9u8; 32]), StorageStatus::Modified);
        // dirty slot written back to its original non-zero value
        assert_eq!(ctrl.set_value(9, SLOT, &[1u8; 32]), StorageStatus::ModifiedAgain);
        assert_eq!(ctrl.refund(), SSTORE_RESET_GAS - SLOAD_GAS);
    }

    #[test]
    fn sstore_reset_to_original_zero_refunds_the_set_cost() {
        let mut ctrl = new_ctrl(funded_world());

        assert_eq!(ctrl.set_value(9, SLOT, &[9u8; 32]), StorageStatus::Added);
        // dirty slot cleared back to its original empty state
        assert_eq!(ctrl.set_value(9, SLOT, &[]), StorageStatus::ModifiedAgain);
        assert_eq!(ctrl.refund(), SSTORE_SET_GAS - SLOAD_GAS);
    }

    #[test]
    fn logs_survive_only_if_not_reverted() {
        let mut ctrl = new_ctrl(funded_world());
        ctrl.add_log(Log {
            address: ALICE,
            data: LogData::new_unchecked(vec![], Bytes::from_static(b"keep")),
        });
        let snapshot = ctrl.snapshot();
        ctrl.add_log(Log {
            address: ALICE,
            data: LogData::new_unchecked(vec![], Bytes::from_static(b"drop")),
        });
        ctrl.revert_to(snapshot);
        let changes = ctrl.into_changes();
        assert_eq!(changes.logs.len(), 1);
        assert_eq!(changes.logs[0].data.data.as_ref(), b"keep");
    }
}
