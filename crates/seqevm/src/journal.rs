//! Undo log of state mutations within one transaction.
//!
//! Entries are appended in mutation order and replayed strictly last-in
//! first-out by [`TxControl::revert_to`](crate::controller::TxControl);
//! a snapshot is nothing more than the journal length at a point in time.

use crate::{db::WorldState, state::CachedState};
use primitives::{Address, Bytes, B256, U256};

/// One reversible state mutation. Each variant stores exactly what is needed
/// to restore the prior value and the prior dirty flag of the touched entry.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JournalEntry {
    /// A storage value was replaced.
    StorageChanged {
        /// Storage-namespace sequence of the slot.
        sequence: u64,
        /// Slot key.
        key: B256,
        /// Value before the change.
        had_value: Bytes,
    },
    /// An account was inserted into the cache as brand-new.
    AccountCreated {
        /// Address of the created account.
        address: Address,
    },
    /// Balance moved from one account to another, or was burned.
    BalanceTransfer {
        /// Debited account.
        from: Address,
        /// Credited account; `None` for a burn.
        to: Option<Address>,
        /// Amount moved.
        amount: U256,
        /// Dirty flag of the debited account before the change.
        from_was_dirty: bool,
        /// Dirty flag of the credited account before the change.
        to_was_dirty: bool,
    },
    /// An account nonce was incremented by one.
    NonceChanged {
        /// Address of the account.
        address: Address,
        /// Dirty flag before the change.
        was_dirty: bool,
    },
    /// The self-destructed flag was set.
    SelfdestructChanged {
        /// Address of the account.
        address: Address,
        /// Flag value before the change.
        had_flag: bool,
        /// Dirty flag before the change.
        was_dirty: bool,
    },
    /// A contract's code was marked deleted.
    BytecodeDeleted {
        /// Address of the contract.
        address: Address,
        /// Dirty flag before the change.
        was_dirty: bool,
    },
    /// Code was installed for a contract (covers the paired code update).
    BytecodeCreated {
        /// Address of the contract.
        address: Address,
        /// Dirty flag before the change.
        was_dirty: bool,
    },
    /// A creation counter was incremented by one.
    CreationCounterIncremented {
        /// Address low byte that keys the counter.
        low_byte: u8,
        /// Dirty flag before the change.
        was_dirty: bool,
    },
    /// The refund counter changed.
    RefundChanged {
        /// Refund counter before the change.
        had_refund: u64,
    },
    /// A log was appended.
    LogAdded,
}

impl JournalEntry {
    /// Undoes this mutation against the cached state, restoring the exact
    /// prior value and dirty flag.
    pub fn revert<W: WorldState>(self, state: &mut CachedState<W>) {
        match self {
            Self::StorageChanged {
                sequence,
                key,
                had_value,
            } => state.undo_set_value(sequence, key, had_value),
            Self::AccountCreated { address } => state.remove_account(address),
            Self::BalanceTransfer {
                from,
                to,
                amount,
                from_was_dirty,
                to_was_dirty,
            } => {
                state.undo_debit(from, amount, from_was_dirty);
                if let Some(to) = to {
                    state.undo_credit(to, amount, to_was_dirty);
                }
            }
            Self::NonceChanged { address, was_dirty } => state.undo_incr_nonce(address, was_dirty),
            Self::SelfdestructChanged {
                address,
                had_flag,
                was_dirty,
            } => state.undo_set_selfdestructed(address, had_flag, was_dirty),
            Self::BytecodeDeleted { address, was_dirty } => {
                state.undo_delete_bytecode(address, was_dirty)
            }
            Self::BytecodeCreated { address, was_dirty } => {
                state.undo_set_bytecode(address, was_dirty)
            }
            Self::CreationCounterIncremented { low_byte, was_dirty } => {
                state.undo_incr_creation_counter(low_byte, was_dirty)
            }
            Self::RefundChanged { had_refund } => state.refund = had_refund,
            Self::LogAdded => state.pop_log(),
        }
    }
}
