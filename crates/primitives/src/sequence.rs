//! Storage-namespace sequence numbers.
//!
//! Every contract incarnation owns a disjoint storage namespace identified
//! by a 64-bit sequence number. The sequence is derived from a per-address
//! creation counter so that destroying and recreating a contract at the same
//! address never resurrects old storage.

use alloy_primitives::B256;

/// Derives the storage sequence for a freshly installed contract from its
/// creation counter and the low byte of its address.
#[inline]
pub const fn contract_sequence(counter: u64, address_low_byte: u8) -> u64 {
    (counter << 8) | address_low_byte as u64
}

/// Key of one storage entry: the owning namespace sequence plus the 256-bit
/// slot key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StorageKey {
    /// Storage-namespace sequence of the owning account.
    pub sequence: u64,
    /// 256-bit slot key within the namespace.
    pub key: B256,
}

impl StorageKey {
    /// Creates a storage key for `key` inside the namespace `sequence`.
    #[inline]
    pub const fn new(sequence: u64, key: B256) -> Self {
        Self { sequence, key }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_packs_counter_and_address_byte() {
        assert_eq!(contract_sequence(0, 0), 0);
        assert_eq!(contract_sequence(1, 0x2a), 0x012a);
        assert_eq!(contract_sequence(0x1234, 0xff), 0x1234ff);
    }
}
