//! # seqevm-primitives
//!
//! Primitive types shared by the seqevm execution engine: re-exports of the
//! alloy base types plus the sequence-number scheme that keys contract
//! storage namespaces.

pub mod constants;
pub mod sequence;

pub use alloy_primitives::{
    self, address, b256, hex, keccak256, map, map::HashMap, map::HashSet, Address, Bytes, Log,
    LogData, B256, U256,
};

pub use constants::*;
pub use sequence::{contract_sequence, StorageKey};
