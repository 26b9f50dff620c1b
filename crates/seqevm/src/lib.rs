//! # seqevm
//!
//! Host-side transaction-execution runtime for a smart-contract platform.
//! Given a transaction, the engine runs contract bytecode through an
//! external [`Interpreter`], mediates every interaction between that
//! interpreter and the persistent ledger, and produces a deterministic,
//! reversible set of state changes plus a result.
//!
//! The moving parts:
//!
//! - [`db::WorldState`] — read-only accessor for the durable ledger.
//! - [`state::CachedState`] — journaled in-memory overlay holding
//!   everything one transaction touches.
//! - [`controller::TxControl`] — the transaction orchestrator: journaled
//!   high-level operations, snapshot/revert, gas-trace recording.
//! - [`host::CallFrame`] — the per-frame dispatcher implementing every
//!   host callback, call/create semantics and precompile routing.
//! - [`cache::AnalysisCache`] — sharded cache of pre-analyzed bytecode,
//!   shared across transactions.
//! - [`estimate`] — binary search over the recorded gas trace for the
//!   minimal sufficient gas limit.
//! - [`evm::Evm`] — the entry point tying it all together.

pub mod cache;
pub mod controller;
pub mod db;
pub mod env;
pub mod estimate;
pub mod evm;
pub mod gas;
pub mod host;
pub mod interpreter;
pub mod journal;
pub mod precompile;
pub mod result;
pub mod state;

pub use primitives;

pub use cache::{AnalysisCache, CacheConfig};
pub use controller::{AccessStatus, Snapshot, StorageStatus, TxControl};
pub use db::{EmptyWorldState, InMemoryWorldState, WorldState};
pub use env::{BlockEnv, CfgEnv, Env, SpecId, TxEnv};
pub use estimate::ESTIMATE_FAILED;
pub use evm::Evm;
pub use host::{CallFrame, Host};
pub use interpreter::{
    CallKind, ExecResult, ExecutorOverrides, Interpreter, Message, StatusCode,
};
pub use journal::JournalEntry;
pub use result::{
    ChangedAccount, ChangedBytecode, ChangedCreationCounter, ChangedValue, ResultAndState,
    StateChanges,
};
pub use state::{AccountInfo, BytecodeEntry, CachedState, InternalCall, InternalReturn};
