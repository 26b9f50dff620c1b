//! Interface to the external bytecode interpreter.
//!
//! The engine never decodes bytecode itself. It hands a [`Message`] and the
//! resolved code to an [`Interpreter`] implementation, together with a
//! [`Host`](crate::host::Host) through which the interpreter performs every
//! side effect.

use crate::{env::SpecId, host::Host};
use auto_impl::auto_impl;
use primitives::{Address, Bytes, B256, U256};

/// Kind of a call frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CallKind {
    /// Ordinary message call.
    #[default]
    Call,
    /// Run destination code with the caller's storage and self address.
    CallCode,
    /// Like [`CallKind::CallCode`] but also keeps sender and value.
    DelegateCall,
    /// Contract creation with a nonce-derived address.
    Create,
    /// Contract creation with a salt-derived address.
    Create2,
}

/// One call frame's parameters, as passed between the interpreter and the
/// host dispatcher.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    /// Kind of the call.
    pub kind: CallKind,
    /// Set when state mutation is forbidden in this frame.
    pub is_static: bool,
    /// Call depth; the transaction itself runs at depth zero.
    pub depth: u32,
    /// Gas available to this frame.
    pub gas: i64,
    /// Account whose code runs, and the default storage context.
    pub destination: Address,
    /// Caller of this frame.
    pub sender: Address,
    /// Input bytes; init code for creation frames.
    pub input: Bytes,
    /// Value transferred with the call.
    pub value: U256,
    /// Salt of a [`CallKind::Create2`] frame.
    pub create2_salt: B256,
}

/// Outcome classification of one frame or of the whole transaction.
///
/// Every protocol failure is a value here, never a panic; the dispatcher
/// reverts the corresponding snapshot and keeps running the parent frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatusCode {
    /// Execution finished normally.
    #[default]
    Success,
    /// Execution ended with the revert instruction; remaining gas is kept.
    Revert,
    /// Gas was exhausted.
    OutOfGas,
    /// Generic failure reported by the interpreter.
    Failure,
    /// A precompiled contract rejected its input.
    PrecompileFailure,
    /// The sender cannot cover the transferred value.
    InsufficientBalance,
    /// Contract creation targeted an occupied account.
    InvalidCreateTarget,
    /// Created code exceeds the maximum permitted size.
    MaxCodeSizeExceeded,
    /// The engine itself misbehaved; callers should treat this as fatal.
    InternalError,
}

impl StatusCode {
    /// Whether this status means the frame succeeded.
    #[inline]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Result of running one frame.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExecResult {
    /// Outcome classification.
    pub status: StatusCode,
    /// Gas left for the caller. Zero for every failure except revert.
    pub gas_left: i64,
    /// Return data, or the runtime code produced by init code.
    pub output: Bytes,
    /// Address of the created contract, set by successful creation frames.
    pub create_address: Option<Address>,
}

impl ExecResult {
    /// Result carrying only a status, with no gas and no output.
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Successful result with the given gas remaining.
    pub fn success(gas_left: i64) -> Self {
        Self {
            status: StatusCode::Success,
            gas_left,
            ..Default::default()
        }
    }

    /// Successful result with gas remaining and output bytes.
    pub fn success_with_output(gas_left: i64, output: Bytes) -> Self {
        Self {
            status: StatusCode::Success,
            gas_left,
            output,
            ..Default::default()
        }
    }

    /// Whether the frame succeeded.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// The execute capability the engine drives.
///
/// Implementations decode and run `code`, calling back into `host` for every
/// external operation. The engine guarantees `msg.gas` is non-negative.
#[auto_impl(&, Box, Arc)]
pub trait Interpreter {
    /// Runs `code` under `msg` and returns the frame result.
    fn execute(&self, host: &mut dyn Host, spec: SpecId, msg: &Message, code: &[u8]) -> ExecResult;
}

/// Per-address substitution of the execute capability, letting an
/// ahead-of-time compiled contract replace the interpreter for its address.
#[auto_impl(&, Box, Arc)]
pub trait ExecutorOverrides {
    /// Returns the substitute executor for `code_address`, if any.
    fn executor_for(&self, code_address: &Address) -> Option<&dyn Interpreter>;
}
