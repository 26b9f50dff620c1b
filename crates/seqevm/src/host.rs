//! Host-side dispatcher for interpreter callbacks.
//!
//! One [`CallFrame`] exists per call frame, the top-level transaction
//! included. The interpreter performs every external operation through the
//! [`Host`] trait; nested calls re-enter through [`Host::call`], which
//! dispatches on the message kind and brackets the run with gas-trace and
//! internal-call-trace records.

use crate::{
    controller::{AccessStatus, Snapshot, StorageStatus, TxControl},
    db::WorldState,
    env::Env,
    gas::{CREATE_DATA_GAS, SELFDESTRUCT_REFUND_GAS},
    interpreter::{CallKind, ExecResult, Message, StatusCode},
    precompile::{self, hash, PrecompileError, PrecompileResult},
};
use primitives::{
    keccak256, Address, Bytes, Log, B256, EOA_SEQUENCE, KECCAK_EMPTY, MAX_CODE_SIZE, U256,
};

/// The callback surface the interpreter drives.
pub trait Host {
    /// Whether the account exists and is not empty.
    fn account_exists(&mut self, address: Address) -> bool;
    /// One storage word; zero when the slot is absent.
    fn get_storage(&mut self, address: Address, key: B256) -> B256;
    /// Writes one storage word; a zero word deletes the slot.
    fn set_storage(&mut self, address: Address, key: B256, value: B256) -> StorageStatus;
    /// Balance of the account; zero for absent, empty or destructed ones.
    fn get_balance(&mut self, address: Address) -> U256;
    /// Size of the account's code.
    fn get_code_size(&mut self, address: Address) -> usize;
    /// Hash of the account's code; zero for absent or empty accounts.
    fn get_code_hash(&mut self, address: Address) -> B256;
    /// Copies code starting at `code_offset` into `buffer`, returning the
    /// number of bytes copied.
    fn copy_code(&mut self, address: Address, code_offset: usize, buffer: &mut [u8]) -> usize;
    /// Self-destructs `address`, sending its balance to `beneficiary`.
    fn selfdestruct(&mut self, address: Address, beneficiary: Address);
    /// Runs a nested call and returns its result.
    fn call(&mut self, msg: Message) -> ExecResult;
    /// Transaction and block environment.
    fn env(&self) -> &Env;
    /// Hash of the block at the given height.
    fn block_hash(&mut self, number: u64) -> B256;
    /// Emits a log.
    fn emit_log(&mut self, log: Log);
    /// Warm/cold classification of an account access.
    fn access_account(&mut self, address: Address) -> AccessStatus;
    /// Warm/cold classification of a storage access.
    fn access_storage(&mut self, address: Address, key: B256) -> AccessStatus;
}

/// One call frame of the transaction.
pub struct CallFrame<'f, 'a, W: WorldState> {
    pub(crate) ctrl: &'f mut TxControl<'a, W>,
    pub(crate) msg: Message,
    code: Bytes,
}

impl<W: WorldState> core::fmt::Debug for CallFrame<'_, '_, W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallFrame")
            .field("msg", &self.msg)
            .finish_non_exhaustive()
    }
}

/// Performs the value transfer of an ordinary CALL.
///
/// Returns `true` when the whole call is a pure no-op: zero value to an
/// absent, non-precompile destination. Materializes the destination account
/// otherwise, and prunes it again right away when it is empty and untouched
/// by value (EIP-158).
pub(crate) fn transfer_on_call<W: WorldState>(
    ctrl: &mut TxControl<'_, W>,
    sender: Address,
    destination: Address,
    value: U256,
) -> bool {
    let acc = ctrl.get_account(destination);
    let zero_value = value.is_zero();
    let to_precompile = precompile::is_precompiled(&destination);
    let is_empty = acc.nonce == 0
        && acc.balance.is_zero()
        && ctrl.get_bytecode_entry(destination).code.is_empty();
    if acc.is_absent() {
        if zero_value && !to_precompile {
            return true;
        }
        ctrl.new_account(destination);
    }
    if is_empty && zero_value {
        ctrl.selfdestruct(destination);
    }
    if !zero_value {
        ctrl.transfer(sender, destination, value);
    }
    false
}

impl<'f, 'a, W: WorldState> CallFrame<'f, 'a, W> {
    /// Creates the root frame of a transaction.
    pub fn new(ctrl: &'f mut TxControl<'a, W>, msg: Message) -> Self {
        Self {
            ctrl,
            msg,
            code: Bytes::new(),
        }
    }

    /// Runs a nested operation. This is the single entry point used both by
    /// the interpreter (through [`Host::call`]) and by the transaction entry
    /// point for the root frame.
    pub fn call(&mut self, msg: Message) -> ExecResult {
        self.ctrl.gas_trace_enter(msg.gas);
        self.ctrl.add_internal_call(&msg);
        let code_address = msg.destination;
        let parent_destination = self.msg.destination;
        let mut frame = CallFrame {
            ctrl: &mut *self.ctrl,
            msg,
            code: Bytes::new(),
        };
        let result = match frame.msg.kind {
            CallKind::Call if frame.msg.is_static => frame.run_plain(code_address),
            CallKind::Call => frame.call_with_transfer(),
            CallKind::CallCode | CallKind::DelegateCall => {
                // destination code runs in the caller's storage context
                frame.msg.destination = parent_destination;
                frame.run_plain(code_address)
            }
            CallKind::Create | CallKind::Create2 => frame.create(),
        };
        self.ctrl.gas_trace_exit(result.gas_left);
        self.ctrl.add_internal_return(&result);
        result
    }

    /// Resolves and caches the code this frame will run.
    fn load_code(&mut self, code_address: Address) {
        self.ctrl.get_account(self.msg.destination);
        self.code = self.ctrl.get_bytecode_entry(code_address).code.clone();
    }

    /// Runs the frame without a value transfer: static CALL, CALLCODE and
    /// DELEGATECALL.
    fn run_plain(&mut self, code_address: Address) -> ExecResult {
        let snapshot = self.ctrl.snapshot();
        match precompile::precompile_id(&code_address).filter(|id| precompile::id_is_precompiled(*id))
        {
            Some(id) => {
                let result = self.run_precompile(code_address, id);
                if !result.is_success() {
                    self.ctrl.revert_to(snapshot);
                }
                result
            }
            None => {
                self.load_code(code_address);
                if self.msg.kind == CallKind::Call {
                    self.check_eip158();
                }
                self.run_vm(snapshot, &code_address)
            }
        }
    }

    /// Runs an ordinary CALL: value transfer first, then the destination's
    /// precompile or code.
    fn call_with_transfer(&mut self) -> ExecResult {
        let snapshot = self.ctrl.snapshot();
        let destination = self.msg.destination;
        self.load_code(destination);
        if transfer_on_call(self.ctrl, self.msg.sender, destination, self.msg.value) {
            return ExecResult::success(self.msg.gas);
        }
        match precompile::precompile_id(&destination).filter(|id| precompile::id_is_precompiled(*id))
        {
            Some(id) => {
                let result = self.run_precompile(destination, id);
                if !result.is_success() {
                    self.ctrl.revert_to(snapshot);
                }
                result
            }
            None => self.run_vm(snapshot, &destination),
        }
    }

    /// Prunes a touched empty destination (EIP-158).
    fn check_eip158(&mut self) {
        let acc = self.ctrl.get_account(self.msg.destination);
        let is_empty = acc.nonce == 0 && acc.balance.is_zero() && self.code.is_empty();
        if is_empty && self.msg.value.is_zero() {
            self.ctrl.selfdestruct(self.msg.destination);
        }
    }

    /// Hands the frame to the interpreter; reverts to `snapshot` unless it
    /// succeeds. Empty code is a successful no-op.
    fn run_vm(&mut self, snapshot: Snapshot, code_address: &Address) -> ExecResult {
        if self.code.is_empty() {
            return ExecResult::success(self.msg.gas);
        }
        let executor = self.ctrl.executor_for(code_address);
        let spec = self.ctrl.env().cfg.spec;
        let msg = self.msg.clone();
        let code = self.code.clone();
        let result = executor.execute(self, spec, &msg, &code);
        if !result.is_success() {
            self.ctrl.revert_to(snapshot);
        }
        result
    }

    /// Runs a contract-creation frame.
    fn create(&mut self) -> ExecResult {
        let address = if self.msg.kind == CallKind::Create {
            let mut nonce = self.ctrl.get_account(self.msg.sender).nonce;
            if self.msg.depth == 0 {
                // the node already charged the sender nonce for the
                // transaction itself
                nonce -= 1;
            }
            self.msg.sender.create(nonce)
        } else {
            let init_code_hash = keccak256(&self.msg.input);
            self.msg
                .sender
                .create2(self.msg.create2_salt, init_code_hash)
        };
        self.create_with_address(address)
    }

    /// The creation target must be absent or empty: an occupied account with
    /// a nonce or real code cannot be overwritten.
    fn create_pre_check(&mut self, new_address: Address) -> bool {
        let acc = self.ctrl.get_account(new_address);
        let code_hash = self.get_code_hash(new_address);
        if !acc.is_absent()
            && (acc.nonce != 0 || (code_hash != B256::ZERO && code_hash != KECCAK_EMPTY))
        {
            return false;
        }
        true
    }

    fn create_with_address(&mut self, address: Address) -> ExecResult {
        if self.msg.depth != 0 {
            self.ctrl.get_account(self.msg.sender);
            self.ctrl.incr_nonce(self.msg.sender);
        }
        if !self.create_pre_check(address) {
            return ExecResult::from_status(StatusCode::InvalidCreateTarget);
        }
        self.msg.destination = address;
        self.code = core::mem::take(&mut self.msg.input);

        // everything from here reverts together if the init code fails
        let snapshot = self.ctrl.snapshot();
        let acc = self.ctrl.get_account(address);
        if acc.is_absent() || acc.is_empty() {
            self.ctrl.new_account(address);
        }
        self.ctrl.incr_nonce(address);
        self.ctrl.set_bytecode(address, Bytes::new(), KECCAK_EMPTY);
        self.ctrl.transfer(self.msg.sender, address, self.msg.value);

        let mut result = self.run_vm(snapshot, &address);
        if result.status == StatusCode::Revert {
            return result;
        }

        let oversized = result.output.len() > MAX_CODE_SIZE;
        if result.is_success() && !oversized {
            let deposit_gas = result.output.len() as i64 * CREATE_DATA_GAS as i64;
            if !result.output.is_empty() && result.output[0] == 0xEF {
                // EIP-3541
                result.status = StatusCode::Failure;
                result.gas_left = 0;
            } else if result.gas_left >= deposit_gas {
                result.gas_left -= deposit_gas;
                let runtime_code = core::mem::take(&mut result.output);
                let code_hash = keccak256(&runtime_code);
                self.ctrl.update_bytecode(address, runtime_code, code_hash);
            } else {
                result.status = StatusCode::OutOfGas;
                result.gas_left = 0;
            }
            // the output became the contract's code, not return data
            result.output = Bytes::new();
        }
        if oversized || !result.is_success() {
            self.ctrl.revert_to(snapshot);
            if result.status != StatusCode::Revert {
                result.gas_left = 0;
            }
        }
        if result.is_success() && oversized {
            result.status = StatusCode::MaxCodeSizeExceeded;
        }
        result.create_address = Some(address);
        result
    }

    /// Routes a precompile id to its implementation.
    fn run_precompile(&mut self, code_address: Address, id: i64) -> ExecResult {
        match id {
            2 => self.run_pure(hash::sha256_run),
            3 => self.run_pure(hash::ripemd160_run),
            4 => self.run_pure(hash::identity_run),
            precompile::KVSTORE_ID => self.run_kvstore(),
            precompile::TOKEN_ID => self.run_token(),
            _ => self.run_external(code_address),
        }
    }

    fn run_pure(&mut self, run: fn(&[u8], u64) -> PrecompileResult) -> ExecResult {
        precompile_exec_result(run(&self.msg.input, self.msg.gas as u64), self.msg.gas)
    }

    fn run_external(&mut self, code_address: Address) -> ExecResult {
        let Some(external) = self.ctrl.external_precompiles() else {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        };
        precompile_exec_result(
            external.run(&code_address, &self.msg.input, self.msg.gas),
            self.msg.gas,
        )
    }
}

/// Converts a precompile result into a frame result against `gas_limit`.
fn precompile_exec_result(result: PrecompileResult, gas_limit: i64) -> ExecResult {
    match result {
        Ok(output) => ExecResult::success_with_output(gas_limit - output.gas_used as i64, output.bytes),
        Err(PrecompileError::OutOfGas) => ExecResult::from_status(StatusCode::OutOfGas),
        Err(PrecompileError::Failure) => ExecResult::from_status(StatusCode::PrecompileFailure),
    }
}

impl<W: WorldState> Host for CallFrame<'_, '_, W> {
    fn account_exists(&mut self, address: Address) -> bool {
        let info = self.ctrl.get_account(address);
        if info.is_absent() {
            return false;
        }
        // emptiness checks the actual bytecode, not just the sequence
        let is_empty = info.nonce == 0
            && info.balance.is_zero()
            && self.ctrl.get_bytecode_entry(address).code.is_empty();
        !is_empty
    }

    fn get_storage(&mut self, address: Address, key: B256) -> B256 {
        let value = self.ctrl.get_storage(address, key);
        if value.is_empty() {
            return B256::ZERO;
        }
        assert!(value.len() >= 32, "storage word shorter than 32 bytes");
        B256::from_slice(&value[..32])
    }

    fn set_storage(&mut self, address: Address, key: B256, value: B256) -> StorageStatus {
        // a zero word becomes an empty value, which collection treats as
        // deletion
        let bytes: &[u8] = if value.is_zero() { &[] } else { value.as_slice() };
        self.ctrl.set_storage(address, key, bytes)
    }

    fn get_balance(&mut self, address: Address) -> U256 {
        let info = self.ctrl.get_account(address);
        if info.is_absent() || info.is_empty() || info.selfdestructed {
            return U256::ZERO;
        }
        info.balance
    }

    fn get_code_size(&mut self, address: Address) -> usize {
        let info = self.ctrl.get_account(address);
        if info.is_absent() || info.is_empty() || info.sequence == EOA_SEQUENCE {
            return 0;
        }
        self.ctrl.get_bytecode_entry(address).code.len()
    }

    fn get_code_hash(&mut self, address: Address) -> B256 {
        let info = self.ctrl.get_account(address);
        if info.is_absent() {
            return B256::ZERO;
        }
        let entry = self.ctrl.get_bytecode_entry(address);
        if info.nonce == 0 && info.balance.is_zero() && entry.code.is_empty() {
            return B256::ZERO;
        }
        entry.code_hash
    }

    fn copy_code(&mut self, address: Address, code_offset: usize, buffer: &mut [u8]) -> usize {
        let code = &self.ctrl.get_bytecode_entry(address).code;
        if code_offset >= code.len() {
            return 0;
        }
        let n = core::cmp::min(code.len() - code_offset, buffer.len());
        buffer[..n].copy_from_slice(&code[code_offset..code_offset + n]);
        n
    }

    fn selfdestruct(&mut self, address: Address, beneficiary: Address) {
        if !self.ctrl.is_selfdestructed(address) {
            self.ctrl.add_refund(SELFDESTRUCT_REFUND_GAS);
        }
        let balance = self.ctrl.get_balance(address);
        let beneficiary_info = self.ctrl.get_account(beneficiary);
        let zero_value = balance.is_zero();
        let self_as_beneficiary = beneficiary == self.msg.destination;
        if beneficiary_info.is_absent() && !zero_value {
            self.ctrl.new_account(beneficiary);
        }
        let is_empty = beneficiary_info.nonce == 0
            && beneficiary_info.balance.is_zero()
            && self.ctrl.get_bytecode_entry(beneficiary).code.is_empty();
        if is_empty && zero_value {
            // EIP-158: a touched empty beneficiary is pruned
            self.ctrl.selfdestruct(beneficiary);
        }
        if self_as_beneficiary {
            self.ctrl.burn(address, balance);
        } else {
            self.ctrl.transfer(address, beneficiary, balance);
        }
        self.ctrl.selfdestruct(address);
    }

    fn call(&mut self, msg: Message) -> ExecResult {
        CallFrame::call(self, msg)
    }

    fn env(&self) -> &Env {
        self.ctrl.env()
    }

    fn block_hash(&mut self, number: u64) -> B256 {
        self.ctrl.block_hash(number)
    }

    fn emit_log(&mut self, log: Log) {
        self.ctrl.add_log(log);
    }

    fn access_account(&mut self, address: Address) -> AccessStatus {
        self.ctrl.access_account(address)
    }

    fn access_storage(&mut self, address: Address, key: B256) -> AccessStatus {
        self.ctrl.access_storage(address, key)
    }
}
