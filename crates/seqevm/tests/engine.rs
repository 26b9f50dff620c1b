//! End-to-end transaction scenarios against a scripted interpreter.

use seqevm::{
    precompile::{ExternalPrecompiles, PrecompileOutput, PrecompileResult},
    primitives::{address, b256, Address, Bytes, B256, EOA_SEQUENCE, U256},
    AccountInfo, BlockEnv, CallKind, Evm, ExecResult, Host, InMemoryWorldState, Interpreter,
    Message, SpecId, StatusCode, TxEnv,
};

const ALICE: Address = address!("0x1111111111111111111111111111111111111111");
const BOB: Address = address!("0x2222222222222222222222222222222222222222");
const CONTRACT: Address = address!("0x3333333333333333333333333333333333333333");
const CONTRACT_SEQUENCE: u64 = 0x4233;
const CONTRACT_CODE: &[u8] = &[0x60, 0x00, 0x60, 0x00, 0x55];
const SLOT: B256 = b256!("0x0000000000000000000000000000000000000000000000000000000000000007");

struct ScriptedVm<F>(F);

impl<F> Interpreter for ScriptedVm<F>
where
    F: Fn(&mut dyn Host, &Message, &[u8]) -> ExecResult,
{
    fn execute(&self, host: &mut dyn Host, _spec: SpecId, msg: &Message, code: &[u8]) -> ExecResult {
        (self.0)(host, msg, code)
    }
}

fn world() -> InMemoryWorldState {
    let mut world = InMemoryWorldState::new();
    world.insert_account(
        ALICE,
        AccountInfo {
            selfdestructed: false,
            balance: U256::from(1_000_000),
            nonce: 1,
            sequence: EOA_SEQUENCE,
        },
    );
    world.insert_account(
        CONTRACT,
        AccountInfo {
            selfdestructed: false,
            balance: U256::ZERO,
            nonce: 1,
            sequence: CONTRACT_SEQUENCE,
        },
    );
    world.insert_bytecode(
        CONTRACT,
        Bytes::from_static(CONTRACT_CODE),
        seqevm::primitives::keccak256(CONTRACT_CODE),
    );
    world
}

fn tx(destination: Address, gas_limit: i64) -> TxEnv {
    TxEnv {
        caller: ALICE,
        gas_price: U256::from(1),
        gas_limit,
        destination,
        value: U256::ZERO,
        data: Bytes::new(),
        estimate_gas: false,
    }
}

#[test]
fn rejects_insufficient_intrinsic_gas_without_touching_state() {
    let vm = ScriptedVm(|_: &mut dyn Host, msg: &Message, _: &[u8]| ExecResult::success(msg.gas));
    let evm = Evm::new(world(), &vm);
    let outcome = evm.transact(tx(BOB, 20_000));
    assert_eq!(outcome.result.status, StatusCode::OutOfGas);
    assert_eq!(outcome.result.gas_left, 0);
    assert!(outcome.state.accounts.is_empty());
    assert!(outcome.state.values.is_empty());
}

#[test]
fn rejects_insufficient_balance_without_touching_state() {
    let vm = ScriptedVm(|_: &mut dyn Host, msg: &Message, _: &[u8]| ExecResult::success(msg.gas));
    let evm = Evm::new(world(), &vm);
    let mut env = tx(BOB, 100_000);
    env.value = U256::from(2_000_000);
    let outcome = evm.transact(env);
    assert_eq!(outcome.result.status, StatusCode::InsufficientBalance);
    assert!(outcome.state.accounts.is_empty());
}

#[test]
fn zero_value_call_to_missing_account_is_a_noop_with_full_refund() {
    let vm = ScriptedVm(|_: &mut dyn Host, msg: &Message, _: &[u8]| ExecResult::success(msg.gas));
    let evm = Evm::new(world(), &vm);
    let missing = address!("0x00000000000000000000000000000000000000aa");
    let outcome = evm.transact(tx(missing, 100_000));
    assert!(outcome.result.is_success());
    assert_eq!(outcome.result.gas_left, 100_000 - 21_000);
    assert!(outcome.state.accounts.is_empty());
    assert!(outcome.state.values.is_empty());
    assert!(outcome.state.logs.is_empty());
}

#[test]
fn value_transfer_updates_both_accounts() {
    let vm = ScriptedVm(|_: &mut dyn Host, msg: &Message, _: &[u8]| ExecResult::success(msg.gas));
    let evm = Evm::new(world(), &vm);
    let mut env = tx(BOB, 100_000);
    env.value = U256::from(777);
    let outcome = evm.transact(env);
    assert!(outcome.result.is_success());
    let balance_of = |address| {
        outcome
            .state
            .accounts
            .iter()
            .find(|acc| acc.address == address)
            .map(|acc| acc.balance)
    };
    assert_eq!(balance_of(ALICE), Some(U256::from(1_000_000 - 777)));
    assert_eq!(balance_of(BOB), Some(U256::from(777)));
}

#[test]
fn contract_execution_collects_storage_logs_and_call_trace() {
    let vm = ScriptedVm(|host: &mut dyn Host, msg: &Message, code: &[u8]| {
        assert_eq!(code, CONTRACT_CODE);
        host.set_storage(msg.destination, SLOT, B256::with_last_byte(0x2a));
        host.emit_log(seqevm::primitives::Log {
            address: msg.destination,
            data: seqevm::primitives::LogData::new_unchecked(
                vec![B256::ZERO],
                Bytes::from_static(b"hello"),
            ),
        });
        // a nested zero-value call to nobody is a free no-op
        let nested = host.call(Message {
            kind: CallKind::Call,
            is_static: false,
            depth: msg.depth + 1,
            gas: 5_000,
            destination: address!("0x00000000000000000000000000000000000000bb"),
            sender: msg.destination,
            input: Bytes::new(),
            value: U256::ZERO,
            create2_salt: B256::ZERO,
        });
        assert!(nested.is_success());
        assert_eq!(nested.gas_left, 5_000);
        ExecResult::success(msg.gas - 4_000)
    });
    let evm = Evm::new(world(), &vm);
    let outcome = evm.transact(tx(CONTRACT, 100_000));
    assert!(outcome.result.is_success());
    assert_eq!(outcome.result.gas_left, 100_000 - 21_000 - 4_000);

    let value = outcome
        .state
        .values
        .iter()
        .find(|change| change.sequence == CONTRACT_SEQUENCE && change.key == SLOT)
        .expect("storage write must be collected");
    assert_eq!(value.value.as_ref(), B256::with_last_byte(0x2a).as_slice());

    assert_eq!(outcome.state.logs.len(), 1);
    assert_eq!(outcome.state.logs[0].data.data.as_ref(), b"hello");

    // root call plus the nested one, with matching returns
    assert_eq!(outcome.state.calls.len(), 2);
    assert_eq!(outcome.state.returns.len(), 2);
    assert_eq!(outcome.state.calls[0].destination, CONTRACT);
    assert_eq!(outcome.state.calls[1].gas, 5_000);
    assert_eq!(outcome.state.returns[0].gas_left, 5_000);
}

#[test]
fn reverted_execution_keeps_gas_and_discards_changes() {
    let vm = ScriptedVm(|host: &mut dyn Host, msg: &Message, _: &[u8]| {
        host.set_storage(msg.destination, SLOT, B256::with_last_byte(0x2a));
        ExecResult {
            status: StatusCode::Revert,
            gas_left: msg.gas - 123,
            output: Bytes::from_static(b"oops"),
            create_address: None,
        }
    });
    let evm = Evm::new(world(), &vm);
    let outcome = evm.transact(tx(CONTRACT, 100_000));
    assert_eq!(outcome.result.status, StatusCode::Revert);
    assert_eq!(outcome.result.gas_left, 100_000 - 21_000 - 123);
    assert_eq!(outcome.result.output.as_ref(), b"oops");
    assert!(outcome.state.values.is_empty());
    assert!(outcome.state.logs.is_empty());
}

#[test]
fn create_transaction_installs_the_returned_code() {
    let vm = ScriptedVm(|_: &mut dyn Host, msg: &Message, code: &[u8]| {
        // init code runs, runtime code comes back
        assert_eq!(code, &[0x00]);
        ExecResult::success_with_output(msg.gas, Bytes::from_static(&[0x60, 0x01]))
    });
    let evm = Evm::new(world(), &vm);
    let mut env = tx(Address::ZERO, 200_000);
    env.data = Bytes::from_static(&[0x00]);
    let outcome = evm.transact(env);
    assert!(outcome.result.is_success());
    let created = outcome.result.create_address.expect("create address");
    assert_eq!(created, ALICE.create(0));

    let installed = outcome
        .state
        .bytecodes
        .iter()
        .find(|change| change.address == created)
        .expect("created code must be collected");
    assert_eq!(installed.code.as_ref(), &[0x60, 0x01]);
    let account = outcome
        .state
        .accounts
        .iter()
        .find(|change| change.address == created)
        .expect("created account must be collected");
    assert_ne!(account.sequence, EOA_SEQUENCE);
}

#[test]
fn gas_estimation_brackets_the_recorded_consumption() {
    let vm = ScriptedVm(|_: &mut dyn Host, msg: &Message, _: &[u8]| {
        ExecResult::success(msg.gas - 12_345)
    });
    let evm = Evm::new(world(), &vm);
    let mut env = tx(CONTRACT, 100_000);
    env.estimate_gas = true;
    let outcome = evm.transact(env);
    assert!(outcome.result.is_success());
    let estimate = outcome.gas_estimate.expect("estimation was requested");
    // consumption + intrinsic + the storage-write margin, within the
    // search threshold
    let floor = 12_345 + 21_000 + 5_000;
    assert!(estimate >= floor, "estimate {estimate} below {floor}");
    assert!(estimate <= floor + 50, "estimate {estimate} above margin");
}

#[test]
fn executor_overrides_take_precedence_for_their_address() {
    struct Overrides {
        aot: ScriptedVm<fn(&mut dyn Host, &Message, &[u8]) -> ExecResult>,
    }
    impl seqevm::ExecutorOverrides for Overrides {
        fn executor_for(&self, code_address: &Address) -> Option<&dyn Interpreter> {
            (*code_address == CONTRACT).then_some(&self.aot as &dyn Interpreter)
        }
    }
    fn aot_result(_: &mut dyn Host, msg: &Message, _: &[u8]) -> ExecResult {
        ExecResult::success_with_output(msg.gas, Bytes::from_static(b"aot"))
    }
    let overrides = Overrides {
        aot: ScriptedVm(aot_result as fn(&mut dyn Host, &Message, &[u8]) -> ExecResult),
    };
    let vm = ScriptedVm(|_: &mut dyn Host, _: &Message, _: &[u8]| {
        panic!("default interpreter must not run")
    });
    let evm = Evm::new(world(), &vm).with_overrides(&overrides);
    let outcome = evm.transact(tx(CONTRACT, 100_000));
    assert!(outcome.result.is_success());
    assert_eq!(outcome.result.output.as_ref(), b"aot");
}

#[test]
fn unknown_reserved_ids_are_forwarded_to_the_injected_capability() {
    struct Staking;
    impl ExternalPrecompiles for Staking {
        fn run(&self, address: &Address, input: &[u8], _gas_limit: i64) -> PrecompileResult {
            assert_eq!(
                *address,
                address!("0x0000000000000000000000000000000000002710")
            );
            assert_eq!(input, b"stake");
            Ok(PrecompileOutput::new(100, Bytes::from_static(b"staked")))
        }
    }
    let vm = ScriptedVm(|_: &mut dyn Host, msg: &Message, _: &[u8]| ExecResult::success(msg.gas));
    let staking = Staking;
    let evm = Evm::new(world(), &vm).with_external_precompiles(&staking);
    let mut env = tx(address!("0x0000000000000000000000000000000000002710"), 100_000);
    env.data = Bytes::from_static(b"stake");
    let outcome = evm.transact(env);
    assert!(outcome.result.is_success());
    assert_eq!(outcome.result.output.as_ref(), b"staked");
    // intrinsic data gas: five non-zero bytes
    assert_eq!(
        outcome.result.gas_left,
        100_000 - 21_000 - 5 * 16 - 100
    );
}

#[test]
fn block_context_is_visible_to_the_interpreter() {
    let vm = ScriptedVm(|host: &mut dyn Host, msg: &Message, _: &[u8]| {
        assert_eq!(host.env().block.number, 42);
        assert_eq!(host.env().block.chain_id, U256::from(10001));
        assert_eq!(host.env().tx.caller, ALICE);
        ExecResult::success(msg.gas)
    });
    let evm = Evm::new(world(), &vm).with_block(BlockEnv {
        coinbase: BOB,
        number: 42,
        timestamp: 1_700_000_000,
        gas_limit: 30_000_000,
        difficulty: U256::from(1),
        chain_id: U256::from(10001),
    });
    let outcome = evm.transact(tx(CONTRACT, 100_000));
    assert!(outcome.result.is_success());
}
