//! Transaction entry point.

use crate::{
    controller::TxControl,
    db::WorldState,
    env::{BlockEnv, CfgEnv, Env, TxEnv},
    gas::{intrinsic_gas, ESTIMATE_STORAGE_MARGIN},
    host::{CallFrame, Host},
    interpreter::{CallKind, ExecResult, ExecutorOverrides, Interpreter, Message, StatusCode},
    precompile::ExternalPrecompiles,
    result::ResultAndState,
};
use primitives::{Address, B256};

/// The execution engine for one chain: a world state, an interpreter and the
/// static configuration. One transaction at a time runs through
/// [`Evm::transact`]; the engine itself keeps no per-transaction state.
pub struct Evm<'a, W> {
    /// Engine configuration.
    pub cfg: CfgEnv,
    /// Block this engine currently executes in.
    pub block: BlockEnv,
    /// The durable ledger.
    pub world: W,
    interpreter: &'a dyn Interpreter,
    overrides: Option<&'a dyn ExecutorOverrides>,
    external_precompiles: Option<&'a dyn ExternalPrecompiles>,
}

impl<W> core::fmt::Debug for Evm<'_, W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Evm")
            .field("cfg", &self.cfg)
            .field("block", &self.block)
            .finish_non_exhaustive()
    }
}

impl<'a, W: WorldState> Evm<'a, W> {
    /// Creates an engine over `world` driving `interpreter`.
    pub fn new(world: W, interpreter: &'a dyn Interpreter) -> Self {
        Self {
            cfg: CfgEnv::default(),
            block: BlockEnv::default(),
            world,
            interpreter,
            overrides: None,
            external_precompiles: None,
        }
    }

    /// Sets the block environment.
    pub fn with_block(mut self, block: BlockEnv) -> Self {
        self.block = block;
        self
    }

    /// Sets the engine configuration.
    pub fn with_cfg(mut self, cfg: CfgEnv) -> Self {
        self.cfg = cfg;
        self
    }

    /// Registers per-address executor substitutions.
    pub fn with_overrides(mut self, overrides: &'a dyn ExecutorOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Injects the capability serving reserved precompile ids the engine has
    /// no native implementation for.
    pub fn with_external_precompiles(mut self, precompiles: &'a dyn ExternalPrecompiles) -> Self {
        self.external_precompiles = Some(precompiles);
        self
    }

    /// Runs one transaction and returns its result together with the
    /// collected state changes.
    ///
    /// Insufficient intrinsic gas and insufficient sender balance reject the
    /// transaction before any state mutation; the result then carries an
    /// empty change-set.
    pub fn transact(&self, tx: TxEnv) -> ResultAndState {
        let mut is_create = tx.destination == Address::ZERO;
        let mut intrinsic = intrinsic_gas(&tx.data, is_create);
        if is_create && intrinsic > tx.gas_limit {
            // a plain send to the zero address is still allowed when only
            // the creation surcharge does not fit
            let no_create = intrinsic_gas(&tx.data, false);
            if no_create <= tx.gas_limit {
                intrinsic = no_create;
                is_create = false;
            }
        }
        if intrinsic > tx.gas_limit {
            return ResultAndState {
                result: ExecResult::from_status(StatusCode::OutOfGas),
                ..Default::default()
            };
        }
        let gas = tx.gas_limit - intrinsic;

        let estimate_requested = tx.estimate_gas;
        let msg = Message {
            kind: if is_create {
                CallKind::Create
            } else {
                CallKind::Call
            },
            is_static: false,
            depth: 0,
            gas,
            destination: tx.destination,
            sender: tx.caller,
            input: tx.data.clone(),
            value: tx.value,
            create2_salt: B256::ZERO,
        };
        let env = Env {
            cfg: self.cfg.clone(),
            block: self.block.clone(),
            tx,
        };
        let mut ctrl = TxControl::new(
            &self.world,
            env,
            self.interpreter,
            self.overrides,
            self.external_precompiles,
        );
        let mut frame = CallFrame::new(&mut ctrl, msg.clone());
        if frame.get_balance(msg.sender) < msg.value {
            drop(frame);
            let result = ExecResult {
                status: StatusCode::InsufficientBalance,
                gas_left: msg.gas,
                ..Default::default()
            };
            return ResultAndState {
                result,
                state: ctrl.into_changes(),
                gas_estimate: None,
            };
        }
        let result = frame.call(msg);
        drop(frame);

        let gas_estimate = if estimate_requested {
            if result.is_success() {
                let estimate = ctrl.estimate_gas(gas);
                Some(if estimate > 0 {
                    estimate + intrinsic + ESTIMATE_STORAGE_MARGIN
                } else {
                    estimate
                })
            } else {
                Some(0)
            }
        } else {
            None
        };
        ResultAndState {
            result,
            state: ctrl.into_changes(),
            gas_estimate,
        }
    }
}
