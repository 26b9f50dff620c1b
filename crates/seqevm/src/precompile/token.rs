//! The native-asset token precompile.
//!
//! Presents the chain's native asset through the ERC-20 interface:
//! name/symbol/decimals/totalSupply plus balance, allowance and transfer
//! operations. Balances are the real account balances; allowances live in
//! the storage map under the reserved token sequence, keyed by
//! sha256(owner-word ‖ spender-word), each entry carrying the amount and
//! both addresses. Approval and Transfer events use the canonical ERC-20
//! topic hashes.

use super::{precompile_id, selector, TOKEN_ID};
use crate::{
    db::WorldState,
    host::{transfer_on_call, CallFrame, Host},
    interpreter::{ExecResult, StatusCode},
};
use primitives::{b256, Address, Bytes, Log, LogData, B256, TOKEN_SEQUENCE, U256};
use sha2::{Digest, Sha256};

/// Topic hash of `Approval(address,address,uint256)`.
pub const APPROVAL_EVENT_TOPIC: B256 =
    b256!("0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925");
/// Topic hash of `Transfer(address,address,uint256)`.
pub const TRANSFER_EVENT_TOPIC: B256 =
    b256!("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

const TOKEN_NAME: &str = "SEQ";
const TOKEN_SYMBOL: &str = "SEQ";
const TOKEN_DECIMALS: u64 = 18;

/// 21 million whole tokens, in base units.
fn total_supply() -> U256 {
    U256::from(21_000_000u64) * U256::from(10u64).pow(U256::from(TOKEN_DECIMALS))
}

const SELECTOR_NAME: u32 = 0x06fdde03;
const SELECTOR_SYMBOL: u32 = 0x95d89b41;
const SELECTOR_DECIMALS: u32 = 0x313ce567;
const SELECTOR_TOTAL_SUPPLY: u32 = 0x18160ddd;
const SELECTOR_BALANCE_OF: u32 = 0x70a08231;
const SELECTOR_ALLOWANCE: u32 = 0xdd62ed3e;
const SELECTOR_APPROVE: u32 = 0x095ea7b3;
const SELECTOR_INCREASE_ALLOWANCE: u32 = 0x39509351;
const SELECTOR_DECREASE_ALLOWANCE: u32 = 0xa457c2d7;
const SELECTOR_TRANSFER: u32 = 0xa9059cbb;
const SELECTOR_TRANSFER_FROM: u32 = 0x23b872dd;

const NAME_GAS: i64 = 3000;
const SYMBOL_GAS: i64 = 3000;
const DECIMALS_GAS: i64 = 1000;
const TOTAL_SUPPLY_GAS: i64 = 1000;
const BALANCE_OF_GAS: i64 = 20000;
const ALLOWANCE_GAS: i64 = 20000;
const APPROVE_GAS: i64 = 25000;
const INCREASE_ALLOWANCE_GAS: i64 = 31000;
const DECREASE_ALLOWANCE_GAS: i64 = 31000;
const TRANSFER_GAS: i64 = 32000;
const TRANSFER_FROM_GAS: i64 = 40000;

/// Allowance entry layout: 32-byte amount, 20-byte owner, 20-byte spender.
const ALLOWANCE_ENTRY_SIZE: usize = 32 + 20 + 20;

fn allowance_key(owner: Address, spender: Address) -> B256 {
    let mut words = [0u8; 64];
    words[12..32].copy_from_slice(owner.as_slice());
    words[44..64].copy_from_slice(spender.as_slice());
    B256::from_slice(&Sha256::digest(words))
}

fn word_result(gas_left: i64, word: B256) -> ExecResult {
    ExecResult::success_with_output(gas_left, word.to_vec().into())
}

fn bool_result(gas_left: i64, value: bool) -> ExecResult {
    let mut word = B256::ZERO;
    if value {
        word[31] = 1;
    }
    word_result(gas_left, word)
}

/// ABI-encodes a short string: offset word, length word, padded bytes.
fn string_result(gas_left: i64, s: &str) -> ExecResult {
    let len = s.len().min(255);
    let mut output = vec![0u8; 64 + s.len().div_ceil(32) * 32];
    output[31] = 32;
    output[63] = len as u8;
    output[64..64 + len].copy_from_slice(&s.as_bytes()[..len]);
    ExecResult::success_with_output(gas_left, output.into())
}

fn address_at(input: &[u8], word_start: usize) -> Address {
    Address::from_slice(&input[word_start + 12..word_start + 32])
}

impl<W: WorldState> CallFrame<'_, '_, W> {
    /// Runs the native-token precompile.
    pub(crate) fn run_token(&mut self) -> ExecResult {
        // the token keeps its own storage; delegating calls are rejected
        if precompile_id(&self.msg.destination) != Some(TOKEN_ID) {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        if self.msg.input.len() < 4 {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let sel = selector(&self.msg.input);
        let gas = match sel {
            SELECTOR_NAME => NAME_GAS,
            SELECTOR_SYMBOL => SYMBOL_GAS,
            SELECTOR_DECIMALS => DECIMALS_GAS,
            SELECTOR_TOTAL_SUPPLY => TOTAL_SUPPLY_GAS,
            SELECTOR_BALANCE_OF => BALANCE_OF_GAS,
            SELECTOR_ALLOWANCE => ALLOWANCE_GAS,
            SELECTOR_APPROVE => APPROVE_GAS,
            SELECTOR_INCREASE_ALLOWANCE => INCREASE_ALLOWANCE_GAS,
            SELECTOR_DECREASE_ALLOWANCE => DECREASE_ALLOWANCE_GAS,
            SELECTOR_TRANSFER => TRANSFER_GAS,
            SELECTOR_TRANSFER_FROM => TRANSFER_FROM_GAS,
            _ => return ExecResult::from_status(StatusCode::PrecompileFailure),
        };
        if gas > self.msg.gas {
            return ExecResult::from_status(StatusCode::OutOfGas);
        }
        self.msg.gas -= gas;
        if self.msg.is_static {
            let mutating = matches!(
                sel,
                SELECTOR_APPROVE
                    | SELECTOR_INCREASE_ALLOWANCE
                    | SELECTOR_DECREASE_ALLOWANCE
                    | SELECTOR_TRANSFER
                    | SELECTOR_TRANSFER_FROM
            );
            if mutating {
                return ExecResult::from_status(StatusCode::PrecompileFailure);
            }
        }
        match sel {
            SELECTOR_NAME => string_result(self.msg.gas, TOKEN_NAME),
            SELECTOR_SYMBOL => string_result(self.msg.gas, TOKEN_SYMBOL),
            SELECTOR_DECIMALS => {
                word_result(self.msg.gas, B256::from(U256::from(TOKEN_DECIMALS)))
            }
            SELECTOR_TOTAL_SUPPLY => word_result(self.msg.gas, B256::from(total_supply())),
            SELECTOR_BALANCE_OF => self.token_balance_of(),
            SELECTOR_ALLOWANCE => self.token_allowance(),
            SELECTOR_APPROVE => self.token_approve(true, false),
            SELECTOR_INCREASE_ALLOWANCE => self.token_approve(false, true),
            SELECTOR_DECREASE_ALLOWANCE => self.token_approve(false, false),
            SELECTOR_TRANSFER => self.token_transfer(),
            SELECTOR_TRANSFER_FROM => self.token_transfer_from(),
            _ => unreachable!("selector validated above"),
        }
    }

    fn allowance_entry(&mut self, key: B256) -> [u8; ALLOWANCE_ENTRY_SIZE] {
        let mut entry = [0u8; ALLOWANCE_ENTRY_SIZE];
        let value = self.ctrl.get_value(TOKEN_SEQUENCE, key);
        if !value.is_empty() {
            assert!(
                value.len() >= ALLOWANCE_ENTRY_SIZE,
                "allowance entry shorter than its layout"
            );
            entry.copy_from_slice(&value[..ALLOWANCE_ENTRY_SIZE]);
        }
        entry
    }

    fn store_allowance_entry(&mut self, key: B256, entry: &[u8; ALLOWANCE_ENTRY_SIZE]) {
        // a zero amount deletes the entry
        if entry[..32].iter().all(|b| *b == 0) {
            self.ctrl.set_value(TOKEN_SEQUENCE, key, &[]);
        } else {
            self.ctrl.set_value(TOKEN_SEQUENCE, key, entry);
        }
    }

    fn emit_token_log(&mut self, topic: B256, from: Address, to: Address, data: Bytes) {
        let log = Log {
            address: self.msg.destination,
            data: LogData::new_unchecked(vec![topic, from.into_word(), to.into_word()], data),
        };
        self.ctrl.add_log(log);
    }

    fn token_balance_of(&mut self) -> ExecResult {
        if self.msg.input.len() != 4 + 32 {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let owner = address_at(&self.msg.input, 4);
        let balance = self.get_balance(owner);
        word_result(self.msg.gas, B256::from(balance))
    }

    fn token_allowance(&mut self) -> ExecResult {
        if self.msg.input.len() != 4 + 64 {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let owner = address_at(&self.msg.input, 4);
        let spender = address_at(&self.msg.input, 36);
        let entry = self.allowance_entry(allowance_key(owner, spender));
        word_result(self.msg.gas, B256::from_slice(&entry[..32]))
    }

    fn token_approve(&mut self, new_value: bool, increase: bool) -> ExecResult {
        if self.msg.input.len() != 4 + 64 {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let owner = self.msg.sender;
        let spender = address_at(&self.msg.input, 36);
        let key = allowance_key(owner, spender);
        let mut amount = U256::from_be_slice(&self.msg.input[36..68]);
        if !new_value {
            let entry = self.allowance_entry(key);
            let current = U256::from_be_slice(&entry[..32]);
            amount = if increase {
                current.checked_add(amount).unwrap_or(U256::MAX)
            } else {
                current.saturating_sub(amount)
            };
        }
        let mut entry = [0u8; ALLOWANCE_ENTRY_SIZE];
        entry[..32].copy_from_slice(&amount.to_be_bytes::<32>());
        entry[32..52].copy_from_slice(owner.as_slice());
        entry[52..72].copy_from_slice(spender.as_slice());
        self.store_allowance_entry(key, &entry);
        let data = Bytes::copy_from_slice(&amount.to_be_bytes::<32>());
        self.emit_token_log(APPROVAL_EVENT_TOPIC, owner, spender, data);
        bool_result(self.msg.gas, true)
    }

    fn token_transfer(&mut self) -> ExecResult {
        if self.msg.input.len() != 4 + 64 {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let sender = self.msg.sender;
        let to = address_at(&self.msg.input, 4);
        let amount = U256::from_be_slice(&self.msg.input[36..68]);
        if self.get_balance(sender) < amount {
            return ExecResult::from_status(StatusCode::InsufficientBalance);
        }
        let moved = !transfer_on_call(self.ctrl, sender, to, amount);
        if moved {
            let data = Bytes::copy_from_slice(&amount.to_be_bytes::<32>());
            self.emit_token_log(TRANSFER_EVENT_TOPIC, sender, to, data);
        }
        bool_result(self.msg.gas, true)
    }

    fn token_transfer_from(&mut self) -> ExecResult {
        if self.msg.input.len() != 4 + 96 {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let from = address_at(&self.msg.input, 4);
        let to = address_at(&self.msg.input, 36);
        let amount = U256::from_be_slice(&self.msg.input[68..100]);
        if self.get_balance(from) < amount {
            return ExecResult::from_status(StatusCode::InsufficientBalance);
        }
        let key = allowance_key(from, self.msg.sender);
        let mut entry = self.allowance_entry(key);
        let allowance = U256::from_be_slice(&entry[..32]);
        if allowance < amount {
            return ExecResult::from_status(StatusCode::PrecompileFailure);
        }
        let moved = !transfer_on_call(self.ctrl, from, to, amount);
        if moved {
            let data = Bytes::copy_from_slice(&amount.to_be_bytes::<32>());
            self.emit_token_log(TRANSFER_EVENT_TOPIC, from, to, data);
            let remaining = allowance - amount;
            entry[..32].copy_from_slice(&remaining.to_be_bytes::<32>());
            self.store_allowance_entry(key, &entry);
        }
        bool_result(self.msg.gas, true)
    }
}
