//! Gas estimation from a recorded execution trace.
//!
//! During an estimation run the controller records a flat gas trace: a
//! tagged entry per nested call carrying the gas granted to it, and an
//! untagged entry per return carrying the gas left. The trace is a pre-order
//! encoding of the call tree. Estimation reconstructs each frame's own
//! consumption from the trace and then binary-searches for the smallest
//! initial gas limit that replays the tree without going negative, honoring
//! the rule that a caller keeps 1/64th of its remaining gas when entering a
//! nested call.

/// Sign bit used to tag "entering a nested call" entries in the gas trace.
const CALL_FLAG: u64 = 1 << 63;

/// Returned when the trace is malformed or a search step is internally
/// inconsistent. Callers must treat it as "unable to estimate", not as gas.
pub const ESTIMATE_FAILED: i64 = -100;

/// Marks a nested-call entry in the reconstructed consumption list.
const CALL_MARK: i64 = -1;

/// Width of the final search interval; doubles as the safety margin.
const THRESHOLD: i64 = 50;

/// Tags a gas amount as "granted to a nested call".
#[inline]
pub(crate) fn tag_call(gas: i64) -> i64 {
    (gas as u64 | CALL_FLAG) as i64
}

/// Recursively converts the flat trace into per-frame consumption: a
/// [`CALL_MARK`] per nested call followed by its sub-trace, then the frame's
/// own cost (gas granted minus children's consumption minus gas returned).
/// Returns the total gas the frame consumed, or `None` on a truncated trace.
fn fill_consumed(
    consumed: &mut Vec<i64>,
    trace: &[i64],
    cursor: &mut usize,
    gas_given: i64,
) -> Option<i64> {
    let mut used_by_subcalls = 0i64;
    loop {
        let raw = *trace.get(*cursor)?;
        *cursor += 1;
        let is_call = raw as u64 & CALL_FLAG != 0;
        let value = (raw as u64 & !CALL_FLAG) as i64;
        if is_call {
            consumed.push(CALL_MARK);
            used_by_subcalls += fill_consumed(consumed, trace, cursor, value)?;
        } else {
            // value is the gas left when this frame returned
            consumed.push(gas_given - used_by_subcalls - value);
            return Some(gas_given - value);
        }
    }
}

/// Replays the consumption list with `initial_gas`, reserving 1/64th of the
/// remaining gas on every nested call. Negative means `initial_gas` was not
/// enough.
fn simulate(consumed: &[i64], cursor: &mut usize, initial_gas: i64) -> i64 {
    let mut gas_left = initial_gas;
    loop {
        let Some(&entry) = consumed.get(*cursor) else {
            return ESTIMATE_FAILED;
        };
        *cursor += 1;
        if entry == CALL_MARK {
            let reserved = gas_left / 64;
            gas_left = simulate(consumed, cursor, gas_left - reserved);
            if gas_left < 0 {
                return gas_left;
            }
            gas_left += reserved;
        } else {
            return gas_left - entry;
        }
    }
}

/// Estimates the minimal initial gas limit that lets the traced execution
/// finish, given `init_guess` (the limit the trace was recorded with, known
/// to be sufficient). Returns [`ESTIMATE_FAILED`] on a malformed trace.
pub fn estimate_gas(trace: &[i64], init_guess: i64) -> i64 {
    if trace.len() < 2 || trace[0] as u64 & CALL_FLAG == 0 {
        return ESTIMATE_FAILED;
    }
    let mut consumed = Vec::with_capacity(trace.len());
    consumed.push(CALL_MARK);
    let mut cursor = 1usize;
    let root_gas = (trace[0] as u64 & !CALL_FLAG) as i64;
    if fill_consumed(&mut consumed, trace, &mut cursor, root_gas).is_none() {
        return ESTIMATE_FAILED;
    }
    if cursor != trace.len() || consumed.len() != trace.len() {
        return ESTIMATE_FAILED;
    }

    let mut low = 0i64;
    let mut high = init_guess;
    let mut mid = init_guess / 2;
    while high - low > THRESHOLD {
        let mut cursor = 1usize;
        let gas_left = simulate(&consumed, &mut cursor, mid);
        if gas_left < 0 {
            low = mid;
        } else if gas_left < THRESHOLD {
            return mid;
        } else {
            high = mid;
        }
        mid = (low + high) / 2;
    }
    if high > mid + THRESHOLD {
        high
    } else {
        mid + THRESHOLD
    }
}
