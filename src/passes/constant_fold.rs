//! Constant folding optimization pass.
//!
//! Tracks variables assigned a literal value and substitutes them into
//! later operands; any binary arithmetic, comparison, or logical
//! instruction whose operands are both literal after substitution is
//! computed at compile time and rewritten to `ASSIGN result, literal`.
//! Known constants are forgotten at labels and function boundaries (a join
//! point may be reached with other values) and when the variable is
//! redefined with a non-literal. Division or modulo by a literal zero
//! leaves the instruction unchanged.

use crate::ir::ir::{Instruction, IrListing, OpCode, Operand};
use rustc_hash::FxHashMap;

/// Run constant folding over the listing.
/// Returns the number of instructions folded.
pub fn run(listing: &mut IrListing) -> usize {
    let mut folded = 0;
    let mut constants: FxHashMap<String, i64> = FxHashMap::default();

    for inst in listing.iter_mut() {
        if matches!(
            inst.op,
            OpCode::Label | OpCode::FunctionBegin | OpCode::FunctionEnd
        ) {
            constants.clear();
            continue;
        }

        // CALL's first argument is the callee name, not a variable read.
        if inst.op != OpCode::Call {
            substitute(&mut inst.arg1, &constants);
        }
        substitute(&mut inst.arg2, &constants);

        if let Some(value) = try_fold(inst) {
            inst.op = OpCode::Assign;
            inst.arg1 = Operand::Literal(value);
            inst.arg2 = Operand::None;
            folded += 1;
        }

        match (inst.op, inst.arg1.as_literal()) {
            (OpCode::Assign, Some(value)) => {
                if let Some(name) = inst.result.as_name() {
                    constants.insert(name.to_string(), value);
                }
            }
            _ => {
                if let Some(defined) = inst.defined_name() {
                    constants.remove(defined);
                }
            }
        }
    }

    folded
}

fn substitute(operand: &mut Operand, constants: &FxHashMap<String, i64>) {
    if let Some(name) = operand.as_name() {
        if let Some(&value) = constants.get(name) {
            *operand = Operand::Literal(value);
        }
    }
}

/// Evaluate a binary instruction whose operands are both literal.
fn try_fold(inst: &Instruction) -> Option<i64> {
    let lhs = inst.arg1.as_literal()?;
    let rhs = inst.arg2.as_literal()?;
    let value = match inst.op {
        OpCode::Add => lhs.wrapping_add(rhs),
        OpCode::Sub => lhs.wrapping_sub(rhs),
        OpCode::Mul => lhs.wrapping_mul(rhs),
        OpCode::Div => lhs.checked_div(rhs)?,
        OpCode::Mod => lhs.checked_rem(rhs)?,
        OpCode::Eq => (lhs == rhs) as i64,
        OpCode::Ne => (lhs != rhs) as i64,
        OpCode::Lt => (lhs < rhs) as i64,
        OpCode::Le => (lhs <= rhs) as i64,
        OpCode::Gt => (lhs > rhs) as i64,
        OpCode::Ge => (lhs >= rhs) as i64,
        OpCode::And => (lhs != 0 && rhs != 0) as i64,
        OpCode::Or => (lhs != 0 || rhs != 0) as i64,
        _ => return None,
    };
    Some(value)
}
