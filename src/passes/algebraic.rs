//! Algebraic simplification pass.
//!
//! Local identity rewrites: `x+0`, `x-0`, `x*1`, and `x/1` become a `COPY`
//! of `x`; `x*0` becomes `ASSIGN 0`.

use crate::ir::ir::{Instruction, IrListing, OpCode, Operand};

/// Run algebraic simplification over the listing.
/// Returns the number of instructions rewritten.
pub fn run(listing: &mut IrListing) -> usize {
    let mut simplified = 0;
    for inst in listing.iter_mut() {
        if simplify(inst) {
            simplified += 1;
        }
    }
    simplified
}

fn simplify(inst: &mut Instruction) -> bool {
    match (inst.op, inst.arg2.as_literal()) {
        (OpCode::Add, Some(0)) | (OpCode::Sub, Some(0)) => {
            inst.op = OpCode::Copy;
            inst.arg2 = Operand::None;
            true
        }
        (OpCode::Mul, Some(1)) | (OpCode::Div, Some(1)) => {
            inst.op = OpCode::Copy;
            inst.arg2 = Operand::None;
            true
        }
        (OpCode::Mul, Some(0)) => {
            inst.op = OpCode::Assign;
            inst.arg1 = Operand::Literal(0);
            inst.arg2 = Operand::None;
            true
        }
        _ => false,
    }
}
