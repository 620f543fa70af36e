//! Copy propagation pass.
//!
//! When `ASSIGN`/`COPY` moves one variable into another, later reads of the
//! destination are rewritten to read the source directly. A mapping dies
//! when either its destination or its source is redefined, and the whole
//! map is dropped at labels and function boundaries.

use crate::ir::ir::{IrListing, OpCode, Operand};
use rustc_hash::FxHashMap;

/// Run copy propagation over the listing.
/// Returns the number of operands rewritten.
pub fn run(listing: &mut IrListing) -> usize {
    let mut rewritten = 0;
    let mut copies: FxHashMap<String, String> = FxHashMap::default();

    for inst in listing.iter_mut() {
        if matches!(
            inst.op,
            OpCode::Label | OpCode::FunctionBegin | OpCode::FunctionEnd
        ) {
            copies.clear();
            continue;
        }

        if inst.op != OpCode::Call {
            rewritten += substitute(&mut inst.arg1, &copies);
        }
        rewritten += substitute(&mut inst.arg2, &copies);

        if let Some(defined) = inst.defined_name() {
            let defined = defined.to_string();
            copies.retain(|dest, src| *dest != defined && *src != defined);
            if matches!(inst.op, OpCode::Assign | OpCode::Copy) {
                if let Some(src) = inst.arg1.as_name() {
                    if src != defined {
                        copies.insert(defined, src.to_string());
                    }
                }
            }
        }
    }

    rewritten
}

fn substitute(operand: &mut Operand, copies: &FxHashMap<String, String>) -> usize {
    if let Some(name) = operand.as_name() {
        if let Some(src) = copies.get(name) {
            *operand = Operand::Name(src.clone());
            return 1;
        }
    }
    0
}
