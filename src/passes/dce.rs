//! Dead-code elimination pass.
//!
//! Computes the set of names read anywhere in the listing and removes
//! instructions that define a name outside that set. Labels, branches,
//! calls, returns, and function markers are live by fiat. Removing an
//! instruction can orphan the definitions feeding it, so the pass iterates
//! until no further removal happens; the result is a fixed point and
//! rerunning the pass is a no-op.

use crate::ir::ir::{Instruction, IrListing, OpCode};
use rustc_hash::FxHashSet;

/// Run dead-code elimination over the listing.
/// Returns the number of instructions removed.
pub fn run(listing: &mut IrListing) -> usize {
    let mut total = 0;
    loop {
        let removed = run_once(listing);
        if removed == 0 {
            break;
        }
        total += removed;
    }
    total
}

fn run_once(listing: &mut IrListing) -> usize {
    let used: FxHashSet<String> = listing
        .iter()
        .flat_map(|inst| inst.used_names().map(str::to_string))
        .collect();

    let before = listing.len();
    listing.retain(|inst| !is_dead(inst, &used));
    before - listing.len()
}

fn is_dead(inst: &Instruction, used: &FxHashSet<String>) -> bool {
    if inst.is_label()
        || inst.is_branch()
        || inst.is_call()
        || matches!(
            inst.op,
            OpCode::Return | OpCode::FunctionBegin | OpCode::FunctionEnd
        )
    {
        return false;
    }
    match inst.defined_name() {
        Some(defined) => !used.contains(defined),
        None => false,
    }
}
