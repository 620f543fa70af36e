//! Unreachable-code elimination.
//!
//! Runs at `-O2` and above. For each function, builds the control-flow
//! graph of its body and drops every instruction belonging to a block that
//! cannot be reached from the function entry (code after an unconditional
//! `return`, for example). Function markers always survive.

use crate::ir::cfg::ControlFlowGraph;
use crate::ir::ir::{IrListing, OpCode};

/// Run unreachable-code elimination over the listing.
/// Returns the number of instructions removed.
pub fn run(listing: &mut IrListing) -> usize {
    let mut result = IrListing::with_capacity(listing.len());
    let mut removed = 0;
    let mut i = 0;

    while i < listing.len() {
        if listing[i].op != OpCode::FunctionBegin {
            result.push(listing[i].clone());
            i += 1;
            continue;
        }
        let end = listing[i..]
            .iter()
            .position(|inst| inst.op == OpCode::FunctionEnd)
            .map(|off| i + off)
            .unwrap_or(listing.len() - 1);

        removed += sweep_function(&listing[i..=end], &mut result);
        i = end + 1;
    }

    *listing = result;
    removed
}

/// Append the reachable part of one function body to `out`.
fn sweep_function(body: &[crate::ir::ir::Instruction], out: &mut IrListing) -> usize {
    let cfg = ControlFlowGraph::build(body);
    let reachable = cfg.reachable_from_entry();
    let mut removed = 0;

    for block in &cfg.blocks {
        if block.id == cfg.exit {
            continue;
        }
        if reachable[block.id] {
            out.extend(block.instructions.iter().cloned());
            continue;
        }
        for inst in &block.instructions {
            // The function markers delimit codegen's frames; they are kept
            // even when their block is unreachable.
            if matches!(inst.op, OpCode::FunctionBegin | OpCode::FunctionEnd) {
                out.push(inst.clone());
            } else {
                removed += 1;
            }
        }
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::ir::gen::IrGenerator;

    fn lower(source: &str) -> IrListing {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        assert!(parser.diagnostics.is_empty());
        IrGenerator::new().generate(&program)
    }

    #[test]
    fn test_code_after_return_is_removed() {
        let mut listing = lower("int main(void) { int x; return 0; x = 1; return x; }");
        let before = listing.len();
        let removed = run(&mut listing);
        assert!(removed > 0);
        assert_eq!(listing.len(), before - removed);
        // The trailing assignment is gone; the first return survives.
        assert!(!listing
            .iter()
            .any(|i| i.op == OpCode::Assign && i.result.as_name() == Some("x")));
        assert!(listing.iter().any(|i| i.op == OpCode::Return));
    }

    #[test]
    fn test_function_markers_always_survive() {
        let mut listing = lower("int main(void) { return 0; }");
        run(&mut listing);
        assert!(listing.iter().any(|i| i.op == OpCode::FunctionBegin));
        assert!(listing.iter().any(|i| i.op == OpCode::FunctionEnd));
    }

    #[test]
    fn test_reachable_loop_is_untouched() {
        let mut listing =
            lower("int main(void) { int x; x = 10; while (x > 0) { x = x - 1; } return x; }");
        let before = listing.clone();
        assert_eq!(run(&mut listing), 0);
        assert_eq!(listing, before);
    }

    #[test]
    fn test_every_function_is_swept_independently() {
        let mut listing = lower(
            "int f(void) { return 1; } int main(void) { return f(); x(); }",
        );
        // The call after main's return is unreachable; f's body is not.
        run(&mut listing);
        assert!(listing.iter().any(
            |i| i.op == OpCode::FunctionBegin && i.result.as_name() == Some("f")
        ));
        let returns = listing.iter().filter(|i| i.op == OpCode::Return).count();
        assert_eq!(returns, 2);
    }
}
