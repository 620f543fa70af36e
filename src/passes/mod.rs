//! IR optimization passes.
//!
//! The four classical passes run in a fixed order — constant folding, copy
//! propagation, algebraic simplification, dead-code elimination — each over
//! the listing in place. Passes may delete instructions but never reorder
//! them, so side-effecting operations keep their source order. At `-O2` a
//! CFG-based unreachable-code sweep joins the sequence; `-O3` adds nothing
//! further.
//!
//! One pass can expose work for an earlier one (an algebraic rewrite
//! produces a foldable copy, an unreachable sweep orphans a definition), so
//! the sequence repeats until the listing stops changing. The optimizer is
//! therefore idempotent: running it on its own output is a no-op. A single
//! round suffices for almost all inputs.

pub mod algebraic;
pub mod constant_fold;
pub mod copy_prop;
pub mod dce;
pub mod unreachable;

use crate::ir::ir::IrListing;

/// Run the optimization pipeline for the given `-O` level.
pub fn run_passes(listing: &mut IrListing, opt_level: u32) {
    if opt_level == 0 {
        return;
    }
    loop {
        let before = listing.clone();
        constant_fold::run(listing);
        copy_prop::run(listing);
        algebraic::run(listing);
        dce::run(listing);
        if opt_level >= 2 {
            unreachable::run(listing);
        }
        if *listing == before {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::ir::gen::IrGenerator;
    use crate::ir::ir::listing_to_string;

    fn lower(source: &str) -> IrListing {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        assert!(parser.diagnostics.is_empty());
        IrGenerator::new().generate(&program)
    }

    #[test]
    fn test_opt_level_zero_is_identity() {
        let mut listing = lower("int main(void) { int x; x = 1 + 2; return x; }");
        let before = listing.clone();
        run_passes(&mut listing, 0);
        assert_eq!(listing, before);
    }

    #[test]
    fn test_pipeline_reaches_fixed_point_across_passes() {
        // a*1 becomes a copy only in the algebraic pass; the repeat then
        // lets copy propagation and DCE finish the job.
        let mut listing = lower(
            "int f(int a) { int t; t = a * 1; return t; } int main(void) { return f(3); }",
        );
        run_passes(&mut listing, 1);
        let text = listing_to_string(&listing);
        assert!(!text.contains("MUL"));
        assert!(text.contains("RETURN, a"));
        let once = listing.clone();
        run_passes(&mut listing, 1);
        assert_eq!(listing, once);
    }
}
