//! Basic-block partitioning and control-flow graph construction.
//!
//! Blocks are stored in a flat array and edges are index lists, so the
//! predecessor back-references need no shared ownership. Leaders are the
//! first instruction, every `LABEL`, and every instruction following a
//! branch, `RETURN`, or `FUNCTION_END`. A synthetic exit block collects
//! the `RETURN` edges and the final fall-through.

use crate::ir::ir::{Instruction, OpCode};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

#[derive(Debug)]
pub struct BasicBlock {
    pub id: usize,
    /// Label of the leading instruction, when the block starts with one.
    pub label: Option<String>,
    pub instructions: Vec<Instruction>,
    pub predecessors: Vec<usize>,
    pub successors: Vec<usize>,
}

impl BasicBlock {
    fn new(id: usize) -> Self {
        Self {
            id,
            label: None,
            instructions: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }

    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }
}

#[derive(Debug)]
pub struct ControlFlowGraph {
    pub blocks: Vec<BasicBlock>,
    pub entry: usize,
    /// Synthetic sink; it owns no instructions.
    pub exit: usize,
    label_to_block: FxHashMap<String, usize>,
}

impl ControlFlowGraph {
    /// Partition a listing into basic blocks and resolve the edges.
    pub fn build(instructions: &[Instruction]) -> Self {
        let mut cfg = Self {
            blocks: Vec::new(),
            entry: 0,
            exit: 0,
            label_to_block: FxHashMap::default(),
        };
        if instructions.is_empty() {
            // Degenerate graph: the entry is the synthetic exit.
            cfg.blocks.push(BasicBlock::new(0));
            return cfg;
        }

        cfg.identify_blocks(instructions);

        // Synthetic exit block.
        let exit = cfg.blocks.len();
        cfg.blocks.push(BasicBlock::new(exit));
        cfg.exit = exit;

        cfg.connect_blocks();
        cfg
    }

    fn identify_blocks(&mut self, instructions: &[Instruction]) {
        let mut leaders = vec![false; instructions.len()];
        leaders[0] = true;
        for (i, inst) in instructions.iter().enumerate() {
            if inst.is_label() {
                leaders[i] = true;
            }
            let ends_block =
                inst.is_branch() || matches!(inst.op, OpCode::Return | OpCode::FunctionEnd);
            if ends_block && i + 1 < instructions.len() {
                leaders[i + 1] = true;
            }
        }

        for (i, inst) in instructions.iter().enumerate() {
            if leaders[i] {
                let id = self.blocks.len();
                let mut block = BasicBlock::new(id);
                if let (OpCode::Label, Some(name)) = (inst.op, inst.label_name()) {
                    block.label = Some(name.to_string());
                    self.label_to_block.insert(name.to_string(), id);
                }
                self.blocks.push(block);
            }
            self.blocks
                .last_mut()
                .expect("leader at index 0 guarantees a block")
                .instructions
                .push(inst.clone());
        }
    }

    fn connect_blocks(&mut self) {
        let mut edges: Vec<(usize, usize)> = Vec::new();
        let block_count = self.blocks.len() - 1; // exit excluded
        for i in 0..block_count {
            let last = match self.blocks[i].last_instruction() {
                Some(inst) => inst,
                None => continue,
            };
            match last.op {
                OpCode::Goto => {
                    if let Some(&target) = last
                        .label_name()
                        .and_then(|l| self.label_to_block.get(l))
                    {
                        edges.push((i, target));
                    }
                }
                OpCode::IfFalse | OpCode::IfTrue => {
                    if let Some(&target) = last
                        .label_name()
                        .and_then(|l| self.label_to_block.get(l))
                    {
                        edges.push((i, target));
                    }
                    edges.push((i, self.fall_through_of(i, block_count)));
                }
                OpCode::Return => edges.push((i, self.exit)),
                _ => edges.push((i, self.fall_through_of(i, block_count))),
            }
        }
        for (from, to) in edges {
            if !self.blocks[from].successors.contains(&to) {
                self.blocks[from].successors.push(to);
            }
            if !self.blocks[to].predecessors.contains(&from) {
                self.blocks[to].predecessors.push(from);
            }
        }
    }

    fn fall_through_of(&self, block: usize, block_count: usize) -> usize {
        if block + 1 < block_count {
            block + 1
        } else {
            self.exit
        }
    }

    pub fn entry_block(&self) -> &BasicBlock {
        &self.blocks[self.entry]
    }

    pub fn exit_block(&self) -> &BasicBlock {
        &self.blocks[self.exit]
    }

    pub fn block_of_label(&self, label: &str) -> Option<usize> {
        self.label_to_block.get(label).copied()
    }

    /// Reverse postorder of a depth-first walk from the entry block.
    pub fn topological_order(&self) -> Vec<usize> {
        let mut visited = vec![false; self.blocks.len()];
        let mut postorder = Vec::with_capacity(self.blocks.len());

        fn dfs(
            node: usize,
            blocks: &[BasicBlock],
            visited: &mut Vec<bool>,
            postorder: &mut Vec<usize>,
        ) {
            visited[node] = true;
            for &succ in &blocks[node].successors {
                if !visited[succ] {
                    dfs(succ, blocks, visited, postorder);
                }
            }
            postorder.push(node);
        }

        dfs(self.entry, &self.blocks, &mut visited, &mut postorder);
        postorder.reverse();
        postorder
    }

    /// Breadth-first reachability query.
    pub fn is_reachable(&self, from: usize, to: usize) -> bool {
        if from == to {
            return true;
        }
        let mut visited = vec![false; self.blocks.len()];
        let mut queue = VecDeque::new();
        visited[from] = true;
        queue.push_back(from);
        while let Some(current) = queue.pop_front() {
            for &succ in &self.blocks[current].successors {
                if succ == to {
                    return true;
                }
                if !visited[succ] {
                    visited[succ] = true;
                    queue.push_back(succ);
                }
            }
        }
        false
    }

    /// Mark every block reachable from the entry.
    pub fn reachable_from_entry(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.blocks.len()];
        let mut queue = VecDeque::new();
        reachable[self.entry] = true;
        queue.push_back(self.entry);
        while let Some(current) = queue.pop_front() {
            for &succ in &self.blocks[current].successors {
                if !reachable[succ] {
                    reachable[succ] = true;
                    queue.push_back(succ);
                }
            }
        }
        reachable
    }

    /// Render the graph in DOT format for inspection.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph CFG {\n  node [shape=box];\n");
        for block in &self.blocks {
            dot.push_str(&format!("  {} [label=\"Block {}", block.id, block.id));
            if let Some(label) = &block.label {
                dot.push_str(&format!("\\n{label}"));
            }
            if block.id == self.exit {
                dot.push_str("\\nexit");
            }
            dot.push_str("\"];\n");
        }
        for block in &self.blocks {
            for succ in &block.successors {
                dot.push_str(&format!("  {} -> {};\n", block.id, succ));
            }
        }
        dot.push_str("}\n");
        dot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::ir::gen::IrGenerator;
    use crate::ir::ir::IrListing;

    fn lower(source: &str) -> IrListing {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        assert!(parser.diagnostics.is_empty());
        IrGenerator::new().generate(&program)
    }

    #[test]
    fn test_straight_line_program_is_two_blocks_plus_exit() {
        // FUNCTION_BEGIN..RETURN is one block; FUNCTION_END starts the next
        // (it follows a RETURN); plus the synthetic exit.
        let ir = lower("int main(void) { return 0; }");
        let cfg = ControlFlowGraph::build(&ir);
        assert_eq!(cfg.blocks.len(), 3);
        assert!(cfg.entry_block().predecessors.is_empty());
        assert!(cfg.exit_block().instructions.is_empty());
        // The returning block feeds the exit.
        assert!(cfg.blocks[0].successors.contains(&cfg.exit));
    }

    #[test]
    fn test_label_starts_a_block() {
        let ir = lower("int main(void) { int x; if (x) x = 1; return x; }");
        let cfg = ControlFlowGraph::build(&ir);
        let labeled = cfg.block_of_label("L0").unwrap();
        assert_eq!(cfg.blocks[labeled].label.as_deref(), Some("L0"));
        assert_eq!(cfg.blocks[labeled].instructions[0].op, OpCode::Label);
    }

    #[test]
    fn test_conditional_branch_has_two_successors() {
        let ir = lower("int main(void) { int x; if (x) x = 1; return x; }");
        let cfg = ControlFlowGraph::build(&ir);
        let branch_block = cfg
            .blocks
            .iter()
            .find(|b| matches!(b.last_instruction().map(|i| i.op), Some(OpCode::IfFalse)))
            .unwrap();
        assert_eq!(branch_block.successors.len(), 2);
    }

    #[test]
    fn test_while_loop_has_back_edge() {
        let ir = lower("int main(void) { int x; x = 10; while (x > 0) { x = x - 1; } return x; }");
        let cfg = ControlFlowGraph::build(&ir);
        let header = cfg.block_of_label("L0").unwrap();
        // Some block downstream of the header jumps back to it.
        let has_back_edge = cfg.blocks[header]
            .predecessors
            .iter()
            .any(|&p| p != header && cfg.is_reachable(header, p));
        assert!(has_back_edge, "loop body tail should branch back to the condition");
    }

    #[test]
    fn test_every_block_nonempty_and_edges_in_range() {
        let ir = lower(
            "int f(int n) { if (n > 0) return f(n - 1); return 0; } int main(void) { return f(3); }",
        );
        let cfg = ControlFlowGraph::build(&ir);
        for block in &cfg.blocks {
            if block.id != cfg.exit {
                assert!(!block.instructions.is_empty());
            }
            for &succ in &block.successors {
                assert!(succ < cfg.blocks.len());
            }
            for &pred in &block.predecessors {
                assert!(pred < cfg.blocks.len());
            }
        }
    }

    #[test]
    fn test_topological_order_starts_at_entry() {
        let ir = lower("int main(void) { int x; if (x) x = 1; else x = 2; return x; }");
        let cfg = ControlFlowGraph::build(&ir);
        let order = cfg.topological_order();
        assert_eq!(order[0], cfg.entry);
        // Every reachable block appears exactly once.
        let reachable = cfg.reachable_from_entry();
        let reachable_count = reachable.iter().filter(|&&r| r).count();
        assert_eq!(order.len(), reachable_count);
    }

    #[test]
    fn test_reachability_query() {
        let ir = lower("int main(void) { int x; x = 10; while (x > 0) { x = x - 1; } return x; }");
        let cfg = ControlFlowGraph::build(&ir);
        let header = cfg.block_of_label("L0").unwrap();
        let end = cfg.block_of_label("L1").unwrap();
        assert!(cfg.is_reachable(cfg.entry, header));
        assert!(cfg.is_reachable(header, end));
        assert!(!cfg.is_reachable(cfg.exit, cfg.entry));
    }

    #[test]
    fn test_dot_output_lists_blocks_and_edges() {
        let ir = lower("int main(void) { return 0; }");
        let cfg = ControlFlowGraph::build(&ir);
        let dot = cfg.to_dot();
        assert!(dot.starts_with("digraph CFG {"));
        assert!(dot.contains("Block 0"));
        assert!(dot.contains("->"));
    }
}
