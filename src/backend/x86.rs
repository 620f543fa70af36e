//! x86-64 assembly emission.
//!
//! Walks the IR listing once and produces Intel-syntax text with a
//! `_start` entry that calls `main` and exits with its return value.
//!
//! Memory model: every scalar and temporary gets a stable `[rbp - 8k]`
//! slot on first use within its function, starting at -8; the prologue
//! reserves a fixed 64 bytes. Parameters are pushed right-to-left by the
//! caller and bound to `[rbp + 16 + 8i]` at `FUNCTION_BEGIN`. Arrays live
//! in `.bss` (local ones under a function-mangled label); an array
//! parameter's slot holds the base address, and passing an array as an
//! argument pushes its address.

use crate::backend::regalloc::RegisterAllocator;
use crate::backend::runtime;
use crate::frontend::sema::ProgramInfo;
use crate::ir::ir::{Instruction, OpCode, Operand};
use rustc_hash::FxHashMap;

pub struct AsmGenerator<'a> {
    out: String,
    regs: RegisterAllocator,
    info: &'a ProgramInfo,
    /// Frame slots of the current function, assigned on first use.
    slots: FxHashMap<String, i64>,
    next_slot: i64,
    /// Parameter offsets above rbp for the current function.
    param_offsets: FxHashMap<String, i64>,
    /// Array-typed parameter names of the current function (their slot
    /// holds a base address).
    array_params: Vec<String>,
    /// Local array name -> mangled storage label, current function.
    local_array_labels: FxHashMap<String, String>,
}

impl<'a> AsmGenerator<'a> {
    pub fn new(info: &'a ProgramInfo) -> Self {
        Self {
            out: String::new(),
            regs: RegisterAllocator::new(),
            info,
            slots: FxHashMap::default(),
            next_slot: -8,
            param_offsets: FxHashMap::default(),
            array_params: Vec::new(),
            local_array_labels: FxHashMap::default(),
        }
    }

    /// Emit the whole module: header, runtime, user code, data/bss.
    pub fn generate(mut self, listing: &[Instruction]) -> String {
        self.emit_header();
        runtime::emit_runtime(&mut self.out);
        self.emit_line("");

        for inst in listing {
            self.emit_comment(&format!("IR: {inst}"));
            self.emit_instruction(inst);
        }

        self.emit_footer();
        self.out
    }

    // === Output helpers ===

    fn emit_line(&mut self, line: &str) {
        if !line.is_empty() {
            self.out.push_str("    ");
            self.out.push_str(line);
        }
        self.out.push('\n');
    }

    fn emit_label(&mut self, label: &str) {
        self.out.push_str(label);
        self.out.push_str(":\n");
    }

    fn emit_comment(&mut self, comment: &str) {
        self.out.push_str("    # ");
        self.out.push_str(comment);
        self.out.push('\n');
    }

    fn emit_header(&mut self) {
        self.emit_line(".intel_syntax noprefix");
        self.emit_line(".global _start");
        self.emit_line("");
        self.emit_line(".section .text");
        self.emit_line("");
        self.emit_label("_start");
        self.emit_line("call main");
        self.emit_line("mov rdi, rax"); // exit code
        self.emit_line("mov rax, 60"); // sys_exit
        self.emit_line("syscall");
        self.emit_line("");
    }

    fn emit_footer(&mut self) {
        self.emit_line("");
        runtime::emit_data_section(&mut self.out);
        let mut storage: Vec<(String, i64)> = Vec::new();
        for name in &self.info.global_scalars {
            storage.push((name.clone(), 1));
        }
        for (name, count) in &self.info.global_arrays {
            storage.push((name.clone(), *count));
        }
        for (func, arrays) in &self.info.local_arrays {
            for (name, count) in arrays {
                storage.push((mangle_array_label(func, name), *count));
            }
        }
        if !storage.is_empty() {
            self.out.push_str("\n.section .bss\n");
            storage.sort();
            for (label, count) in storage {
                self.out
                    .push_str(&format!("{label}: .space {}\n", count * 8));
            }
        }
    }

    // === Operand resolution ===

    /// Resolve an operand to an instruction source: an immediate for
    /// literals, a memory reference otherwise.
    fn operand_value(&mut self, operand: &Operand) -> String {
        match operand {
            Operand::Literal(n) => n.to_string(),
            Operand::Name(name) => self.memory_location(name),
            Operand::None => String::new(),
        }
    }

    /// The memory home of a named value in the current function:
    /// parameter slot, global storage, or a frame slot assigned on first
    /// use.
    fn memory_location(&mut self, name: &str) -> String {
        if let Some(&offset) = self.param_offsets.get(name) {
            return format!("[rbp + {offset}]");
        }
        if self.info.global_scalars.iter().any(|g| g == name) {
            return format!("[{name}]");
        }
        let offset = match self.slots.get(name) {
            Some(&slot) => slot,
            None => {
                let slot = self.next_slot;
                self.next_slot -= 8;
                self.slots.insert(name.to_string(), slot);
                slot
            }
        };
        format!("[rbp - {}]", -offset)
    }

    /// True when `name` denotes an array (storage or pointer parameter)
    /// visible in the current function.
    fn is_array(&self, name: &str) -> bool {
        self.local_array_labels.contains_key(name)
            || self.array_params.iter().any(|p| p == name)
            || self.info.global_arrays.iter().any(|(g, _)| g == name)
    }

    /// Load the base address of an array into `reg`.
    fn load_array_base(&mut self, name: &str, reg: &str) {
        if let Some(label) = self.local_array_labels.get(name) {
            let label = label.clone();
            self.emit_line(&format!("lea {reg}, {label}"));
        } else if self.array_params.iter().any(|p| p == name) {
            let slot = self.memory_location(name);
            self.emit_line(&format!("mov {reg}, {slot}"));
        } else {
            // Global array storage.
            self.emit_line(&format!("lea {reg}, {name}"));
        }
    }

    // === Per-opcode emission ===

    fn emit_instruction(&mut self, inst: &Instruction) {
        match inst.op {
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Mod
            | OpCode::And
            | OpCode::Or => self.emit_arithmetic(inst),
            OpCode::Eq | OpCode::Ne | OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge => {
                self.emit_comparison(inst)
            }
            OpCode::Not => self.emit_not(inst),
            OpCode::Assign | OpCode::Copy => self.emit_assignment(inst),
            OpCode::Goto | OpCode::IfFalse | OpCode::IfTrue => self.emit_branch(inst),
            OpCode::Param => self.emit_param(inst),
            OpCode::Call => self.emit_call(inst),
            OpCode::Return => self.emit_return(inst),
            OpCode::ArrayAccess | OpCode::ArrayAssign => self.emit_array_op(inst),
            OpCode::Label => {
                if let Some(label) = inst.label_name() {
                    let label = label.to_string();
                    self.emit_label(&label);
                }
            }
            OpCode::FunctionBegin => self.emit_function_begin(inst),
            OpCode::FunctionEnd => self.emit_function_end(),
            OpCode::Nop => self.emit_line("nop"),
            OpCode::Halt => {
                self.emit_line("mov rax, 60");
                self.emit_line("xor rdi, rdi");
                self.emit_line("syscall");
            }
        }
    }

    fn emit_arithmetic(&mut self, inst: &Instruction) {
        let r1 = self.regs.allocate();
        let r2 = self.regs.allocate();
        let lhs = self.operand_value(&inst.arg1);
        let rhs = self.operand_value(&inst.arg2);
        self.emit_line(&format!("mov {r1}, {lhs}"));
        self.emit_line(&format!("mov {r2}, {rhs}"));
        match inst.op {
            OpCode::Add => self.emit_line(&format!("add {r1}, {r2}")),
            OpCode::Sub => self.emit_line(&format!("sub {r1}, {r2}")),
            OpCode::Mul => self.emit_line(&format!("imul {r1}, {r2}")),
            OpCode::And => self.emit_line(&format!("and {r1}, {r2}")),
            OpCode::Or => self.emit_line(&format!("or {r1}, {r2}")),
            OpCode::Div | OpCode::Mod => {
                // idiv takes the dividend in rdx:rax; both are reserved
                // registers so the pool never hands them out.
                self.emit_line(&format!("mov rax, {r1}"));
                self.emit_line("cqo");
                self.emit_line(&format!("idiv {r2}"));
                if inst.op == OpCode::Div {
                    self.emit_line(&format!("mov {r1}, rax"));
                } else {
                    self.emit_line(&format!("mov {r1}, rdx"));
                }
            }
            _ => unreachable!(),
        }
        let dest = self.operand_value(&inst.result);
        self.emit_line(&format!("mov {dest}, {r1}"));
        self.regs.free(r1);
        self.regs.free(r2);
    }

    fn emit_comparison(&mut self, inst: &Instruction) {
        let r1 = self.regs.allocate();
        let r2 = self.regs.allocate();
        let lhs = self.operand_value(&inst.arg1);
        let rhs = self.operand_value(&inst.arg2);
        self.emit_line(&format!("mov {r1}, {lhs}"));
        self.emit_line(&format!("mov {r2}, {rhs}"));
        self.emit_line(&format!("cmp {r1}, {r2}"));
        let set = match inst.op {
            OpCode::Eq => "sete",
            OpCode::Ne => "setne",
            OpCode::Lt => "setl",
            OpCode::Le => "setle",
            OpCode::Gt => "setg",
            OpCode::Ge => "setge",
            _ => unreachable!(),
        };
        self.emit_line(&format!("{set} al"));
        self.emit_line(&format!("movzx {r1}, al"));
        let dest = self.operand_value(&inst.result);
        self.emit_line(&format!("mov {dest}, {r1}"));
        self.regs.free(r1);
        self.regs.free(r2);
    }

    /// Logical not: 0 becomes 1, anything else becomes 0.
    fn emit_not(&mut self, inst: &Instruction) {
        let reg = self.regs.allocate();
        let src = self.operand_value(&inst.arg1);
        self.emit_line(&format!("mov {reg}, {src}"));
        self.emit_line(&format!("test {reg}, {reg}"));
        self.emit_line("sete al");
        self.emit_line(&format!("movzx {reg}, al"));
        let dest = self.operand_value(&inst.result);
        self.emit_line(&format!("mov {dest}, {reg}"));
        self.regs.free(reg);
    }

    fn emit_assignment(&mut self, inst: &Instruction) {
        let reg = self.regs.allocate();
        let src = self.operand_value(&inst.arg1);
        self.emit_line(&format!("mov {reg}, {src}"));
        let dest = self.operand_value(&inst.result);
        self.emit_line(&format!("mov {dest}, {reg}"));
        self.regs.free(reg);
    }

    fn emit_branch(&mut self, inst: &Instruction) {
        let target = inst.label_name().unwrap_or_default().to_string();
        if inst.op == OpCode::Goto {
            self.emit_line(&format!("jmp {target}"));
            return;
        }
        let reg = self.regs.allocate();
        let cond = self.operand_value(&inst.arg1);
        self.emit_line(&format!("mov {reg}, {cond}"));
        self.emit_line(&format!("test {reg}, {reg}"));
        if inst.op == OpCode::IfFalse {
            self.emit_line(&format!("jz {target}"));
        } else {
            self.emit_line(&format!("jnz {target}"));
        }
        self.regs.free(reg);
    }

    fn emit_param(&mut self, inst: &Instruction) {
        let reg = self.regs.allocate();
        match inst.arg1.as_name() {
            Some(name) if self.is_array(name) => {
                // Arrays are passed by base address.
                let name = name.to_string();
                self.load_array_base(&name, reg);
            }
            _ => {
                let value = self.operand_value(&inst.arg1);
                self.emit_line(&format!("mov {reg}, {value}"));
            }
        }
        self.emit_line(&format!("push {reg}"));
        self.regs.free(reg);
    }

    fn emit_call(&mut self, inst: &Instruction) {
        let callee = inst.arg1.to_string();
        self.emit_line(&format!("call {callee}"));
        let arg_count = inst.arg2.as_literal().unwrap_or(0);
        if arg_count > 0 {
            self.emit_line(&format!("add rsp, {}", arg_count * 8));
        }
        if !inst.result.is_none() {
            let dest = self.operand_value(&inst.result);
            self.emit_line(&format!("mov {dest}, rax"));
        }
    }

    fn emit_return(&mut self, inst: &Instruction) {
        if !inst.arg1.is_none() {
            let reg = self.regs.allocate();
            let value = self.operand_value(&inst.arg1);
            self.emit_line(&format!("mov {reg}, {value}"));
            self.emit_line(&format!("mov rax, {reg}"));
            self.regs.free(reg);
        }
        self.emit_epilogue();
        self.emit_line("ret");
    }

    fn emit_array_op(&mut self, inst: &Instruction) {
        let base = self.regs.allocate();
        let index = self.regs.allocate();
        if inst.op == OpCode::ArrayAccess {
            // result = array[index]
            let array = inst.arg1.to_string();
            self.load_array_base(&array, base);
            let ix = self.operand_value(&inst.arg2);
            self.emit_line(&format!("mov {index}, {ix}"));
            self.emit_line(&format!("mov {base}, [{base} + {index} * 8]"));
            let dest = self.operand_value(&inst.result);
            self.emit_line(&format!("mov {dest}, {base}"));
        } else {
            // array[index] = value
            let array = inst.result.to_string();
            self.load_array_base(&array, base);
            let ix = self.operand_value(&inst.arg1);
            self.emit_line(&format!("mov {index}, {ix}"));
            let value = self.regs.allocate();
            let src = self.operand_value(&inst.arg2);
            self.emit_line(&format!("mov {value}, {src}"));
            self.emit_line(&format!("mov [{base} + {index} * 8], {value}"));
            self.regs.free(value);
        }
        self.regs.free(base);
        self.regs.free(index);
    }

    fn emit_function_begin(&mut self, inst: &Instruction) {
        let name = inst
            .result
            .as_name()
            .expect("FUNCTION_BEGIN names its function")
            .to_string();

        // Fresh per-function state.
        self.slots.clear();
        self.next_slot = -8;
        self.param_offsets.clear();
        self.array_params.clear();
        self.local_array_labels.clear();
        self.regs.reset();

        if let Some(func) = self.info.functions.get(&name) {
            for (i, param) in func.params.iter().enumerate() {
                self.param_offsets
                    .insert(param.name.clone(), 16 + 8 * i as i64);
                if param.is_array {
                    self.array_params.push(param.name.clone());
                }
            }
        }
        if let Some(arrays) = self.info.local_arrays.get(&name) {
            for (array, _) in arrays {
                self.local_array_labels
                    .insert(array.clone(), mangle_array_label(&name, array));
            }
        }

        self.emit_label(&name);
        self.emit_line("push rbp");
        self.emit_line("mov rbp, rsp");
        // Fixed frame reservation for locals and temporaries.
        self.emit_line("sub rsp, 64");
    }

    fn emit_function_end(&mut self) {
        self.emit_epilogue();
        self.emit_line("ret");
        self.emit_line("");
    }

    fn emit_epilogue(&mut self) {
        self.emit_line("mov rsp, rbp");
        self.emit_line("pop rbp");
    }
}

fn mangle_array_label(func: &str, array: &str) -> String {
    format!("{func}_arr_{array}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::frontend::sema::SemanticAnalyzer;
    use crate::ir::gen::IrGenerator;

    fn compile(source: &str) -> String {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        assert!(parser.diagnostics.is_empty());
        let info = SemanticAnalyzer::new().analyze(&program).unwrap();
        let listing = IrGenerator::new().generate(&program);
        AsmGenerator::new(&info).generate(&listing)
    }

    #[test]
    fn test_entry_point_calls_main_and_exits() {
        let asm = compile("int main(void) { return 0; }");
        assert!(asm.contains("_start:"));
        assert!(asm.contains("call main"));
        assert!(asm.contains("mov rdi, rax"));
        assert!(asm.contains("mov rax, 60"));
        assert!(asm.contains("syscall"));
    }

    #[test]
    fn test_function_prologue_and_epilogue() {
        let asm = compile("int main(void) { return 0; }");
        assert!(asm.contains("main:"));
        assert!(asm.contains("push rbp"));
        assert!(asm.contains("mov rbp, rsp"));
        assert!(asm.contains("sub rsp, 64"));
        assert!(asm.contains("mov rsp, rbp"));
        assert!(asm.contains("pop rbp"));
    }

    #[test]
    fn test_slots_assigned_from_minus_eight() {
        let asm = compile("int main(void) { int x; return x; }");
        // x gets the first frame slot and is moved into rax for the return.
        assert!(asm.contains("[rbp - 8]"));
    }

    #[test]
    fn test_call_pushes_args_and_cleans_stack() {
        let asm =
            compile("int add(int a, int b) { return a + b; } int main(void) { return add(2, 3); }");
        assert!(asm.contains("push "));
        assert!(asm.contains("call add"));
        assert!(asm.contains("add rsp, 16"));
    }

    #[test]
    fn test_parameters_bind_above_rbp() {
        let asm =
            compile("int add(int a, int b) { return a + b; } int main(void) { return add(2, 3); }");
        assert!(asm.contains("[rbp + 16]"));
        assert!(asm.contains("[rbp + 24]"));
    }

    #[test]
    fn test_division_uses_sign_extension() {
        let asm = compile("int main(void) { int a; a = 7; return a / 2; }");
        assert!(asm.contains("cqo"));
        assert!(asm.contains("idiv"));
    }

    #[test]
    fn test_comparison_uses_setcc() {
        let asm = compile("int main(void) { int a; a = 1; return a < 2; }");
        assert!(asm.contains("cmp "));
        assert!(asm.contains("setl al"));
        assert!(asm.contains("movzx"));
    }

    #[test]
    fn test_branches_test_and_jump() {
        let asm = compile("int main(void) { int x; x = 1; if (x) x = 2; return x; }");
        assert!(asm.contains("jz L0"));
        assert!(asm.contains("L0:"));
    }

    #[test]
    fn test_global_array_gets_bss_storage() {
        let asm = compile("int a[10]; int main(void) { a[0] = 1; return a[0]; }");
        assert!(asm.contains(".section .bss"));
        assert!(asm.contains("a: .space 80"));
        assert!(asm.contains("lea "));
        assert!(asm.contains("* 8]"));
    }

    #[test]
    fn test_local_array_label_is_function_mangled() {
        let asm = compile("int main(void) { int b[4]; b[0] = 1; return b[0]; }");
        assert!(asm.contains("main_arr_b: .space 32"));
    }

    #[test]
    fn test_array_argument_passes_base_address() {
        let asm = compile(
            "int first(int a[]) { return a[0]; } int g[4]; int main(void) { return first(g); }",
        );
        // The caller pushes g's address, the callee loads it from its slot.
        assert!(asm.contains("lea "));
        assert!(asm.contains("call first"));
    }

    #[test]
    fn test_global_scalar_addressed_by_name() {
        let asm = compile("int g; int main(void) { g = 3; return g; }");
        assert!(asm.contains("[g]"));
        assert!(asm.contains("g: .space 8"));
    }

    #[test]
    fn test_runtime_is_always_emitted() {
        let asm = compile("int main(void) { return 0; }");
        for label in ["input:", "output:", "atoi:", "itoa:"] {
            assert!(asm.contains(label), "missing runtime label {label}");
        }
        assert!(asm.contains("input_buffer: .space 32"));
        assert!(asm.contains("output_buffer: .space 32"));
    }

    #[test]
    fn test_ir_comments_annotate_output() {
        let asm = compile("int main(void) { int x; x = 1 + 2; return x; }");
        assert!(asm.contains("# IR: ADD t0, 1, 2"));
    }
}
