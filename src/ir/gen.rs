//! IR generation: AST to a linear three-address listing.
//!
//! Expression visitors leave the operand naming their result (a variable
//! name, a literal, or a fresh temporary) in `last_result`. Temporary and
//! label counters are generator-local and start from zero for every
//! compilation, so generation is deterministic: the same AST always yields
//! the same listing, names included.

use crate::frontend::ast::*;
use crate::ir::ir::{Instruction, IrListing, OpCode, Operand};

pub struct IrGenerator {
    instructions: IrListing,
    temp_counter: u32,
    label_counter: u32,
    last_result: Operand,
    current_line: u32,
}

impl IrGenerator {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
            temp_counter: 0,
            label_counter: 0,
            last_result: Operand::None,
            current_line: 0,
        }
    }

    pub fn generate(mut self, program: &Program) -> IrListing {
        for decl in &program.declarations {
            match decl {
                // Global variables generate no instructions; their storage
                // is laid out by the backend.
                Declaration::Var(_) => {}
                Declaration::Fun(f) => self.gen_function(f),
            }
        }
        self.instructions
    }

    fn new_temp(&mut self) -> Operand {
        let t = Operand::Name(format!("t{}", self.temp_counter));
        self.temp_counter += 1;
        t
    }

    fn new_label(&mut self) -> Operand {
        let l = Operand::Name(format!("L{}", self.label_counter));
        self.label_counter += 1;
        l
    }

    fn emit(&mut self, op: OpCode, result: Operand, arg1: Operand, arg2: Operand) {
        self.instructions
            .push(Instruction::new(op, result, arg1, arg2, self.current_line));
    }

    fn gen_function(&mut self, f: &FunDeclaration) {
        self.current_line = f.loc.line;
        self.emit(
            OpCode::FunctionBegin,
            Operand::name(&f.name),
            Operand::None,
            Operand::None,
        );
        // Parameters need no IR; the backend binds them to the call-side
        // stack slots.
        self.gen_compound(&f.body);
        self.emit(
            OpCode::FunctionEnd,
            Operand::name(&f.name),
            Operand::None,
            Operand::None,
        );
    }

    fn gen_compound(&mut self, compound: &CompoundStmt) {
        for stmt in &compound.statements {
            self.gen_stmt(stmt);
        }
    }

    fn gen_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(e) => {
                self.gen_expr(e);
            }
            Stmt::Empty => {}
            Stmt::Compound(c) => self.gen_compound(c),
            Stmt::If {
                cond,
                then_stmt,
                else_stmt,
            } => self.gen_if(cond, then_stmt, else_stmt.as_deref()),
            Stmt::While { cond, body } => self.gen_while(cond, body),
            Stmt::Return { expr, loc } => {
                self.current_line = loc.line;
                match expr {
                    Some(e) => {
                        let value = self.gen_expr(e);
                        self.emit(OpCode::Return, Operand::None, value, Operand::None);
                    }
                    None => self.emit(OpCode::Return, Operand::None, Operand::None, Operand::None),
                }
            }
        }
    }

    /// `if (c) s1 else s2` lowers to
    /// `IF_FALSE Lelse, c; s1; GOTO Lend; LABEL Lelse; s2; LABEL Lend`.
    /// Without an else branch the else label doubles as the end label.
    fn gen_if(&mut self, cond: &Expr, then_stmt: &Stmt, else_stmt: Option<&Stmt>) {
        let else_label = self.new_label();
        let end_label = else_stmt.map(|_| self.new_label());

        let cond_value = self.gen_expr(cond);
        self.emit(
            OpCode::IfFalse,
            else_label.clone(),
            cond_value,
            Operand::None,
        );

        self.gen_stmt(then_stmt);

        match (else_stmt, end_label) {
            (Some(else_stmt), Some(end_label)) => {
                self.emit(OpCode::Goto, end_label.clone(), Operand::None, Operand::None);
                self.emit(OpCode::Label, else_label, Operand::None, Operand::None);
                self.gen_stmt(else_stmt);
                self.emit(OpCode::Label, end_label, Operand::None, Operand::None);
            }
            _ => {
                self.emit(OpCode::Label, else_label, Operand::None, Operand::None);
            }
        }
    }

    /// `while (c) s` lowers to
    /// `LABEL Lloop; c; IF_FALSE Lend, c; s; GOTO Lloop; LABEL Lend`.
    fn gen_while(&mut self, cond: &Expr, body: &Stmt) {
        let loop_label = self.new_label();
        let end_label = self.new_label();

        self.emit(OpCode::Label, loop_label.clone(), Operand::None, Operand::None);
        let cond_value = self.gen_expr(cond);
        self.emit(OpCode::IfFalse, end_label.clone(), cond_value, Operand::None);

        self.gen_stmt(body);

        self.emit(OpCode::Goto, loop_label, Operand::None, Operand::None);
        self.emit(OpCode::Label, end_label, Operand::None, Operand::None);
    }

    /// Lower an expression and return the operand holding its value.
    fn gen_expr(&mut self, expr: &Expr) -> Operand {
        self.current_line = expr.location().line;
        match expr {
            Expr::Number { value, .. } => {
                self.last_result = Operand::Literal(*value);
            }
            Expr::Variable { name, index, .. } => match index {
                Some(ix) => {
                    let index_value = self.gen_expr(ix);
                    let result = self.new_temp();
                    self.emit(
                        OpCode::ArrayAccess,
                        result.clone(),
                        Operand::name(name),
                        index_value,
                    );
                    self.last_result = result;
                }
                None => {
                    self.last_result = Operand::name(name);
                }
            },
            Expr::Call { name, args, .. } => {
                // Arguments evaluate left to right; PARAMs are emitted in
                // reverse evaluation order so the leftmost argument ends up
                // on top of the stack at the call.
                let values: Vec<Operand> = args.iter().map(|a| self.gen_expr(a)).collect();
                for value in values.into_iter().rev() {
                    self.emit(OpCode::Param, Operand::None, value, Operand::None);
                }
                let result = self.new_temp();
                self.emit(
                    OpCode::Call,
                    result.clone(),
                    Operand::name(name),
                    Operand::Literal(args.len() as i64),
                );
                self.last_result = result;
            }
            Expr::Unary { op, operand, .. } => {
                let value = self.gen_expr(operand);
                let result = self.new_temp();
                match op {
                    UnaryOp::Neg => self.emit(
                        OpCode::Sub,
                        result.clone(),
                        Operand::Literal(0),
                        value,
                    ),
                    UnaryOp::Not => {
                        self.emit(OpCode::Not, result.clone(), value, Operand::None)
                    }
                }
                self.last_result = result;
            }
            Expr::Binary {
                op: BinOp::Assign,
                left,
                right,
                ..
            } => self.gen_assignment(left, right),
            Expr::Binary {
                op, left, right, ..
            } => {
                let lhs = self.gen_expr(left);
                let rhs = self.gen_expr(right);
                let result = self.new_temp();
                self.emit(opcode_of(*op), result.clone(), lhs, rhs);
                self.last_result = result;
            }
        }
        self.last_result.clone()
    }

    fn gen_assignment(&mut self, left: &Expr, right: &Expr) {
        let value = self.gen_expr(right);
        let Expr::Variable { name, index, .. } = left else {
            // The analyzer rejects any other target; reaching this is a
            // compiler bug, not a user error.
            unreachable!("assignment target must be a variable");
        };
        match index {
            Some(ix) => {
                let index_value = self.gen_expr(ix);
                self.emit(
                    OpCode::ArrayAssign,
                    Operand::name(name),
                    index_value,
                    value.clone(),
                );
                self.last_result = value;
            }
            None => {
                self.emit(OpCode::Assign, Operand::name(name), value, Operand::None);
                self.last_result = Operand::name(name);
            }
        }
    }
}

impl Default for IrGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn opcode_of(op: BinOp) -> OpCode {
    match op {
        BinOp::Add => OpCode::Add,
        BinOp::Sub => OpCode::Sub,
        BinOp::Mul => OpCode::Mul,
        BinOp::Div => OpCode::Div,
        BinOp::Eq => OpCode::Eq,
        BinOp::Ne => OpCode::Ne,
        BinOp::Lt => OpCode::Lt,
        BinOp::Le => OpCode::Le,
        BinOp::Gt => OpCode::Gt,
        BinOp::Ge => OpCode::Ge,
        BinOp::Assign => unreachable!("assignment lowers through gen_assignment"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::ir::ir::listing_to_string;

    fn lower(source: &str) -> IrListing {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        assert!(parser.diagnostics.is_empty(), "test source must parse");
        IrGenerator::new().generate(&program)
    }

    fn text(listing: &IrListing) -> String {
        listing_to_string(listing)
    }

    #[test]
    fn test_arithmetic_and_assignment() {
        let ir = text(&lower("int main(void) { int x; x = 1 + 2; return x; }"));
        assert!(ir.contains("FUNCTION_BEGIN main"));
        assert!(ir.contains("ADD t0, 1, 2"));
        assert!(ir.contains("ASSIGN x, t0"));
        assert!(ir.contains("RETURN, x"));
        assert!(ir.contains("FUNCTION_END main"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let source =
            "int f(int n) { if (n > 0) return f(n - 1); return 0; } int main(void) { return f(3); }";
        assert_eq!(lower(source), lower(source));
    }

    #[test]
    fn test_unary_minus_is_sub_from_zero() {
        let ir = text(&lower("int main(void) { int x; x = -5; return x; }"));
        assert!(ir.contains("SUB t0, 0, 5"));
    }

    #[test]
    fn test_logical_not() {
        let ir = text(&lower("int main(void) { int x; x = !0; return x; }"));
        assert!(ir.contains("NOT t0, 0"));
    }

    #[test]
    fn test_call_pushes_params_in_reverse() {
        let listing = lower(
            "int add(int a, int b) { return a + b; } int main(void) { return add(2, 3); }",
        );
        let params: Vec<String> = listing
            .iter()
            .filter(|i| i.op == OpCode::Param)
            .map(|i| i.arg1.to_string())
            .collect();
        assert_eq!(params, vec!["3", "2"]);
        // The temp counter has advanced past add's own body by now.
        let ir = text(&listing);
        assert!(ir.contains("CALL t1, add, 2"));
    }

    #[test]
    fn test_while_loop_uses_exactly_two_labels() {
        let listing = lower("int main(void) { int x; x = 10; while (x > 0) { x = x - 1; } return x; }");
        let labels: Vec<&str> = listing
            .iter()
            .filter(|i| i.is_label())
            .filter_map(|i| i.label_name())
            .collect();
        assert_eq!(labels, vec!["L0", "L1"]);
        let ir = text(&listing);
        assert!(ir.contains("IF_FALSE L1"));
        assert!(ir.contains("GOTO L0"));
    }

    #[test]
    fn test_if_without_else_shares_end_label() {
        let listing = lower("int main(void) { int x; x = 0; if (x) x = 1; return x; }");
        let labels: Vec<&str> = listing
            .iter()
            .filter(|i| i.is_label())
            .filter_map(|i| i.label_name())
            .collect();
        assert_eq!(labels, vec!["L0"]);
        assert!(!text(&listing).contains("GOTO"));
    }

    #[test]
    fn test_if_else_label_protocol() {
        let ir = text(&lower(
            "int main(void) { int x; if (1) x = 1; else x = 2; return x; }",
        ));
        assert!(ir.contains("IF_FALSE L0, 1"));
        assert!(ir.contains("GOTO L1"));
        let else_pos = ir.find("LABEL L0").unwrap();
        let end_pos = ir.find("LABEL L1").unwrap();
        assert!(else_pos < end_pos);
    }

    #[test]
    fn test_array_access_and_assign() {
        let ir = text(&lower(
            "int main(void) { int a[4]; a[0] = 9; return a[0]; }",
        ));
        assert!(ir.contains("ARRAY_ASSIGN a, 0, 9"));
        assert!(ir.contains("ARRAY_ACCESS t0, a, 0"));
    }

    #[test]
    fn test_bare_return() {
        let listing = lower("void f(void) { return; } int main(void) { f(); return 0; }");
        let ret = listing
            .iter()
            .find(|i| i.op == OpCode::Return)
            .unwrap();
        assert!(ret.arg1.is_none());
    }

    #[test]
    fn test_source_lines_are_recorded() {
        let listing = lower("int main(void) {\n  int x;\n  x = 1 + 2;\n  return x;\n}");
        let add = listing.iter().find(|i| i.op == OpCode::Add).unwrap();
        assert_eq!(add.src_line, 3);
        let ret = listing.iter().find(|i| i.op == OpCode::Return).unwrap();
        assert_eq!(ret.src_line, 4);
    }
}
