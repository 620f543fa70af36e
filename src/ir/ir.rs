//! Three-address intermediate representation.
//!
//! An instruction is `{op, result, arg1, arg2, src_line}`. Operands are a
//! tagged sum of a decimal literal, a symbolic name (variable, temporary
//! `tN`, or label `LN`), or nothing — pattern matching on the operand kind
//! replaces the prefix-character tests a string encoding would need.

/// Three-address operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    Not,
    // Data movement
    Assign,
    Copy,
    // Control flow
    Goto,
    IfFalse,
    IfTrue,
    // Functions
    Param,
    Call,
    Return,
    FunctionBegin,
    FunctionEnd,
    // Arrays
    ArrayAccess,
    ArrayAssign,
    // Labels and markers
    Label,
    // Special
    Nop,
    Halt,
}

impl OpCode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Eq => "EQ",
            OpCode::Ne => "NE",
            OpCode::Lt => "LT",
            OpCode::Le => "LE",
            OpCode::Gt => "GT",
            OpCode::Ge => "GE",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::Not => "NOT",
            OpCode::Assign => "ASSIGN",
            OpCode::Copy => "COPY",
            OpCode::Goto => "GOTO",
            OpCode::IfFalse => "IF_FALSE",
            OpCode::IfTrue => "IF_TRUE",
            OpCode::Param => "PARAM",
            OpCode::Call => "CALL",
            OpCode::Return => "RETURN",
            OpCode::FunctionBegin => "FUNCTION_BEGIN",
            OpCode::FunctionEnd => "FUNCTION_END",
            OpCode::ArrayAccess => "ARRAY_ACCESS",
            OpCode::ArrayAssign => "ARRAY_ASSIGN",
            OpCode::Label => "LABEL",
            OpCode::Nop => "NOP",
            OpCode::Halt => "HALT",
        }
    }

    /// True for the value-producing opcodes whose `result` names a defined
    /// variable or temporary (rather than a label or function marker).
    /// `ArrayAssign` counts as defining its array for liveness purposes.
    fn defines_result(self) -> bool {
        matches!(
            self,
            OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::Mod
                | OpCode::Eq
                | OpCode::Ne
                | OpCode::Lt
                | OpCode::Le
                | OpCode::Gt
                | OpCode::Ge
                | OpCode::And
                | OpCode::Or
                | OpCode::Not
                | OpCode::Assign
                | OpCode::Copy
                | OpCode::Call
                | OpCode::ArrayAccess
                | OpCode::ArrayAssign
        )
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// An instruction operand: a decimal literal, a symbolic name, or absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Literal(i64),
    Name(String),
    None,
}

impl Operand {
    pub fn name(s: impl Into<String>) -> Self {
        Operand::Name(s.into())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Operand::None)
    }

    pub fn as_literal(&self) -> Option<i64> {
        match self {
            Operand::Literal(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Operand::Name(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Literal(n) => write!(f, "{n}"),
            Operand::Name(s) => write!(f, "{s}"),
            Operand::None => Ok(()),
        }
    }
}

/// One three-address instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub op: OpCode,
    pub result: Operand,
    pub arg1: Operand,
    pub arg2: Operand,
    /// Source line the instruction was generated from (0 when synthetic).
    pub src_line: u32,
}

impl Instruction {
    pub fn new(op: OpCode, result: Operand, arg1: Operand, arg2: Operand, src_line: u32) -> Self {
        Self {
            op,
            result,
            arg1,
            arg2,
            src_line,
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.op, OpCode::Goto | OpCode::IfFalse | OpCode::IfTrue)
    }

    pub fn is_label(&self) -> bool {
        self.op == OpCode::Label
    }

    pub fn is_call(&self) -> bool {
        self.op == OpCode::Call
    }

    /// The label this instruction declares or targets, if any.
    pub fn label_name(&self) -> Option<&str> {
        match self.op {
            OpCode::Label | OpCode::Goto | OpCode::IfFalse | OpCode::IfTrue => {
                self.result.as_name()
            }
            _ => None,
        }
    }

    /// The variable or temporary this instruction defines, if any.
    pub fn defined_name(&self) -> Option<&str> {
        if self.op.defines_result() {
            self.result.as_name()
        } else {
            None
        }
    }

    /// Symbolic names read by this instruction. The `result` field is a
    /// definition or a label, never a read.
    pub fn used_names(&self) -> impl Iterator<Item = &str> {
        [&self.arg1, &self.arg2]
            .into_iter()
            .filter_map(|op| op.as_name())
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.op)?;
        if !self.result.is_none() {
            write!(f, " {}", self.result)?;
        }
        if !self.arg1.is_none() {
            write!(f, ", {}", self.arg1)?;
        }
        if !self.arg2.is_none() {
            write!(f, ", {}", self.arg2)?;
        }
        Ok(())
    }
}

/// A linear instruction listing, one per program.
pub type IrListing = Vec<Instruction>;

/// Render a listing the way `--print-ir` shows it: one numbered
/// instruction per line.
pub fn listing_to_string(listing: &[Instruction]) -> String {
    let mut out = String::new();
    for (i, inst) in listing.iter().enumerate() {
        out.push_str(&format!("{i}: {inst}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_listing_format() {
        let add = Instruction::new(
            OpCode::Add,
            Operand::name("t0"),
            Operand::Literal(1),
            Operand::Literal(2),
            1,
        );
        assert_eq!(add.to_string(), "ADD t0, 1, 2");

        let ret = Instruction::new(
            OpCode::Return,
            Operand::None,
            Operand::name("x"),
            Operand::None,
            2,
        );
        assert_eq!(ret.to_string(), "RETURN, x");

        let goto = Instruction::new(
            OpCode::Goto,
            Operand::name("L0"),
            Operand::None,
            Operand::None,
            3,
        );
        assert_eq!(goto.to_string(), "GOTO L0");
    }

    #[test]
    fn test_defined_and_used_names() {
        let add = Instruction::new(
            OpCode::Add,
            Operand::name("t0"),
            Operand::name("a"),
            Operand::name("b"),
            0,
        );
        assert_eq!(add.defined_name(), Some("t0"));
        assert_eq!(add.used_names().collect::<Vec<_>>(), vec!["a", "b"]);

        let goto = Instruction::new(
            OpCode::Goto,
            Operand::name("L1"),
            Operand::None,
            Operand::None,
            0,
        );
        assert_eq!(goto.defined_name(), None);
        assert_eq!(goto.label_name(), Some("L1"));
        assert_eq!(goto.used_names().count(), 0);
    }

    #[test]
    fn test_literals_are_not_used_names() {
        let sub = Instruction::new(
            OpCode::Sub,
            Operand::name("t1"),
            Operand::Literal(0),
            Operand::name("x"),
            0,
        );
        assert_eq!(sub.used_names().collect::<Vec<_>>(), vec!["x"]);
    }
}
