//! Scope- and type-checking over the AST.
//!
//! Analysis runs in two passes over the program. Pass 1 installs every
//! top-level function in the global scope so bodies can call across the
//! file. Pass 2 visits each declaration: functions open a scope, declare
//! their parameters, and check their bodies; variable declarations are
//! installed in the scope that encloses them. All diagnostics flow through
//! the error collector; analysis succeeds iff the collector stays empty.
//!
//! Besides validation, the analyzer produces the `ProgramInfo` handoff the
//! backend needs: function signatures (parameter names and array-ness) and
//! the storage layout of global and local arrays.

use crate::common::source::SourceLocation;
use crate::frontend::ast::*;
use crate::frontend::sema::errors::{ErrorCollector, SemanticError, SemanticErrorKind};
use crate::frontend::sema::symbol_table::{
    DataType, FunctionParam, FunctionSymbol, Symbol, SymbolTable, VariableSymbol,
};
use rustc_hash::FxHashMap;

/// One function parameter as seen by the backend.
#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    pub is_array: bool,
}

/// One function signature as seen by the backend.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub return_type: DataType,
    pub params: Vec<ParamInfo>,
    pub is_builtin: bool,
}

/// Symbol information handed from semantic analysis to assembly emission:
/// function signatures plus the names and element counts of every array
/// and global that needs storage.
#[derive(Debug, Default)]
pub struct ProgramInfo {
    pub functions: FxHashMap<String, FunctionInfo>,
    pub global_scalars: Vec<String>,
    pub global_arrays: Vec<(String, i64)>,
    /// Arrays declared inside each function body, keyed by function name.
    pub local_arrays: FxHashMap<String, Vec<(String, i64)>>,
}

struct CurrentFunction {
    name: String,
    return_type: DataType,
}

pub struct SemanticAnalyzer {
    symbols: SymbolTable,
    errors: ErrorCollector,
    current_function: Option<CurrentFunction>,
    info: ProgramInfo,
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        let mut info = ProgramInfo::default();
        info.functions.insert(
            "input".to_string(),
            FunctionInfo {
                return_type: DataType::Int,
                params: Vec::new(),
                is_builtin: true,
            },
        );
        info.functions.insert(
            "output".to_string(),
            FunctionInfo {
                return_type: DataType::Void,
                params: vec![ParamInfo {
                    name: "value".to_string(),
                    is_array: false,
                }],
                is_builtin: true,
            },
        );
        Self {
            symbols: SymbolTable::new(),
            errors: ErrorCollector::new(),
            current_function: None,
            info,
        }
    }

    /// Analyze a program. Returns the backend handoff on success or every
    /// collected diagnostic on failure.
    pub fn analyze(mut self, program: &Program) -> Result<ProgramInfo, Vec<SemanticError>> {
        // Pass 1: install all top-level functions so bodies can call
        // functions declared later in the file.
        for decl in &program.declarations {
            if let Declaration::Fun(f) = decl {
                self.declare_function(f);
            }
        }

        // Pass 2: check every declaration in order.
        for decl in &program.declarations {
            match decl {
                Declaration::Var(v) => self.declare_variable(v),
                Declaration::Fun(f) => self.analyze_function(f),
            }
        }

        self.check_main_function();

        if self.errors.has_errors() {
            Err(self.errors.into_errors())
        } else {
            Ok(self.info)
        }
    }

    fn declare_function(&mut self, f: &FunDeclaration) {
        let return_type = data_type_of(f.return_type);
        let params: Vec<FunctionParam> = f
            .params
            .iter()
            .map(|p| FunctionParam {
                name: p.name.clone(),
                data_type: data_type_of(p.type_spec),
                is_array: p.is_array,
            })
            .collect();

        let symbol = FunctionSymbol {
            return_type,
            params,
            is_defined: true,
            is_builtin: false,
            loc: f.loc,
        };
        if !self.symbols.declare(&f.name, Symbol::Function(symbol)) {
            self.errors.redefinition(&f.name, f.loc);
            return;
        }
        self.info.functions.insert(
            f.name.clone(),
            FunctionInfo {
                return_type,
                params: f
                    .params
                    .iter()
                    .map(|p| ParamInfo {
                        name: p.name.clone(),
                        is_array: p.is_array,
                    })
                    .collect(),
                is_builtin: false,
            },
        );
    }

    fn declare_variable(&mut self, v: &VarDeclaration) {
        if v.type_spec == TypeSpec::Void {
            self.errors.void_variable(&v.name, v.loc);
            return;
        }
        let symbol = VariableSymbol {
            data_type: DataType::Int,
            is_array: v.array_size.is_some(),
            array_size: v.array_size,
            is_parameter: false,
            scope_level: self.symbols.scope_level(),
        };
        if !self.symbols.declare(&v.name, Symbol::Variable(symbol)) {
            self.errors.redefinition(&v.name, v.loc);
            return;
        }
        // Record storage for the backend.
        match (&self.current_function, v.array_size) {
            (Some(cf), Some(size)) => self
                .info
                .local_arrays
                .entry(cf.name.clone())
                .or_default()
                .push((v.name.clone(), size)),
            (None, Some(size)) => self.info.global_arrays.push((v.name.clone(), size)),
            (None, None) => self.info.global_scalars.push(v.name.clone()),
            (Some(_), None) => {} // scalar locals live in the frame
        }
    }

    fn analyze_function(&mut self, f: &FunDeclaration) {
        self.current_function = Some(CurrentFunction {
            name: f.name.clone(),
            return_type: data_type_of(f.return_type),
        });
        self.symbols.enter_scope();

        for param in &f.params {
            if param.type_spec == TypeSpec::Void && !param.is_array {
                self.errors.void_variable(&param.name, param.loc);
                continue;
            }
            let symbol = VariableSymbol {
                data_type: data_type_of(param.type_spec),
                is_array: param.is_array,
                array_size: None,
                is_parameter: true,
                scope_level: self.symbols.scope_level(),
            };
            if !self.symbols.declare(&param.name, Symbol::Variable(symbol)) {
                self.errors.redefinition(&param.name, param.loc);
            }
        }

        self.visit_compound(&f.body);

        self.symbols.exit_scope();
        self.current_function = None;
    }

    fn visit_compound(&mut self, compound: &CompoundStmt) {
        self.symbols.enter_scope();
        for local in &compound.locals {
            self.declare_variable(local);
        }
        for stmt in &compound.statements {
            self.check_stmt(stmt);
        }
        self.symbols.exit_scope();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(e) => {
                self.check_expr(e);
            }
            Stmt::Empty => {}
            Stmt::Compound(c) => self.visit_compound(c),
            Stmt::If {
                cond,
                then_stmt,
                else_stmt,
            } => {
                self.check_condition(cond);
                self.check_stmt(then_stmt);
                if let Some(e) = else_stmt {
                    self.check_stmt(e);
                }
            }
            Stmt::While { cond, body } => {
                self.check_condition(cond);
                self.check_stmt(body);
            }
            Stmt::Return { expr, loc } => self.check_return(expr.as_ref(), *loc),
        }
    }

    fn check_condition(&mut self, cond: &Expr) {
        let t = self.check_expr(cond);
        if t != DataType::Int && t != DataType::Unknown {
            self.errors.type_mismatch(DataType::Int, t, cond.location());
        }
    }

    fn check_return(&mut self, expr: Option<&Expr>, loc: SourceLocation) {
        let expected = match &self.current_function {
            Some(cf) => cf.return_type,
            None => return,
        };
        match expr {
            Some(e) => {
                let actual = self.check_expr(e);
                if actual != DataType::Unknown && actual != expected {
                    self.errors.return_type_mismatch(expected, actual, loc);
                }
            }
            None => {
                if expected != DataType::Void {
                    self.errors.return_type_mismatch(expected, DataType::Void, loc);
                }
            }
        }
    }

    /// Type-check an expression bottom-up, reporting problems as they are
    /// found. Returns `Unknown` when a sub-expression failed to resolve so
    /// one mistake does not cascade.
    fn check_expr(&mut self, expr: &Expr) -> DataType {
        match expr {
            Expr::Number { .. } => DataType::Int,
            Expr::Variable { name, index, loc } => self.check_variable(name, index.as_deref(), *loc),
            Expr::Call { name, args, loc } => self.check_call(name, args, *loc),
            Expr::Unary { operand, loc, .. } => {
                let t = self.check_expr(operand);
                if t != DataType::Int && t != DataType::Unknown {
                    self.errors.add(
                        "Unary operation requires integer operand",
                        *loc,
                        SemanticErrorKind::TypeMismatch,
                    );
                }
                DataType::Int
            }
            Expr::Binary {
                op: BinOp::Assign,
                left,
                right,
                loc,
            } => self.check_assignment(left, right, *loc),
            Expr::Binary {
                left, right, loc, ..
            } => {
                let lt = self.check_expr(left);
                let rt = self.check_expr(right);
                let bad = |t: DataType| t != DataType::Int && t != DataType::Unknown;
                if bad(lt) || bad(rt) {
                    self.errors.add(
                        "Binary operation requires integer operands",
                        *loc,
                        SemanticErrorKind::TypeMismatch,
                    );
                }
                DataType::Int
            }
        }
    }

    fn check_variable(&mut self, name: &str, index: Option<&Expr>, loc: SourceLocation) -> DataType {
        let symbol = match self.symbols.lookup_variable(name) {
            Some(s) => s.clone(),
            None => {
                self.errors.undefined_variable(name, loc);
                // Still check the index expression for nested problems.
                if let Some(ix) = index {
                    self.check_expr(ix);
                }
                return DataType::Unknown;
            }
        };

        match index {
            Some(ix) => {
                let ix_type = self.check_expr(ix);
                if ix_type != DataType::Int && ix_type != DataType::Unknown {
                    self.errors.array_index_not_int(ix.location());
                }
                if !symbol.is_array {
                    self.errors.add(
                        format!("Index applied to non-array variable '{name}'"),
                        loc,
                        SemanticErrorKind::TypeMismatch,
                    );
                }
                DataType::Int
            }
            None => symbol.reference_type(),
        }
    }

    fn check_call(&mut self, name: &str, args: &[Expr], loc: SourceLocation) -> DataType {
        let func = match self.symbols.lookup_function(name) {
            Some(f) => f.clone(),
            None => {
                self.errors.undefined_function(name, loc);
                for arg in args {
                    self.check_expr(arg);
                }
                return DataType::Unknown;
            }
        };

        if args.len() != func.params.len() {
            self.errors.function_signature_mismatch(name, loc);
            for arg in args {
                self.check_expr(arg);
            }
            return func.return_type;
        }

        for (arg, param) in args.iter().zip(&func.params) {
            let arg_type = self.check_expr(arg);
            let param_type = param.param_type();
            let compatible = matches!(
                (arg_type, param_type),
                (DataType::Int, DataType::Int) | (DataType::IntArray, DataType::IntArray)
            );
            if arg_type != DataType::Unknown && !compatible {
                self.errors.type_mismatch(param_type, arg_type, arg.location());
            }
        }

        func.return_type
    }

    /// Assignment is strict: the target must be a declared variable (or an
    /// indexed array element) and both sides must be plain `int`.
    fn check_assignment(&mut self, left: &Expr, right: &Expr, loc: SourceLocation) -> DataType {
        if !matches!(left, Expr::Variable { .. }) {
            self.errors.add(
                "Left side of assignment must be a variable",
                loc,
                SemanticErrorKind::TypeMismatch,
            );
            self.check_expr(right);
            return DataType::Unknown;
        }
        let lt = self.check_expr(left);
        let rt = self.check_expr(right);
        if lt == DataType::Unknown || rt == DataType::Unknown {
            return DataType::Int;
        }
        if lt == DataType::IntArray || rt == DataType::IntArray {
            self.errors
                .add("Cannot assign arrays", loc, SemanticErrorKind::TypeMismatch);
        } else if lt != DataType::Int || rt != DataType::Int {
            self.errors.type_mismatch(lt, rt, loc);
        }
        DataType::Int
    }

    /// The program must define `int main(void)`.
    fn check_main_function(&mut self) {
        match self.symbols.lookup_function("main") {
            None => self.errors.main_function_missing(),
            Some(main) => {
                if main.return_type != DataType::Int || !main.params.is_empty() {
                    let loc = main.loc;
                    self.errors.main_function_invalid(loc);
                }
            }
        }
    }
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn data_type_of(spec: TypeSpec) -> DataType {
    match spec {
        TypeSpec::Int => DataType::Int,
        TypeSpec::Void => DataType::Void,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;

    fn analyze(source: &str) -> Result<ProgramInfo, Vec<SemanticError>> {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        assert!(parser.diagnostics.is_empty(), "test source must parse");
        SemanticAnalyzer::new().analyze(&program)
    }

    fn errors_of(source: &str) -> Vec<SemanticError> {
        analyze(source).unwrap_err()
    }

    #[test]
    fn test_valid_program_passes() {
        let info = analyze("int main(void) { int x; x = 1 + 2; return x; }").unwrap();
        assert!(info.functions.contains_key("main"));
        assert_eq!(info.functions["main"].return_type, DataType::Int);
    }

    #[test]
    fn test_missing_main_is_reported() {
        let errors = errors_of("int foo(void) { return 0; }");
        assert!(errors
            .iter()
            .any(|e| e.kind == SemanticErrorKind::MainFunctionMissing));
    }

    #[test]
    fn test_invalid_main_signature() {
        let errors = errors_of("void main(void) { return; }");
        assert!(errors
            .iter()
            .any(|e| e.kind == SemanticErrorKind::MainFunctionInvalid));
    }

    #[test]
    fn test_undefined_variable() {
        let errors = errors_of("int main(void) { x = 5; return 0; }");
        assert!(errors
            .iter()
            .any(|e| e.kind == SemanticErrorKind::UndefinedVariable
                && e.message.contains("'x'")));
    }

    #[test]
    fn test_void_variable_rejected() {
        let errors = errors_of("int main(void) { void x; return 0; }");
        assert!(errors
            .iter()
            .any(|e| e.kind == SemanticErrorKind::VoidVariable));
    }

    #[test]
    fn test_redefinition_in_same_scope() {
        let errors = errors_of("int main(void) { int x; int x; return 0; }");
        assert!(errors
            .iter()
            .any(|e| e.kind == SemanticErrorKind::Redefinition));
    }

    #[test]
    fn test_shadowing_across_scopes_is_allowed() {
        assert!(analyze("int x; int main(void) { int x; x = 1; return x; }").is_ok());
    }

    #[test]
    fn test_call_arity_mismatch() {
        let errors =
            errors_of("int add(int a, int b) { return a + b; } int main(void) { return add(1); }");
        assert!(errors
            .iter()
            .any(|e| e.kind == SemanticErrorKind::FunctionSignatureMismatch));
    }

    #[test]
    fn test_forward_call_sees_signature() {
        assert!(
            analyze("int main(void) { return add(2, 3); } int add(int a, int b) { return a + b; }")
                .is_ok()
        );
    }

    #[test]
    fn test_undefined_function() {
        let errors = errors_of("int main(void) { return nope(); }");
        assert!(errors
            .iter()
            .any(|e| e.kind == SemanticErrorKind::UndefinedFunction));
    }

    #[test]
    fn test_return_type_mismatch() {
        let errors = errors_of("void f(void) { return 1; } int main(void) { f(); return 0; }");
        assert!(errors
            .iter()
            .any(|e| e.kind == SemanticErrorKind::ReturnTypeMismatch));
    }

    #[test]
    fn test_bare_return_requires_void() {
        let errors = errors_of("int main(void) { return; }");
        assert!(errors
            .iter()
            .any(|e| e.kind == SemanticErrorKind::ReturnTypeMismatch));
    }

    #[test]
    fn test_array_index_must_be_int() {
        // The bare array reference used as an index has type int[].
        let errors = errors_of("int a[4]; int main(void) { a[a] = 1; return 0; }");
        assert!(errors
            .iter()
            .any(|e| e.kind == SemanticErrorKind::ArrayIndexNotInt));
    }

    #[test]
    fn test_index_on_non_array() {
        let errors = errors_of("int main(void) { int x; x[0] = 1; return 0; }");
        assert!(errors
            .iter()
            .any(|e| e.message.contains("non-array")));
    }

    #[test]
    fn test_arrays_cannot_be_assigned() {
        let errors = errors_of("int a[4]; int b[4]; int main(void) { a = b; return 0; }");
        assert!(errors.iter().any(|e| e.message.contains("Cannot assign arrays")));
    }

    #[test]
    fn test_array_argument_passing() {
        assert!(analyze(
            "int sum(int a[], int n) { return a[n - 1]; } int a[8]; int main(void) { return sum(a, 8); }"
        )
        .is_ok());
    }

    #[test]
    fn test_scalar_to_array_param_mismatch() {
        let errors = errors_of(
            "int sum(int a[], int n) { return a[0] + n; } int main(void) { return sum(1, 2); }",
        );
        assert!(errors
            .iter()
            .any(|e| e.kind == SemanticErrorKind::TypeMismatch));
    }

    #[test]
    fn test_condition_must_be_int() {
        let errors = errors_of("int a[4]; int main(void) { if (a) return 1; return 0; }");
        assert!(errors
            .iter()
            .any(|e| e.kind == SemanticErrorKind::TypeMismatch));
    }

    #[test]
    fn test_builtins_resolve() {
        assert!(analyze("int main(void) { int x; x = input(); output(x); return 0; }").is_ok());
    }

    #[test]
    fn test_storage_info_collected() {
        let info = analyze(
            "int g; int a[16]; int main(void) { int b[4]; b[0] = 1; return a[0] + b[0] + g; }",
        )
        .unwrap();
        assert_eq!(info.global_scalars, vec!["g".to_string()]);
        assert_eq!(info.global_arrays, vec![("a".to_string(), 16)]);
        assert_eq!(info.local_arrays["main"], vec![("b".to_string(), 4)]);
    }

    #[test]
    fn test_multiple_errors_in_one_run() {
        let errors = errors_of("int main(void) { x = 1; y = 2; return 0; }");
        let undefined = errors
            .iter()
            .filter(|e| e.kind == SemanticErrorKind::UndefinedVariable)
            .count();
        assert_eq!(undefined, 2);
    }
}
