pub mod analyzer;
pub mod errors;
pub mod symbol_table;

pub use analyzer::{FunctionInfo, ParamInfo, ProgramInfo, SemanticAnalyzer};
pub use errors::{ErrorCollector, SemanticError, SemanticErrorKind};
pub use symbol_table::{DataType, FunctionSymbol, Symbol, SymbolTable, VariableSymbol};
