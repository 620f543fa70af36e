//! Nested-scope symbol table.
//!
//! Scopes form a tree; each scope maps names to symbols and refers to its
//! parent. The tree is stored as a flat arena of scopes addressed by index,
//! which keeps the parent back-references free of ownership cycles. Lookup
//! walks the parent chain; declaration fails if the current scope already
//! binds the name.

use crate::common::source::SourceLocation;
use rustc_hash::FxHashMap;

/// Data types known to the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int,
    Void,
    IntArray,
    Unknown,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataType::Int => "int",
            DataType::Void => "void",
            DataType::IntArray => "int[]",
            DataType::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct VariableSymbol {
    pub data_type: DataType,
    pub is_array: bool,
    pub array_size: Option<i64>,
    pub is_parameter: bool,
    pub scope_level: u32,
}

impl VariableSymbol {
    /// The type a bare reference to this symbol yields. A non-indexed
    /// reference to an array is the array itself.
    pub fn reference_type(&self) -> DataType {
        if self.is_array {
            DataType::IntArray
        } else {
            self.data_type
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionParam {
    pub name: String,
    pub data_type: DataType,
    pub is_array: bool,
}

impl FunctionParam {
    pub fn param_type(&self) -> DataType {
        if self.is_array {
            DataType::IntArray
        } else {
            self.data_type
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionSymbol {
    pub return_type: DataType,
    pub params: Vec<FunctionParam>,
    pub is_defined: bool,
    pub is_builtin: bool,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub enum Symbol {
    Variable(VariableSymbol),
    Function(FunctionSymbol),
}

struct Scope {
    symbols: FxHashMap<String, Symbol>,
    parent: Option<usize>,
    level: u32,
}

pub struct SymbolTable {
    scopes: Vec<Scope>,
    current: usize,
}

impl SymbolTable {
    /// Create a table whose root scope is pre-populated with the built-ins
    /// `int input(void)` and `void output(int)`.
    pub fn new() -> Self {
        let mut table = Self {
            scopes: vec![Scope {
                symbols: FxHashMap::default(),
                parent: None,
                level: 0,
            }],
            current: 0,
        };
        table.declare(
            "input",
            Symbol::Function(FunctionSymbol {
                return_type: DataType::Int,
                params: Vec::new(),
                is_defined: true,
                is_builtin: true,
                loc: SourceLocation::default(),
            }),
        );
        table.declare(
            "output",
            Symbol::Function(FunctionSymbol {
                return_type: DataType::Void,
                params: vec![FunctionParam {
                    name: "value".to_string(),
                    data_type: DataType::Int,
                    is_array: false,
                }],
                is_defined: true,
                is_builtin: true,
                loc: SourceLocation::default(),
            }),
        );
        table
    }

    pub fn enter_scope(&mut self) {
        let level = self.scopes[self.current].level + 1;
        self.scopes.push(Scope {
            symbols: FxHashMap::default(),
            parent: Some(self.current),
            level,
        });
        self.current = self.scopes.len() - 1;
    }

    pub fn exit_scope(&mut self) {
        if let Some(parent) = self.scopes[self.current].parent {
            self.current = parent;
        }
    }

    pub fn scope_level(&self) -> u32 {
        self.scopes[self.current].level
    }

    /// Bind `name` in the current scope. Returns false if the scope
    /// already binds it.
    pub fn declare(&mut self, name: &str, symbol: Symbol) -> bool {
        let scope = &mut self.scopes[self.current];
        if scope.symbols.contains_key(name) {
            return false;
        }
        scope.symbols.insert(name.to_string(), symbol);
        true
    }

    /// Look up `name` starting at the current scope and walking the parent
    /// chain.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        let mut idx = Some(self.current);
        while let Some(i) = idx {
            if let Some(sym) = self.scopes[i].symbols.get(name) {
                return Some(sym);
            }
            idx = self.scopes[i].parent;
        }
        None
    }

    pub fn lookup_variable(&self, name: &str) -> Option<&VariableSymbol> {
        match self.lookup(name) {
            Some(Symbol::Variable(v)) => Some(v),
            _ => None,
        }
    }

    pub fn lookup_function(&self, name: &str) -> Option<&FunctionSymbol> {
        match self.lookup(name) {
            Some(Symbol::Function(f)) => Some(f),
            _ => None,
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
