//! Semantic diagnostics.
//!
//! Errors are collected rather than raised so a single run can surface
//! every problem in a declaration. Each error carries a message, a source
//! location, and a kind tag.

use crate::common::source::SourceLocation;
use crate::frontend::sema::symbol_table::DataType;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticErrorKind {
    UndefinedVariable,
    UndefinedFunction,
    Redefinition,
    TypeMismatch,
    ArrayIndexNotInt,
    VoidVariable,
    FunctionSignatureMismatch,
    ReturnTypeMismatch,
    MainFunctionMissing,
    MainFunctionInvalid,
}

#[derive(Debug, Clone, Error)]
#[error("Semantic Error at line {}, column {}: {message}", .location.line, .location.column)]
pub struct SemanticError {
    pub message: String,
    pub location: SourceLocation,
    pub kind: SemanticErrorKind,
}

/// Accumulates semantic errors for one analysis run.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<SemanticError>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: impl Into<String>, location: SourceLocation, kind: SemanticErrorKind) {
        self.errors.push(SemanticError {
            message: message.into(),
            location,
            kind,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<SemanticError> {
        self.errors
    }

    pub fn undefined_variable(&mut self, name: &str, loc: SourceLocation) {
        self.add(
            format!("Undefined variable '{name}'"),
            loc,
            SemanticErrorKind::UndefinedVariable,
        );
    }

    pub fn undefined_function(&mut self, name: &str, loc: SourceLocation) {
        self.add(
            format!("Undefined function '{name}'"),
            loc,
            SemanticErrorKind::UndefinedFunction,
        );
    }

    pub fn redefinition(&mut self, name: &str, loc: SourceLocation) {
        self.add(
            format!("Redefinition of '{name}'"),
            loc,
            SemanticErrorKind::Redefinition,
        );
    }

    pub fn type_mismatch(&mut self, expected: DataType, actual: DataType, loc: SourceLocation) {
        self.add(
            format!("Type mismatch: expected {expected}, got {actual}"),
            loc,
            SemanticErrorKind::TypeMismatch,
        );
    }

    pub fn array_index_not_int(&mut self, loc: SourceLocation) {
        self.add(
            "Array index must be of type int",
            loc,
            SemanticErrorKind::ArrayIndexNotInt,
        );
    }

    pub fn void_variable(&mut self, name: &str, loc: SourceLocation) {
        self.add(
            format!("Variable '{name}' cannot be of type void"),
            loc,
            SemanticErrorKind::VoidVariable,
        );
    }

    pub fn function_signature_mismatch(&mut self, name: &str, loc: SourceLocation) {
        self.add(
            format!("Function call '{name}' does not match any declaration"),
            loc,
            SemanticErrorKind::FunctionSignatureMismatch,
        );
    }

    pub fn return_type_mismatch(&mut self, expected: DataType, actual: DataType, loc: SourceLocation) {
        self.add(
            format!("Return type mismatch: expected {expected}, got {actual}"),
            loc,
            SemanticErrorKind::ReturnTypeMismatch,
        );
    }

    pub fn main_function_missing(&mut self) {
        self.add(
            "Program must have a main function",
            SourceLocation::default(),
            SemanticErrorKind::MainFunctionMissing,
        );
    }

    pub fn main_function_invalid(&mut self, loc: SourceLocation) {
        self.add(
            "Main function must have signature: int main(void)",
            loc,
            SemanticErrorKind::MainFunctionInvalid,
        );
    }
}
