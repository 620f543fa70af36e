mod driver;

pub use driver::{CompileError, CompileMode, Driver};
