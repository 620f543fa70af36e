//! The compiler driver orchestrates the compilation phases.
//!
//! Phases run strictly in order — lex, parse, semantic analysis, IR
//! generation, optimization, CFG construction, assembly emission — each
//! consuming the previous phase's artifact. The driver halts after the
//! first phase that accumulates errors and reports the collected
//! diagnostics on stderr; later phases never run on a failed artifact.
//!
//! Set `CMMC_TIME_PHASES=1` in the environment to print per-phase timing
//! to stderr.

use crate::backend::x86::AsmGenerator;
use crate::frontend::lexer::{LexError, Lexer};
use crate::frontend::parser::Parser;
use crate::frontend::sema::SemanticAnalyzer;
use crate::ir::cfg::ControlFlowGraph;
use crate::ir::gen::IrGenerator;
use crate::ir::ir::listing_to_string;
use crate::passes::run_passes;
use thiserror::Error;

/// Where in the pipeline to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    /// Assemble and link to an executable (default).
    Executable,
    /// -S: stop after generating assembly, output a .s file.
    AssemblyOnly,
    /// -c: stop after assembling, output a .o file.
    ObjectOnly,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Cannot read {path}: {message}")]
    Io { path: String, message: String },
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("{count} parse error(s)")]
    Parse { count: usize },
    #[error("{count} semantic error(s)")]
    Semantic { count: usize },
    #[error("Cannot write {path}: {message}")]
    Output { path: String, message: String },
    #[error("Assembly failed: {0}")]
    Assemble(String),
    #[error("Linking failed: {0}")]
    Link(String),
}

pub struct Driver {
    pub opt_level: u32,
    pub mode: CompileMode,
    pub output_path: String,
    pub output_path_set: bool,
    pub verbose: bool,
    pub print_stages: bool,
    pub print_ir: bool,
    pub print_cfg: bool,
    pub print_asm: bool,
    pub keep_intermediate: bool,
}

impl Driver {
    pub fn new() -> Self {
        Self {
            opt_level: 0,
            mode: CompileMode::Executable,
            output_path: "a.out".to_string(),
            output_path_set: false,
            verbose: false,
            print_stages: false,
            print_ir: false,
            print_cfg: false,
            print_asm: false,
            keep_intermediate: false,
        }
    }

    /// Compile one source file to the configured output artifact.
    pub fn run(&self, input_file: &str) -> Result<(), CompileError> {
        let source = std::fs::read_to_string(input_file).map_err(|e| CompileError::Io {
            path: input_file.to_string(),
            message: e.to_string(),
        })?;

        let asm = self.compile_source(&source)?;
        let out_path = self.output_for_input(input_file);

        match self.mode {
            CompileMode::AssemblyOnly => {
                write_file(&out_path, &asm)?;
                if self.verbose {
                    eprintln!("Assembly output: {out_path}");
                }
            }
            CompileMode::ObjectOnly => {
                let asm_path = self.temp_path(input_file, ".s");
                write_file(&asm_path, &asm)?;
                let result = assemble(&asm_path, &out_path);
                self.cleanup(&[asm_path]);
                result?;
                if self.verbose {
                    eprintln!("Object output: {out_path}");
                }
            }
            CompileMode::Executable => {
                let asm_path = self.temp_path(input_file, ".s");
                let obj_path = self.temp_path(input_file, ".o");
                write_file(&asm_path, &asm)?;
                let result = assemble(&asm_path, &obj_path).and_then(|_| link(&obj_path, &out_path));
                self.cleanup(&[asm_path, obj_path]);
                result?;
                if self.verbose {
                    eprintln!("Output: {out_path}");
                }
            }
        }
        Ok(())
    }

    /// Core pipeline: lex, parse, sema, lower, optimize, build the CFG,
    /// emit assembly. Returns the assembly text.
    pub fn compile_source(&self, source: &str) -> Result<String, CompileError> {
        let time_phases = std::env::var("CMMC_TIME_PHASES").is_ok();
        let t0 = std::time::Instant::now();

        // Lex
        let tokens = Lexer::new(source).tokenize().map_err(|e| {
            eprintln!("error: {} (line {}, column {})", e, e.line, e.column);
            e
        })?;
        if time_phases {
            eprintln!("[TIME] lex: {:.3}s ({} tokens)", t0.elapsed().as_secs_f64(), tokens.len());
        }
        if self.print_stages {
            println!("Lexical Analysis: {} tokens", tokens.len());
        }

        // Parse
        let t1 = std::time::Instant::now();
        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        if time_phases {
            eprintln!("[TIME] parse: {:.3}s", t1.elapsed().as_secs_f64());
        }
        if !parser.diagnostics.is_empty() {
            for diag in &parser.diagnostics {
                eprintln!("{diag}");
            }
            return Err(CompileError::Parse {
                count: parser.diagnostics.len(),
            });
        }
        if self.print_stages {
            println!(
                "Syntax Analysis: {} declaration(s)",
                program.declarations.len()
            );
        }

        // Semantic analysis
        let t2 = std::time::Instant::now();
        let info = SemanticAnalyzer::new().analyze(&program).map_err(|errors| {
            for error in &errors {
                eprintln!("{error}");
            }
            CompileError::Semantic {
                count: errors.len(),
            }
        })?;
        if time_phases {
            eprintln!("[TIME] sema: {:.3}s", t2.elapsed().as_secs_f64());
        }
        if self.print_stages {
            println!("Semantic Analysis: passed");
        }

        // IR generation
        let t3 = std::time::Instant::now();
        let mut listing = IrGenerator::new().generate(&program);
        if time_phases {
            eprintln!(
                "[TIME] ir gen: {:.3}s ({} instructions)",
                t3.elapsed().as_secs_f64(),
                listing.len()
            );
        }
        if self.print_ir {
            println!("=== Generated IR ===");
            print!("{}", listing_to_string(&listing));
            println!("====================");
        }

        // Optimization
        let t4 = std::time::Instant::now();
        let before = listing.len();
        run_passes(&mut listing, self.opt_level);
        if time_phases {
            eprintln!("[TIME] optimize: {:.3}s", t4.elapsed().as_secs_f64());
        }
        if self.print_stages {
            println!(
                "Optimization: O{} ({} -> {} instructions)",
                self.opt_level,
                before,
                listing.len()
            );
        }
        if self.print_ir && self.opt_level > 0 {
            println!("=== Optimized IR ===");
            print!("{}", listing_to_string(&listing));
            println!("====================");
        }

        // CFG construction
        let t5 = std::time::Instant::now();
        let cfg = ControlFlowGraph::build(&listing);
        if time_phases {
            eprintln!(
                "[TIME] cfg: {:.3}s ({} blocks)",
                t5.elapsed().as_secs_f64(),
                cfg.blocks.len()
            );
        }
        if self.print_cfg {
            print!("{}", cfg.to_dot());
        }
        if self.verbose {
            eprintln!("CFG: {} basic blocks", cfg.blocks.len());
        }

        // Assembly emission
        let t6 = std::time::Instant::now();
        let asm = AsmGenerator::new(&info).generate(&listing);
        if time_phases {
            eprintln!(
                "[TIME] codegen: {:.3}s ({} bytes asm)",
                t6.elapsed().as_secs_f64(),
                asm.len()
            );
            eprintln!("[TIME] total: {:.3}s", t0.elapsed().as_secs_f64());
        }
        if self.print_asm {
            print!("{asm}");
        }

        Ok(asm)
    }

    /// Output path for an input file, honoring an explicit -o.
    fn output_for_input(&self, input_file: &str) -> String {
        if self.output_path_set {
            return self.output_path.clone();
        }
        let stem = std::path::Path::new(input_file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("a");
        match self.mode {
            CompileMode::AssemblyOnly => format!("{stem}.s"),
            CompileMode::ObjectOnly => format!("{stem}.o"),
            CompileMode::Executable => self.output_path.clone(),
        }
    }

    fn temp_path(&self, input_file: &str, suffix: &str) -> String {
        let stem = std::path::Path::new(input_file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("out");
        format!("/tmp/cmmc_{}_{stem}{suffix}", std::process::id())
    }

    fn cleanup(&self, paths: &[String]) {
        if self.keep_intermediate {
            return;
        }
        for path in paths {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

fn write_file(path: &str, contents: &str) -> Result<(), CompileError> {
    std::fs::write(path, contents).map_err(|e| CompileError::Output {
        path: path.to_string(),
        message: e.to_string(),
    })
}

/// Run the system assembler on a .s file.
fn assemble(asm_path: &str, obj_path: &str) -> Result<(), CompileError> {
    let output = std::process::Command::new("as")
        .args(["-64", asm_path, "-o", obj_path])
        .output()
        .map_err(|e| CompileError::Assemble(e.to_string()))?;
    if !output.status.success() {
        return Err(CompileError::Assemble(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    Ok(())
}

/// Link an object file into a standalone executable.
fn link(obj_path: &str, out_path: &str) -> Result<(), CompileError> {
    let output = std::process::Command::new("ld")
        .args([obj_path, "-o", out_path])
        .output()
        .map_err(|e| CompileError::Link(e.to_string()))?;
    if !output.status.success() {
        return Err(CompileError::Link(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    Ok(())
}
