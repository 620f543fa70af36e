//! C-- compiler command line.

use anyhow::Result;
use clap::Parser;
use cmmc::driver::{CompileMode, Driver};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cmmc")]
#[command(about = "A compiler for the C-- language targeting x86-64", version)]
struct Cli {
    /// Input source file
    input: PathBuf,

    /// Output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Optimization level
    #[arg(short = 'O', default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=3))]
    opt_level: u32,

    /// Stop after generating assembly (.s)
    #[arg(short = 'S', long)]
    assembly: bool,

    /// Stop after assembling (.o)
    #[arg(short = 'c', long)]
    object: bool,

    /// Verbose phase reporting on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Print a summary line per compilation stage
    #[arg(long)]
    print_stages: bool,

    /// Print the intermediate representation
    #[arg(long)]
    print_ir: bool,

    /// Print the control-flow graph in DOT format
    #[arg(long)]
    print_cfg: bool,

    /// Print the generated assembly
    #[arg(long)]
    print_asm: bool,

    /// Keep intermediate .s/.o files
    #[arg(long)]
    keep_intermediate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut driver = Driver::new();
    driver.opt_level = cli.opt_level;
    driver.verbose = cli.verbose;
    driver.print_stages = cli.print_stages;
    driver.print_ir = cli.print_ir;
    driver.print_cfg = cli.print_cfg;
    driver.print_asm = cli.print_asm;
    driver.keep_intermediate = cli.keep_intermediate;
    driver.mode = if cli.assembly {
        CompileMode::AssemblyOnly
    } else if cli.object {
        CompileMode::ObjectOnly
    } else {
        CompileMode::Executable
    };
    if let Some(output) = cli.output {
        driver.output_path = output.to_string_lossy().into_owned();
        driver.output_path_set = true;
    }

    let input = cli.input.to_string_lossy();
    driver.run(&input)?;
    Ok(())
}
