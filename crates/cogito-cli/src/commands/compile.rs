//! Compile command - report diagnostics and show the bytecode

use super::report::print_diagnostics;
use super::{compile_file, runtime_for, script_dir, RuntimeOptions};
use anyhow::{anyhow, Context, Result};
use cogito_runtime::disassemble;
use std::fs;
use std::path::PathBuf;

/// Arguments for the compile command
#[derive(Debug, Clone, Default)]
pub struct CompileArgs {
    pub file: PathBuf,
    /// Print the full compile report as JSON
    pub json: bool,
    /// Write the bytecode JSON to this file
    pub output: Option<PathBuf>,
    pub runtime: RuntimeOptions,
}

/// Compile a script without running it
pub fn run(args: CompileArgs) -> Result<()> {
    let runtime = runtime_for(&script_dir(&args.file), &args.runtime)?;
    let display_name = args.file.display().to_string();
    let report = compile_file(&runtime, &args.file)?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print_diagnostics(&report.warnings, &display_name);
        print_diagnostics(&report.errors, &display_name);
    }
    if !report.success {
        return Err(anyhow!("Compilation failed with {} error(s)", report.errors.len()));
    }

    if let Some(path) = &args.output {
        fs::write(path, report.bytecode.to_json()?)
            .with_context(|| format!("Failed to write bytecode to {}", path.display()))?;
    } else if !args.json {
        print!("{}", disassemble(&report.bytecode));
    }
    Ok(())
}
