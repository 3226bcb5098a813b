//! AST dump command - output the parsed program as JSON

use super::report::print_diagnostics;
use anyhow::{anyhow, Context, Result};
use cogito_runtime::{parse_source, VersionedProgram};
use std::fs;
use std::path::Path;

/// Parse a script and print its AST as JSON
///
/// The output is accepted back by `compile` and `run` as a `.json` script.
pub fn run(file: &Path) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file: {}", file.display()))?;

    let (program, diagnostics) = parse_source(&source);
    let (errors, warnings): (Vec<_>, Vec<_>) =
        diagnostics.into_iter().partition(|d| d.is_error());
    let name = file.display().to_string();
    print_diagnostics(&warnings, &name);
    if !errors.is_empty() {
        print_diagnostics(&errors, &name);
        return Err(anyhow!("Parsing failed with {} error(s)", errors.len()));
    }

    let versioned = VersionedProgram::new(program);
    println!("{}", versioned.to_json()?);
    Ok(())
}
