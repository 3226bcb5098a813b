//! Interactive command - answer each CC from the terminal

use super::report::{print_diagnostics, print_outcome};
use super::{compile_file, runtime_for, script_dir, RuntimeOptions};
use anyhow::{anyhow, Context, Result};
use cogito_runtime::{Status, Value};
use colored::*;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Arguments for the interactive command
#[derive(Debug, Clone, Default)]
pub struct InteractiveArgs {
    pub file: PathBuf,
    /// Parse each reply as JSON, falling back to a string
    pub json_replies: bool,
    pub profile: bool,
    pub runtime: RuntimeOptions,
}

/// Run a script, reading one line from stdin for every CC prompt
pub fn run(args: InteractiveArgs) -> Result<()> {
    let stdin = io::stdin();
    run_with_input(args, stdin.lock())
}

pub fn run_with_input(args: InteractiveArgs, mut input: impl BufRead) -> Result<()> {
    let runtime = runtime_for(&script_dir(&args.file), &args.runtime)?;
    let display_name = args.file.display().to_string();

    let report = compile_file(&runtime, &args.file)?;
    print_diagnostics(&report.warnings, &display_name);
    if !report.success {
        print_diagnostics(&report.errors, &display_name);
        return Err(anyhow!("Compilation failed with {} error(s)", report.errors.len()));
    }

    let mut execution = runtime.load(report.bytecode);
    if args.profile {
        execution.vm_mut().enable_profiling();
    }

    let mut printed = 0;
    execution.run();
    while execution.status() == Status::WaitingCc {
        for line in &execution.output()[printed..] {
            println!("{}", line);
        }
        printed = execution.output().len();

        let prompt = execution.pending_prompt().unwrap_or_default();
        print!("{} ", format!("{} >", prompt).cyan().bold());
        io::stdout().flush().context("Failed to flush stdout")?;

        let mut line = String::new();
        let read = input.read_line(&mut line).context("Failed to read reply")?;
        if read == 0 {
            return Err(anyhow!("Input closed while waiting for a reply to '{}'", prompt));
        }
        let reply = line.trim_end_matches(['\r', '\n']);

        let parsed = if args.json_replies {
            serde_json::from_str::<serde_json::Value>(reply).ok()
        } else {
            None
        };
        let resumed = match parsed {
            Some(json) => execution.resume_json(&json),
            None => execution.resume(Value::string(reply)),
        };
        resumed.context("Failed to resume")?;
    }

    if let Some(profiler) = execution.vm().profiler() {
        eprint!("{}", profiler.report());
    }
    print_outcome(execution.state(), printed, false, None)
}
