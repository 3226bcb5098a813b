//! Run command - execute a script until it completes or suspends

use super::report::{print_diagnostics, print_outcome};
use super::session::{default_state_path, SavedExecution};
use super::{compile_file, runtime_for, script_dir, RuntimeOptions};
use anyhow::{anyhow, Result};
use cogito_runtime::Status;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Arguments for the run command
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub file: PathBuf,
    /// Where to save the execution if it suspends
    pub state_file: Option<PathBuf>,
    pub json: bool,
    pub verbose: bool,
    pub profile: bool,
    pub runtime: RuntimeOptions,
}

/// Run a script
///
/// A suspended execution is saved to the state file for `cogito resume`.
pub fn run(args: RunArgs) -> Result<()> {
    let runtime = runtime_for(&script_dir(&args.file), &args.runtime)?;
    let display_name = args.file.display().to_string();

    let start = Instant::now();
    let report = compile_file(&runtime, &args.file)?;
    if args.verbose {
        eprintln!("Compiled {} in {:.2?}", display_name, start.elapsed());
    }
    print_diagnostics(&report.warnings, &display_name);
    if !report.success {
        if args.json {
            println!("{}", report.to_json()?);
        } else {
            print_diagnostics(&report.errors, &display_name);
        }
        return Err(anyhow!("Compilation failed with {} error(s)", report.errors.len()));
    }

    let mut execution = runtime.load(report.bytecode);
    if args.profile {
        execution.vm_mut().enable_profiling();
    }

    let start = Instant::now();
    execution.run();
    if args.verbose {
        eprintln!("Executed in {:.2?}, status: {}", start.elapsed(), execution.status());
    }
    if let Some(profiler) = execution.vm().profiler() {
        eprint!("{}", profiler.report());
    }

    let state_file = if execution.status() == Status::WaitingCc {
        let path = args
            .state_file
            .clone()
            .unwrap_or_else(|| default_state_path(&args.file));
        save(&args.file, &execution, &path)?;
        Some(path)
    } else {
        None
    };

    print_outcome(execution.state(), 0, args.json, state_file.as_deref())
}

fn save(source: &Path, execution: &cogito_runtime::Execution, path: &Path) -> Result<()> {
    SavedExecution {
        source: Some(source.to_path_buf()),
        bytecode: execution.bytecode().clone(),
        snapshot: execution.snapshot(),
    }
    .save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn args_for(file: PathBuf) -> RunArgs {
        RunArgs {
            file,
            ..RunArgs::default()
        }
    }

    #[test]
    fn test_run_completes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.js");
        fs::write(&file, "print(1 + 2);").unwrap();
        assert!(run(args_for(file)).is_ok());
    }

    #[test]
    fn test_run_missing_file() {
        assert!(run(args_for(PathBuf::from("nonexistent.js"))).is_err());
    }

    #[test]
    fn test_suspension_writes_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ask.js");
        fs::write(&file, "let x = CC('name?'); print(x);").unwrap();
        run(args_for(file.clone())).unwrap();

        let saved = SavedExecution::load(&default_state_path(&file)).unwrap();
        assert_eq!(saved.snapshot.state.status, Status::WaitingCc);
        assert_eq!(saved.snapshot.state.pending_prompt.as_deref(), Some("name?"));
    }

    #[test]
    fn test_runtime_error_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.js");
        fs::write(&file, "let o = null; o.x;").unwrap();
        assert!(run(args_for(file)).is_err());
    }
}
