//! Resume command - answer the pending CC of a saved execution

use super::report::print_outcome;
use super::session::SavedExecution;
use super::{runtime_for, script_dir, RuntimeOptions};
use anyhow::{Context, Result};
use cogito_runtime::Value;
use std::path::PathBuf;
use std::time::Instant;

/// Arguments for the resume command
#[derive(Debug, Clone, Default)]
pub struct ResumeArgs {
    pub state_file: PathBuf,
    pub reply: String,
    /// Parse the reply as JSON instead of passing it as a string
    pub json_reply: bool,
    pub json: bool,
    pub verbose: bool,
    pub runtime: RuntimeOptions,
}

/// Resume a saved execution and rewrite its state file
pub fn run(args: ResumeArgs) -> Result<()> {
    let saved = SavedExecution::load(&args.state_file)?;
    let config_dir = saved
        .source
        .as_deref()
        .map(script_dir)
        .unwrap_or_else(|| script_dir(&args.state_file));
    let runtime = runtime_for(&config_dir, &args.runtime)?;

    let printed = saved.snapshot.state.output.len();
    let mut execution = runtime
        .restore(saved.bytecode, saved.snapshot)
        .context("Cannot resume this state file")?;

    let start = Instant::now();
    let resumed = if args.json_reply {
        let reply: serde_json::Value =
            serde_json::from_str(&args.reply).context("Reply is not valid JSON")?;
        execution.resume_json(&reply)
    } else {
        execution.resume(Value::String(args.reply.clone()))
    };
    resumed.context("Cannot resume this state file")?;
    if args.verbose {
        eprintln!("Resumed in {:.2?}, status: {}", start.elapsed(), execution.status());
    }

    SavedExecution {
        source: saved.source,
        bytecode: execution.bytecode().clone(),
        snapshot: execution.snapshot(),
    }
    .save(&args.state_file)?;

    print_outcome(
        execution.state(),
        printed,
        args.json,
        Some(args.state_file.as_path()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::run::{self, RunArgs};
    use crate::commands::session::default_state_path;
    use cogito_runtime::Status;
    use std::fs;

    #[test]
    fn test_resume_completes_and_second_resume_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ask.js");
        fs::write(&file, "let n = CC('n?'); print(n * 2);").unwrap();
        run::run(RunArgs {
            file: file.clone(),
            ..RunArgs::default()
        })
        .unwrap();

        let state_file = default_state_path(&file);
        let args = ResumeArgs {
            state_file: state_file.clone(),
            reply: "21".to_string(),
            json_reply: true,
            ..ResumeArgs::default()
        };
        run(args.clone()).unwrap();

        let saved = SavedExecution::load(&state_file).unwrap();
        assert_eq!(saved.snapshot.state.status, Status::Completed);
        assert_eq!(saved.snapshot.state.output, vec!["42".to_string()]);

        assert!(run(args).is_err());
    }
}
