//! Presenting compile diagnostics and execution outcomes

use anyhow::{anyhow, Result};
use cogito_runtime::value::to_display_string;
use cogito_runtime::{Diagnostic, DiagnosticLevel, ExecutionState, Status};
use colored::*;
use serde::Serialize;
use std::path::Path;

/// `file:line:col: error[code]: message`
pub fn format_diagnostic(diag: &Diagnostic, file: &str) -> String {
    let level = match diag.level {
        DiagnosticLevel::Error => format!("error[{}]", diag.code).red().bold(),
        DiagnosticLevel::Warning => format!("warning[{}]", diag.code).yellow().bold(),
    };
    format!("{}:{}:{}: {}: {}", file, diag.line, diag.column, level, diag.message)
}

pub fn print_diagnostics(diagnostics: &[Diagnostic], file: &str) {
    for diag in diagnostics {
        eprintln!("{}", format_diagnostic(diag, file));
    }
}

/// Machine-readable execution outcome
#[derive(Debug, Serialize)]
pub struct Outcome<'a> {
    pub status: Status,
    /// Lines printed since the previous stop
    pub output: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a cogito_runtime::RuntimeError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<String>,
}

/// Print what happened since output line `printed`
///
/// Fails when the execution ended in a runtime error.
pub fn print_outcome(
    state: &ExecutionState,
    printed: usize,
    json: bool,
    state_file: Option<&Path>,
) -> Result<()> {
    let new_output = state.output.get(printed..).unwrap_or(&[]);
    let state_file = state_file.map(|p| p.display().to_string());

    if json {
        let result = match &state.result {
            Some(value) if state.status == Status::Completed => {
                Some(to_display_string(value, &state.heap).map_err(|e| anyhow!("{}", e))?)
            }
            _ => None,
        };
        let outcome = Outcome {
            status: state.status,
            output: new_output,
            prompt: state.pending_prompt.as_deref(),
            error: state.error.as_ref(),
            result,
            state_file,
        };
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        for line in new_output {
            println!("{}", line);
        }
        if let (Status::WaitingCc, Some(prompt)) = (state.status, state.pending_prompt.as_deref()) {
            eprintln!("{} {}", "waiting for reply:".cyan().bold(), prompt);
            if let Some(path) = &state_file {
                eprintln!("resume with: cogito resume {} <reply>", path);
            }
        }
    }

    match (&state.status, &state.error) {
        (Status::Error, Some(error)) => {
            if !json {
                let location = error
                    .line
                    .map(|line| format!(" (line {})", line))
                    .unwrap_or_default();
                eprintln!("{} {}{}", "runtime error:".red().bold(), error, location);
            }
            Err(anyhow!("Program failed with a {} error", error.kind))
        }
        (Status::Error, None) => Err(anyhow!("Program failed")),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogito_runtime::Span;

    #[test]
    fn test_format_diagnostic() {
        colored::control::set_override(false);
        let diag = Diagnostic::error_with_code("CG2001", "'break' not in loop", Span::new(0, 5, 2, 3));
        assert_eq!(
            format_diagnostic(&diag, "main.js"),
            "main.js:2:3: error[CG2001]: 'break' not in loop"
        );
    }

    #[test]
    fn test_runtime_error_fails_outcome() {
        let mut execution = cogito_runtime::Cogito::new().start("missing();").unwrap();
        let state = execution.run();
        assert!(print_outcome(state, 0, true, None).is_err());
    }
}
