use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;

/// Cogito compiler and suspendable VM.
///
/// Runs scripts written in a small JavaScript subset. A script that calls
/// CC(prompt) suspends; its state is saved so it can be resumed later with
/// the reply.
///
/// EXAMPLES:
///     cogito run main.js                 Run until completion or the first CC
///     cogito resume main.state.json 42   Answer the pending CC
///     cogito interactive main.js         Answer each CC from the terminal
///     cogito compile main.js             Show the bytecode
///
/// ENVIRONMENT VARIABLES:
///     COGITO_JSON            Set to 'true' for JSON output by default
///     COGITO_MAX_CALL_DEPTH  Override vm.max_call_depth
///     COGITO_ENTRY           Override vm.entry
///     COGITO_FS_ROOT         Override fs.root
///     COGITO_FS_DISABLED     Set to '1' to disable filesystem built-ins
///     NO_COLOR               Set to disable colored output
#[derive(Parser)]
#[command(name = "cogito")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Execution settings shared by the commands that run code
#[derive(Args, Debug, Clone, Default)]
struct RuntimeFlags {
    /// Maximum nested function calls
    #[arg(long)]
    max_call_depth: Option<usize>,
    /// Function invoked when top-level code never calls it
    #[arg(long)]
    entry: Option<String>,
    /// Sandbox root for listFiles/readFile/writeFile
    #[arg(long)]
    fs_root: Option<PathBuf>,
    /// Disable the filesystem built-ins
    #[arg(long, conflicts_with = "fs_root")]
    no_fs: bool,
}

impl From<RuntimeFlags> for commands::RuntimeOptions {
    fn from(flags: RuntimeFlags) -> Self {
        Self {
            max_call_depth: flags.max_call_depth,
            entry: flags.entry,
            fs_root: flags.fs_root,
            no_fs: flags.no_fs,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script
    ///
    /// Executes until the program completes, fails or suspends at CC. A
    /// suspended execution is written to a state file.
    ///
    /// EXAMPLES:
    ///     cogito run main.js                    Run a program
    ///     cogito run main.js --state s.json     Choose the state file
    ///     cogito run main.js --profile          Print opcode statistics
    #[command(visible_alias = "r")]
    Run {
        /// Script file (.js source or .json AST)
        file: PathBuf,
        /// State file written on suspension (default: <file>.state.json)
        #[arg(long, short = 's')]
        state: Option<PathBuf>,
        /// Output the outcome as JSON
        #[arg(long, env = "COGITO_JSON")]
        json: bool,
        /// Verbose output with timing information
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Enable the VM profiler
        #[arg(long)]
        profile: bool,
        #[command(flatten)]
        runtime: RuntimeFlags,
    },

    /// Resume a suspended execution with a reply
    ///
    /// EXAMPLES:
    ///     cogito resume main.state.json Ada          Reply with a string
    ///     cogito resume main.state.json '[1,2]' --json-reply
    Resume {
        /// State file written by `run` or a previous `resume`
        state: PathBuf,
        /// Reply delivered as the value of the pending CC
        reply: String,
        /// Parse the reply as JSON
        #[arg(long)]
        json_reply: bool,
        /// Output the outcome as JSON
        #[arg(long, env = "COGITO_JSON")]
        json: bool,
        /// Verbose output with timing information
        #[arg(long, short = 'v')]
        verbose: bool,
        #[command(flatten)]
        runtime: RuntimeFlags,
    },

    /// Run a script, answering each CC from standard input
    #[command(visible_alias = "i")]
    Interactive {
        /// Script file (.js source or .json AST)
        file: PathBuf,
        /// Parse replies as JSON when possible
        #[arg(long)]
        json_replies: bool,
        /// Enable the VM profiler
        #[arg(long)]
        profile: bool,
        #[command(flatten)]
        runtime: RuntimeFlags,
    },

    /// Compile a script and show its bytecode
    ///
    /// EXAMPLES:
    ///     cogito compile main.js                 Disassemble
    ///     cogito compile main.js --json          Full compile report
    ///     cogito compile main.js -o main.bc.json Save the bytecode
    #[command(visible_alias = "c")]
    Compile {
        /// Script file (.js source or .json AST)
        file: PathBuf,
        /// Output the compile report as JSON
        #[arg(long, env = "COGITO_JSON")]
        json: bool,
        /// Write the bytecode JSON to a file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[command(flatten)]
        runtime: RuntimeFlags,
    },

    /// Dump the AST of a script as JSON
    Ast {
        /// Script source file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cli_config = config::Config::from_env();
    cli_config.apply();

    match cli.command {
        Commands::Run {
            file,
            state,
            json,
            verbose,
            profile,
            runtime,
        } => {
            commands::run::run(commands::run::RunArgs {
                file,
                state_file: state,
                json: json || cli_config.default_json,
                verbose,
                profile,
                runtime: runtime.into(),
            })?;
        }
        Commands::Resume {
            state,
            reply,
            json_reply,
            json,
            verbose,
            runtime,
        } => {
            commands::resume::run(commands::resume::ResumeArgs {
                state_file: state,
                reply,
                json_reply,
                json: json || cli_config.default_json,
                verbose,
                runtime: runtime.into(),
            })?;
        }
        Commands::Interactive {
            file,
            json_replies,
            profile,
            runtime,
        } => {
            commands::interactive::run(commands::interactive::InteractiveArgs {
                file,
                json_replies,
                profile,
                runtime: runtime.into(),
            })?;
        }
        Commands::Compile {
            file,
            json,
            output,
            runtime,
        } => {
            commands::compile::run(commands::compile::CompileArgs {
                file,
                json: json || cli_config.default_json,
                output,
                runtime: runtime.into(),
            })?;
        }
        Commands::Ast { file } => commands::ast::run(&file)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_json_flag() {
        let cli = Cli::parse_from(["cogito", "run", "main.js", "--json"]);
        match cli.command {
            Commands::Run { json, .. } => assert!(json),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_runtime_flags() {
        let cli = Cli::parse_from([
            "cogito",
            "run",
            "main.js",
            "--max-call-depth",
            "8",
            "--entry",
            "start",
            "--no-fs",
        ]);
        match cli.command {
            Commands::Run { runtime, .. } => {
                assert_eq!(runtime.max_call_depth, Some(8));
                assert_eq!(runtime.entry.as_deref(), Some("start"));
                assert!(runtime.no_fs);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_fs_root_conflicts_with_no_fs() {
        let result = Cli::try_parse_from(["cogito", "run", "a.js", "--fs-root", ".", "--no-fs"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_resume_arguments() {
        let cli = Cli::parse_from(["cogito", "resume", "s.json", "[1]", "--json-reply"]);
        match cli.command {
            Commands::Resume {
                state,
                reply,
                json_reply,
                ..
            } => {
                assert_eq!(state, PathBuf::from("s.json"));
                assert_eq!(reply, "[1]");
                assert!(json_reply);
            }
            _ => panic!("Expected Resume command"),
        }
    }

    #[test]
    fn test_aliases() {
        assert!(matches!(
            Cli::parse_from(["cogito", "r", "main.js"]).command,
            Commands::Run { .. }
        ));
        assert!(matches!(
            Cli::parse_from(["cogito", "i", "main.js"]).command,
            Commands::Interactive { .. }
        ));
        assert!(matches!(
            Cli::parse_from(["cogito", "c", "main.js"]).command,
            Commands::Compile { .. }
        ));
    }
}
