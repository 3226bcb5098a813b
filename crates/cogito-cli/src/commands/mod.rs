pub mod ast;
pub mod compile;
pub mod interactive;
pub mod report;
pub mod resume;
pub mod run;
pub mod session;

use anyhow::{Context, Result};
use cogito_config::ConfigLoader;
use cogito_runtime::{Cogito, CompileReport, VmConfig};
use std::fs;
use std::path::{Path, PathBuf};

/// Execution settings given on the command line; they override cogito.toml
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    pub max_call_depth: Option<usize>,
    pub entry: Option<String>,
    pub fs_root: Option<PathBuf>,
    pub no_fs: bool,
}

/// Build a runtime for a script located in `dir`
pub fn runtime_for(dir: &Path, options: &RuntimeOptions) -> Result<Cogito> {
    let config = ConfigLoader::new()
        .load_from_directory(dir)
        .with_context(|| format!("Failed to load configuration for {}", dir.display()))?;
    let mut runtime = Cogito::from_config(&config, dir);

    if let Some(depth) = options.max_call_depth {
        runtime = runtime.with_config(VmConfig {
            max_call_depth: depth,
        });
    }
    if let Some(entry) = &options.entry {
        runtime = runtime.with_entry(entry.clone());
    }
    if let Some(root) = &options.fs_root {
        runtime = runtime.with_fs_root(root.clone());
    }
    if options.no_fs {
        runtime = runtime.without_file_system();
    }
    Ok(runtime)
}

/// Directory a script's configuration is resolved from
pub fn script_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Compile a script file; `.json` files are read as a JSON AST
pub fn compile_file(runtime: &Cogito, file: &Path) -> Result<CompileReport> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file: {}", file.display()))?;
    let is_ast = file.extension().is_some_and(|ext| ext == "json");
    Ok(if is_ast {
        runtime.compile_ast_json(&text)
    } else {
        runtime.compile_source(&text)
    })
}
