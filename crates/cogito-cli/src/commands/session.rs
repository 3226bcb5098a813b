//! Saved executions
//!
//! A suspended execution is persisted as one JSON file holding the bytecode
//! and the snapshot taken from it, so `resume` needs nothing else.

use anyhow::{Context, Result};
use cogito_runtime::{Bytecode, Snapshot};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Contents of a state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedExecution {
    /// Script the execution was started from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    pub bytecode: Bytecode,
    pub snapshot: Snapshot,
}

impl SavedExecution {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid state file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize execution")?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write state file: {}", path.display()))
    }
}

/// Default state file for a script: `main.js` -> `main.state.json`
pub fn default_state_path(script: &Path) -> PathBuf {
    script.with_extension("state.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogito_runtime::Cogito;
    use std::path::Path;

    #[test]
    fn test_default_state_path() {
        assert_eq!(
            default_state_path(Path::new("dir/main.js")),
            Path::new("dir/main.state.json")
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let mut execution = Cogito::new().start("CC('q');").unwrap();
        execution.run();
        let saved = SavedExecution {
            source: None,
            bytecode: execution.bytecode().clone(),
            snapshot: execution.snapshot(),
        };
        saved.save(&path).unwrap();

        let loaded = SavedExecution::load(&path).unwrap();
        assert_eq!(loaded.snapshot, saved.snapshot);
        assert_eq!(loaded.bytecode.fingerprint(), saved.bytecode.fingerprint());
    }

    #[test]
    fn test_fractional_literals_restore_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let runtime = Cogito::new();
        let mut execution = runtime
            .start("let x = 0.22121212121212122; let y = x / 3; CC('q'); print(x, y * 3);")
            .unwrap();
        execution.run();
        let expected_y = 0.22121212121212122_f64 / 3.0 * 3.0;
        SavedExecution {
            source: None,
            bytecode: execution.bytecode().clone(),
            snapshot: execution.snapshot(),
        }
        .save(&path)
        .unwrap();

        let loaded = SavedExecution::load(&path).unwrap();
        let mut restored = runtime.restore(loaded.bytecode, loaded.snapshot).unwrap();
        let state = restored.resume(cogito_runtime::Value::Null).unwrap();
        assert_eq!(state.output, vec![format!("0.22121212121212122 {}", expected_y)]);
    }
}
