//! Configuration Loader
//!
//! Finds cogito.toml and applies environment overrides on top of it.

use crate::project::ProjectConfig;
use crate::{ConfigError, ConfigResult, CONFIG_FILE_NAME};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding `vm.max_call_depth`
pub const ENV_MAX_CALL_DEPTH: &str = "COGITO_MAX_CALL_DEPTH";
/// Environment variable overriding `vm.entry`
pub const ENV_ENTRY: &str = "COGITO_ENTRY";
/// Environment variable overriding `fs.root`
pub const ENV_FS_ROOT: &str = "COGITO_FS_ROOT";
/// Environment variable disabling the filesystem built-ins
pub const ENV_FS_DISABLED: &str = "COGITO_FS_DISABLED";

/// Configuration loader
///
/// Precedence, lowest first:
/// 1. Defaults
/// 2. Project config (cogito.toml)
/// 3. Environment variables (COGITO_*)
/// 4. CLI flags (handled by caller)
#[derive(Debug, Default, Clone)]
pub struct ConfigLoader {
    skip_env: bool,
}

/// Resolved configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Project configuration after env overrides
    pub project: ProjectConfig,

    /// Directory containing cogito.toml, if one was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { skip_env: false }
    }

    /// Loader that ignores COGITO_* environment variables
    pub fn without_env() -> Self {
        Self { skip_env: true }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree looking for cogito.toml. Falls back to
    /// defaults when none is found.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project) = self.find_project_config(start_dir)?;
        let project = self.apply_env_overrides(project)?;
        project.validate()?;

        Ok(Config {
            project,
            project_root,
        })
    }

    /// Load configuration from a specific cogito.toml
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let project = ProjectConfig::load_from_file(config_path)?;
        let project = self.apply_env_overrides(project)?;
        project.validate()?;

        Ok(Config {
            project,
            project_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Apply COGITO_* environment overrides
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if self.skip_env {
            return Ok(config);
        }

        if let Ok(depth) = env::var(ENV_MAX_CALL_DEPTH) {
            let parsed = depth.trim().parse::<usize>().map_err(|e| ConfigError::InvalidEnv {
                name: ENV_MAX_CALL_DEPTH.to_string(),
                value: depth.clone(),
                reason: e.to_string(),
            })?;
            config.vm_mut().max_call_depth = Some(parsed);
        }

        if let Ok(entry) = env::var(ENV_ENTRY) {
            config.vm_mut().entry = Some(entry);
        }

        if let Ok(root) = env::var(ENV_FS_ROOT) {
            config.fs_mut().root = Some(PathBuf::from(root));
        }

        if let Ok(disabled) = env::var(ENV_FS_DISABLED) {
            let disabled = matches!(disabled.to_lowercase().as_str(), "true" | "1" | "yes");
            config.fs_mut().enabled = Some(!disabled);
        }

        Ok(config)
    }
}

impl Config {
    /// Effective maximum call depth
    pub fn max_call_depth(&self) -> usize {
        self.project.max_call_depth()
    }

    /// Effective entry function name
    pub fn entry(&self) -> &str {
        self.project.entry()
    }

    /// Whether filesystem built-ins are enabled
    pub fn fs_enabled(&self) -> bool {
        self.project.fs_enabled()
    }

    /// Sandbox root resolved against the project root (or `base` when no project)
    pub fn fs_root(&self, base: &Path) -> PathBuf {
        let anchor = self.project_root.as_deref().unwrap_or(base);
        match self.project.fs_root() {
            Some(root) if root.is_absolute() => root.to_path_buf(),
            Some(root) => anchor.join(root),
            None => anchor.to_path_buf(),
        }
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if a cogito.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}
