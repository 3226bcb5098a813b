//! Project configuration (cogito.toml)

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default maximum number of nested call frames
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Default implicit entry function
pub const DEFAULT_ENTRY: &str = "main";

/// Project configuration loaded from cogito.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Virtual machine settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm: Option<VmSettings>,

    /// Filesystem built-in settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsConfig>,
}

/// `[vm]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VmSettings {
    /// Maximum nested call frames before a resource-exhaustion error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_call_depth: Option<usize>,

    /// Function called implicitly when the top level never calls it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
}

/// `[fs]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FsConfig {
    /// Sandbox root for listFiles/readFile/writeFile, relative to the project root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// When false every filesystem built-in yields null
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(vm) = &self.vm {
            if vm.max_call_depth == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "vm.max_call_depth".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            if let Some(entry) = &vm.entry {
                if !is_identifier(entry) {
                    return Err(ConfigError::InvalidValue {
                        field: "vm.entry".to_string(),
                        reason: format!("'{}' is not a valid function name", entry),
                    });
                }
            }
        }

        if let Some(fs) = &self.fs {
            if let Some(root) = &fs.root {
                if root.as_os_str().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "fs.root".to_string(),
                        reason: "path cannot be empty".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Effective maximum call depth
    pub fn max_call_depth(&self) -> usize {
        self.vm
            .as_ref()
            .and_then(|vm| vm.max_call_depth)
            .unwrap_or(DEFAULT_MAX_CALL_DEPTH)
    }

    /// Effective entry function name
    pub fn entry(&self) -> &str {
        self.vm
            .as_ref()
            .and_then(|vm| vm.entry.as_deref())
            .unwrap_or(DEFAULT_ENTRY)
    }

    /// Whether the filesystem built-ins are enabled
    pub fn fs_enabled(&self) -> bool {
        self.fs.as_ref().and_then(|fs| fs.enabled).unwrap_or(true)
    }

    /// Configured filesystem root, if any
    pub fn fs_root(&self) -> Option<&Path> {
        self.fs.as_ref().and_then(|fs| fs.root.as_deref())
    }

    pub(crate) fn vm_mut(&mut self) -> &mut VmSettings {
        self.vm.get_or_insert_with(VmSettings::default)
    }

    pub(crate) fn fs_mut(&mut self) -> &mut FsConfig {
        self.fs.get_or_insert_with(FsConfig::default)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ProjectConfig = toml::from_str("").unwrap();
        assert_eq!(config.max_call_depth(), DEFAULT_MAX_CALL_DEPTH);
        assert_eq!(config.entry(), "main");
        assert!(config.fs_enabled());
        assert_eq!(config.fs_root(), None);
    }

    #[test]
    fn test_parse_full_config() {
        let config: ProjectConfig = toml::from_str(
            r#"
[vm]
max_call_depth = 64
entry = "start"

[fs]
root = "data"
enabled = false
"#,
        )
        .unwrap();
        assert_eq!(config.max_call_depth(), 64);
        assert_eq!(config.entry(), "start");
        assert!(!config.fs_enabled());
        assert_eq!(config.fs_root(), Some(Path::new("data")));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<ProjectConfig, _> = toml::from_str("[vm]\nstack_size = 3\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_depth_rejected() {
        let config: ProjectConfig = toml::from_str("[vm]\nmax_call_depth = 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "vm.max_call_depth"
        ));
    }

    #[rstest]
    #[case("main", true)]
    #[case("_start", true)]
    #[case("$run2", true)]
    #[case("2fast", false)]
    #[case("has space", false)]
    #[case("", false)]
    fn test_entry_names(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(is_identifier(name), valid);
    }
}
