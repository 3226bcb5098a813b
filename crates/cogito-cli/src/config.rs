//! CLI configuration via environment variables
//!
//! Execution settings live in cogito.toml (see `cogito-config`); these only
//! shape how the CLI presents results.

use std::env;

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Default to JSON output (COGITO_DIAGNOSTICS=json)
    pub default_json: bool,
    /// Disable colored output (COGITO_NO_COLOR=1 or NO_COLOR=1)
    pub no_color: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            default_json: env::var("COGITO_DIAGNOSTICS")
                .map(|v| v.to_lowercase() == "json")
                .unwrap_or(false),
            no_color: env::var("COGITO_NO_COLOR").is_ok() || env::var("NO_COLOR").is_ok(),
        }
    }

    /// Apply the color preference to all `colored` output
    pub fn apply(&self) {
        if self.no_color {
            colored::control::set_override(false);
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_defaults() {
        env::remove_var("COGITO_DIAGNOSTICS");
        env::remove_var("COGITO_NO_COLOR");
        env::remove_var("NO_COLOR");

        let config = Config::from_env();
        assert!(!config.default_json);
        assert!(!config.no_color);
    }

    #[test]
    #[serial]
    fn test_config_json_diagnostics() {
        env::set_var("COGITO_DIAGNOSTICS", "JSON");
        let config = Config::from_env();
        assert!(config.default_json);
        env::remove_var("COGITO_DIAGNOSTICS");
    }
}
