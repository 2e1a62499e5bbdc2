//! Configuration loading
//!
//! Resolution order: explicit path, then `GENTLE_KILL_CONFIG`, then
//! `<config dir>/gentle-kill/config.toml`. A missing default file is not an
//! error; every field has a default. A few environment variables override the
//! loaded values.

use crate::core::injector::DEFAULT_INJECTION_TIMEOUT;
use crate::core::process_tree::{UnopenablePolicy, DEFAULT_TREE_CAPACITY};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "GENTLE_KILL_CONFIG";
pub const INJECTION_TIMEOUT_ENV: &str = "GENTLE_KILL_INJECTION_TIMEOUT_MS";
pub const HELPER_ENV: &str = "GENTLE_KILL_HELPER";

pub const CONFIG_DIRECTORY: &str = "gentle-kill";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const HELPER_NAME: &str = "gentle-kill-helper";

/// Where the other-architecture helper build lives, relative to the
/// executable's directory.
#[cfg(target_pointer_width = "64")]
pub const FOREIGN_HELPER_DIR: &str = "libexec/win32";
#[cfg(not(target_pointer_width = "64"))]
pub const FOREIGN_HELPER_DIR: &str = "libexec/win64";

const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KillConfig {
    pub injection: InjectionConfig,
    pub oracle: OracleConfig,
    pub tree: TreeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    pub timeout_ms: u64,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_INJECTION_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Defaults to `gentle-kill-helper` next to the running executable.
    pub native_helper: Option<PathBuf>,
    /// Defaults to [`FOREIGN_HELPER_DIR`] below the executable's directory.
    pub foreign_helper: Option<PathBuf>,
    pub timeout_ms: u64,
    pub alloc_console: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            native_helper: None,
            foreign_helper: None,
            timeout_ms: DEFAULT_ORACLE_TIMEOUT.as_millis() as u64,
            alloc_console: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub capacity: usize,
    pub unopenable: UnopenablePolicy,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_TREE_CAPACITY,
            unopenable: UnopenablePolicy::Skip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIRECTORY).join(CONFIG_FILE_NAME))
}

fn helper_file_name() -> String {
    format!("{HELPER_NAME}{}", std::env::consts::EXE_SUFFIX)
}

fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

impl KillConfig {
    /// Loads, applies environment overrides and validates.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = explicit {
            Self::from_file(path)?
        } else if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
            Self::from_file(Path::new(&path))?
        } else {
            match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            }
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    pub fn from_toml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var(INJECTION_TIMEOUT_ENV) {
            self.injection.timeout_ms =
                value.trim().parse().map_err(|_| ConfigError::Invalid {
                    field: INJECTION_TIMEOUT_ENV,
                    message: format!("'{value}' is not a number of milliseconds"),
                })?;
        }
        if let Some(helper) = std::env::var_os(HELPER_ENV).filter(|value| !value.is_empty()) {
            self.oracle.native_helper = Some(PathBuf::from(helper));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.injection.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "injection.timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.oracle.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "oracle.timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.tree.capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "tree.capacity",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn injection_timeout(&self) -> Duration {
        Duration::from_millis(self.injection.timeout_ms)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle.timeout_ms)
    }

    pub fn native_helper_path(&self) -> PathBuf {
        self.oracle.native_helper.clone().unwrap_or_else(|| {
            executable_dir()
                .unwrap_or_default()
                .join(helper_file_name())
        })
    }

    pub fn foreign_helper_path(&self) -> Option<PathBuf> {
        self.oracle.foreign_helper.clone().or_else(|| {
            executable_dir().map(|dir| dir.join(FOREIGN_HELPER_DIR).join(helper_file_name()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_documented_values() {
        let config = KillConfig::default();
        assert_eq!(config.injection_timeout(), Duration::from_secs(10));
        assert_eq!(config.oracle_timeout(), Duration::from_secs(5));
        assert_eq!(config.tree.capacity, 16384);
        assert_eq!(config.tree.unopenable, UnopenablePolicy::Skip);
        assert!(!config.oracle.alloc_console);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = KillConfig::from_toml(
            r#"
                [tree]
                unopenable = "fail"

                [oracle]
                native_helper = "C:/tools/gentle-kill-helper.exe"
            "#,
            Path::new("inline.toml"),
        )
        .unwrap();

        assert_eq!(config.tree.unopenable, UnopenablePolicy::Fail);
        assert_eq!(config.tree.capacity, DEFAULT_TREE_CAPACITY);
        assert_eq!(
            config.native_helper_path(),
            PathBuf::from("C:/tools/gentle-kill-helper.exe")
        );
        assert_eq!(config.injection, InjectionConfig::default());
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let err = KillConfig::from_toml("[tree]\nunopenable = \"maybe\"\n", Path::new("bad.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_values_are_rejected() {
        let mut config = KillConfig::default();
        config.tree.capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "tree.capacity", .. })
        ));

        let mut config = KillConfig::default();
        config.injection.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_helper_paths_sit_next_to_executable() {
        let config = KillConfig::default();
        let native = config.native_helper_path();
        assert!(native
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(HELPER_NAME)));
        let foreign = config.foreign_helper_path().expect("executable dir is known");
        assert!(foreign.to_string_lossy().contains("libexec"));
    }
}
