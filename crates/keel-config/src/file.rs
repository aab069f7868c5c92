//! User configuration file (`<home>/config.toml`)

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optional user-level settings. Every field mirrors an environment
/// variable and loses to it when both are set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Distribution root (`KEEL_HOME`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,

    /// Ordered workspace roots (`KEEL_PATH`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathBuf>>,

    /// Target operating system (`KEEL_OS`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    /// Target architecture (`KEEL_ARCH`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

impl FileConfig {
    /// Load from a config file path
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

    /// A missing file is not an error; malformed content still is.
    pub fn load_optional(path: &Path) -> ConfigResult<Self> {
        match Self::load_from_file(path) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if let Some(paths) = &self.path {
            if paths.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "path".to_string(),
                    reason: "no workspace roots".to_string(),
                });
            }
            if paths.iter().any(|p| p.as_os_str().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: "path".to_string(),
                    reason: "empty workspace root entry".to_string(),
                });
            }
        }
        for (field, value) in [("os", &self.os), ("arch", &self.arch)] {
            if let Some(v) = value {
                if v.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: field.to_string(),
                        reason: "must not be empty".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn loads_complete_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
home = "/opt/keel"
path = ["/work/one", "/work/two"]
os = "linux"
arch = "arm64"
"#,
        )
        .unwrap();

        let config = FileConfig::load_from_file(&path).unwrap();
        assert_eq!(config.home, Some(PathBuf::from("/opt/keel")));
        assert_eq!(
            config.path,
            Some(vec![PathBuf::from("/work/one"), PathBuf::from("/work/two")])
        );
        assert_eq!(config.os.as_deref(), Some("linux"));
        assert_eq!(config.arch.as_deref(), Some("arm64"));
    }

    #[test]
    fn missing_file_is_default_when_optional() {
        let dir = TempDir::new().unwrap();
        let config = FileConfig::load_optional(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "homedir = \"/opt/keel\"\n").unwrap();
        assert!(matches!(
            FileConfig::load_from_file(&path).unwrap_err(),
            ConfigError::TomlParseError { .. }
        ));
    }

    #[test]
    fn empty_path_list_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "path = []\n").unwrap();
        assert!(matches!(
            FileConfig::load_from_file(&path).unwrap_err(),
            ConfigError::InvalidValue { field, .. } if field == "path"
        ));
    }

    #[test]
    fn empty_platform_values_are_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "os = \"\"\n").unwrap();
        assert!(matches!(
            FileConfig::load_from_file(&path).unwrap_err(),
            ConfigError::InvalidValue { field, .. } if field == "os"
        ));
    }
}
