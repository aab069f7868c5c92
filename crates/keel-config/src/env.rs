//! Effective environment resolution
//!
//! [`Env`] is the fully resolved configuration the rest of the
//! toolchain consumes: distribution root, ordered workspace roots, and
//! target platform. Resolution is pure given a variable lookup and a
//! file config, which keeps precedence testable without mutating the
//! process environment.

use crate::file::FileConfig;
use crate::{ConfigError, ConfigResult};
use keel_package::RootSet;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const HOME_VAR: &str = "KEEL_HOME";
pub const PATH_VAR: &str = "KEEL_PATH";
pub const OS_VAR: &str = "KEEL_OS";
pub const ARCH_VAR: &str = "KEEL_ARCH";

const CONFIG_FILE: &str = "config.toml";

/// Resolved toolchain environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Env {
    /// Distribution root: standard packages, cache, fetched metadata.
    pub home: PathBuf,
    /// Ordered workspace roots; the first one is the managed root that
    /// fetched packages land in.
    pub workspace_roots: Vec<PathBuf>,
    /// Target operating system (artifact paths only).
    pub os: String,
    /// Target architecture (artifact paths only).
    pub arch: String,
}

impl Env {
    /// Resolve from the process environment and the user config file.
    pub fn from_env() -> ConfigResult<Self> {
        let vars: HashMap<String, String> = [HOME_VAR, PATH_VAR, OS_VAR, ARCH_VAR]
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();

        let user_home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        let home = match vars.get(HOME_VAR) {
            Some(v) => PathBuf::from(v),
            None => user_home.join(".keel"),
        };
        let file = FileConfig::load_optional(&home.join(CONFIG_FILE))?;

        Self::resolve(&vars, &file, &user_home)
    }

    /// Pure precedence resolution: env var beats file value beats
    /// default.
    pub fn resolve(
        vars: &HashMap<String, String>,
        file: &FileConfig,
        user_home: &Path,
    ) -> ConfigResult<Self> {
        let home = vars
            .get(HOME_VAR)
            .map(PathBuf::from)
            .or_else(|| file.home.clone())
            .unwrap_or_else(|| user_home.join(".keel"));

        let workspace_roots = match vars.get(PATH_VAR) {
            Some(value) => {
                let roots: Vec<PathBuf> = std::env::split_paths(value)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect();
                if roots.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: PATH_VAR.to_string(),
                        reason: "no workspace roots".to_string(),
                    });
                }
                roots
            }
            None => file
                .path
                .clone()
                .unwrap_or_else(|| vec![user_home.join("keel")]),
        };
        // Every consumer indexes the first root; an empty list must
        // fail here, whichever layer produced it.
        if workspace_roots.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: PATH_VAR.to_string(),
                reason: "no workspace roots".to_string(),
            });
        }

        let os = vars
            .get(OS_VAR)
            .cloned()
            .or_else(|| file.os.clone())
            .unwrap_or_else(|| std::env::consts::OS.to_string());
        let arch = vars
            .get(ARCH_VAR)
            .cloned()
            .or_else(|| file.arch.clone())
            .unwrap_or_else(|| std::env::consts::ARCH.to_string());

        Ok(Self {
            home,
            workspace_roots,
            os,
            arch,
        })
    }

    /// Ordered source roots: workspace roots first, distribution last.
    pub fn root_set(&self) -> RootSet {
        RootSet::new(self.workspace_roots.clone(), self.home.clone())
    }

    /// Where linked executables go. Cross targets get a platform
    /// subdirectory so host binaries are never overwritten.
    pub fn bin_dir(&self) -> PathBuf {
        let bin = self.workspace_roots[0].join("bin");
        if self.is_host_platform() {
            bin
        } else {
            bin.join(format!("{}_{}", self.os, self.arch))
        }
    }

    /// Build cache location: the distribution root's `pkg/` directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("pkg")
    }

    pub fn is_host_platform(&self) -> bool {
        self.os == std::env::consts::OS && self.arch == std::env::consts::ARCH
    }

    /// The variables as `keel env` prints them, in stable order.
    pub fn variables(&self) -> Vec<(String, String)> {
        let path = std::env::join_paths(&self.workspace_roots)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| {
                self.workspace_roots
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(":")
            });
        vec![
            (HOME_VAR.to_string(), self.home.display().to_string()),
            (PATH_VAR.to_string(), path),
            (OS_VAR.to_string(), self.os.clone()),
            (ARCH_VAR.to_string(), self.arch.clone()),
        ]
    }
}
