/// Build system error types
use keel_package::ResolveError;
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("compilation failed for '{package}': {message}")]
    Compile { package: String, message: String },

    #[error("link failed for '{package}': {message}")]
    Link { package: String, message: String },

    #[error("build cache error: {0}")]
    Cache(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a compilation error
    pub fn compile(package: impl Into<String>, message: impl ToString) -> Self {
        Self::Compile {
            package: package.into(),
            message: message.to_string(),
        }
    }

    /// Create a link error
    pub fn link(package: impl Into<String>, message: impl ToString) -> Self {
        Self::Link {
            package: package.into(),
            message: message.to_string(),
        }
    }
}
