//! Compiler and linker seam
//!
//! The orchestrator drives any [`Toolchain`]; the unit it hands over is
//! self-contained (sources plus compiled dependency artifacts), so a
//! toolchain never touches the resolver or the graph. [`RefToolchain`]
//! is the built-in implementation used by tests and the CLI's check
//! mode: it produces a JSON summary of the package instead of machine
//! code, but exercises the full caching and scheduling machinery,
//! including export fingerprints that only move when the public surface
//! changes.

use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("{file}: {message}")]
    Source { file: String, message: String },

    #[error("{0}")]
    Internal(String),
}

/// One source file, read into memory by the orchestrator.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the package directory.
    pub rel_path: String,
    pub bytes: Vec<u8>,
}

/// Everything a toolchain needs to compile one package.
#[derive(Debug, Clone)]
pub struct CompileUnit {
    pub identifier: String,
    pub package_name: String,
    pub sources: Vec<SourceFile>,
    /// Compiled direct dependencies, in import-identifier order.
    pub dep_artifacts: Vec<(String, Vec<u8>)>,
}

/// Output of compiling one package.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    pub bytes: Vec<u8>,
    /// Fingerprint of the package's exported surface. Dependents key
    /// their cache entries on this, so it must be stable across
    /// internal-only edits.
    pub export: Fingerprint,
}

/// Input to linking one command package.
#[derive(Debug, Clone)]
pub struct LinkInput {
    pub identifier: String,
    /// Artifacts of the command and its transitive dependencies, in
    /// dependency order with the command last.
    pub artifacts: Vec<(String, Vec<u8>)>,
    pub output: PathBuf,
}

pub trait Toolchain: Send + Sync {
    fn compile(&self, unit: &CompileUnit) -> Result<CompiledArtifact, ToolchainError>;
    fn link(&self, input: &LinkInput) -> Result<Vec<u8>, ToolchainError>;
}

/// Reference toolchain.
///
/// A source line starting with `error ` is treated as a deliberate
/// compile failure carrying the rest of the line as the message, which
/// gives tests a deterministic way to make a package unbuildable.
#[derive(Debug, Default)]
pub struct RefToolchain;

impl RefToolchain {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize, Deserialize)]
struct Summary {
    identifier: String,
    package: String,
    files: Vec<String>,
    exports: Vec<String>,
    deps: Vec<String>,
}

impl Toolchain for RefToolchain {
    fn compile(&self, unit: &CompileUnit) -> Result<CompiledArtifact, ToolchainError> {
        let mut exports = Vec::new();
        for src in &unit.sources {
            let text = std::str::from_utf8(&src.bytes).map_err(|_| ToolchainError::Source {
                file: src.rel_path.clone(),
                message: "source is not valid UTF-8".to_string(),
            })?;
            for line in text.lines() {
                let line = line.trim();
                if let Some(message) = line.strip_prefix("error ") {
                    return Err(ToolchainError::Source {
                        file: src.rel_path.clone(),
                        message: message.to_string(),
                    });
                }
                if let Some(decl) = line.strip_prefix("pub ") {
                    exports.push(decl.trim_end_matches('{').trim().to_string());
                }
            }
        }
        exports.sort();
        exports.dedup();

        let export = Fingerprint::of_parts(
            "keel-export-v1",
            exports.iter().map(|d| d.as_bytes()),
        );

        let summary = Summary {
            identifier: unit.identifier.clone(),
            package: unit.package_name.clone(),
            files: unit.sources.iter().map(|s| s.rel_path.clone()).collect(),
            exports,
            deps: unit.dep_artifacts.iter().map(|(id, _)| id.clone()).collect(),
        };
        let bytes = serde_json::to_vec_pretty(&summary)
            .map_err(|e| ToolchainError::Internal(e.to_string()))?;

        Ok(CompiledArtifact { bytes, export })
    }

    fn link(&self, input: &LinkInput) -> Result<Vec<u8>, ToolchainError> {
        // A "binary" is the manifest of everything linked into it.
        let mut out = Vec::new();
        out.extend_from_slice(b"#!keel-ref\n");
        for (identifier, artifact) in &input.artifacts {
            out.extend_from_slice(identifier.as_bytes());
            out.push(b' ');
            out.extend_from_slice(
                Fingerprint::of_bytes(artifact).as_str().as_bytes(),
            );
            out.push(b'\n');
        }
        Ok(out)
    }
}
