//! Static analyzer boundary
//!
//! The resolver and graph builder only ever see a [`FileSummary`]: the
//! declared package name, the import list, and the exported declaration
//! heads. Everything else about the language is opaque behind
//! [`SourceAnalyzer`]. [`DeclScanner`] is the shipped implementation, a
//! line-oriented scanner for the keel surface syntax.

use crate::{ResolveError, ResolveResult};
use std::fs;
use std::path::Path;

/// One import statement in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    /// Import identifier (slash-delimited path, graph identity)
    pub identifier: String,
    /// Per-file alias, if the file renamed the import
    pub alias: Option<String>,
    /// Included only for its initialization side effects (`import _ "x"`).
    /// Activation-only imports bind no name in the importing file.
    pub activation_only: bool,
}

impl ImportDecl {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            alias: None,
            activation_only: false,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn activation(mut self) -> Self {
        self.activation_only = true;
        self
    }
}

/// Analyzer output for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    /// Declared package name (`package NAME`)
    pub declared_name: String,
    /// Imports in declaration order
    pub imports: Vec<ImportDecl>,
    /// Exported declaration heads (`pub ...` lines, brace-stripped).
    /// These feed the export fingerprint; bodies never appear here.
    pub exported_decls: Vec<String>,
}

/// Opaque static analyzer: file in, declared name + imports out.
pub trait SourceAnalyzer: Send + Sync {
    fn analyze(&self, path: &Path) -> ResolveResult<FileSummary>;
}

/// Line-oriented scanner for keel source files.
///
/// Recognizes exactly the declarations resolution needs:
/// `package NAME`, `import "a/b"`, `import alias "a/b"`,
/// `import _ "a/b"`, and `pub ...` declaration heads.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclScanner;

impl DeclScanner {
    pub fn new() -> Self {
        Self
    }

    /// Scan source text without touching the filesystem.
    pub fn scan(&self, path: &Path, source: &str) -> ResolveResult<FileSummary> {
        let mut declared_name = None;
        let mut imports = Vec::new();
        let mut exported_decls = Vec::new();

        for (lineno, raw) in source.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }

            if let Some(rest) = line.strip_prefix("package ") {
                let name = rest.trim();
                if name.is_empty() || !is_identifier(name) {
                    return Err(ResolveError::analyzer(
                        path,
                        format!("line {}: invalid package name '{}'", lineno + 1, name),
                    ));
                }
                if let Some(prev) = &declared_name {
                    if prev != name {
                        return Err(ResolveError::analyzer(
                            path,
                            format!(
                                "line {}: conflicting package declarations '{}' and '{}'",
                                lineno + 1,
                                prev,
                                name
                            ),
                        ));
                    }
                }
                declared_name = Some(name.to_string());
            } else if let Some(rest) = line.strip_prefix("import ") {
                imports.push(parse_import(path, lineno, rest.trim())?);
            } else if line.starts_with("pub ") {
                exported_decls.push(decl_head(line));
            }
        }

        let declared_name = declared_name.ok_or_else(|| {
            ResolveError::analyzer(path, "missing package declaration".to_string())
        })?;

        Ok(FileSummary {
            declared_name,
            imports,
            exported_decls,
        })
    }
}

impl SourceAnalyzer for DeclScanner {
    fn analyze(&self, path: &Path) -> ResolveResult<FileSummary> {
        let source = fs::read_to_string(path).map_err(|e| ResolveError::io(path, e))?;
        self.scan(path, &source)
    }
}

/// Parse the remainder of an `import` line: `"a/b"`, `alias "a/b"`, `_ "a/b"`.
fn parse_import(path: &Path, lineno: usize, rest: &str) -> ResolveResult<ImportDecl> {
    let bad = |msg: &str| {
        ResolveError::analyzer(
            path,
            format!("line {}: {} in import '{}'", lineno + 1, msg, rest),
        )
    };

    let (prefix, quoted) = match rest.find('"') {
        Some(idx) => (rest[..idx].trim(), &rest[idx..]),
        None => return Err(bad("missing quoted identifier")),
    };

    let identifier = quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| bad("unterminated identifier"))?;
    if identifier.is_empty() {
        return Err(bad("empty identifier"));
    }

    let mut decl = ImportDecl::new(identifier);
    if prefix == "_" {
        decl = decl.activation();
    } else if !prefix.is_empty() {
        if !is_identifier(prefix) {
            return Err(bad("invalid alias"));
        }
        decl = decl.with_alias(prefix);
    }
    Ok(decl)
}

/// Truncate a declaration line to its head (drop a trailing open brace).
fn decl_head(line: &str) -> String {
    line.trim_end_matches('{').trim_end().to_string()
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
