//! Module identities and records.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use sprat_lower::Dialect;

/// Stable identity of a module within one build.
///
/// Assigned once per canonical path in discovery order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ModuleId(pub u32);

impl ModuleId {
    /// Identity of the entry module.
    pub const ENTRY: ModuleId = ModuleId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw specifier → identity, in the order specifiers were first seen.
pub type SpecifierMap = IndexMap<String, ModuleId>;

/// How a module's source is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    JavaScript,
    TypeScript,
    Json,
}

impl SourceKind {
    /// Detect source kind from file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts" | "mts" | "cts") => SourceKind::TypeScript,
            Some("json") => SourceKind::Json,
            _ => SourceKind::JavaScript,
        }
    }

    /// Parser dialect, or `None` for JSON.
    pub fn dialect(self) -> Option<Dialect> {
        match self {
            SourceKind::JavaScript => Some(Dialect::JavaScript),
            SourceKind::TypeScript => Some(Dialect::TypeScript),
            SourceKind::Json => None,
        }
    }
}

/// What the analyzer knows about a module before its imports are resolved.
#[derive(Debug, Clone)]
pub struct ModuleShell {
    pub id: ModuleId,
    pub path: PathBuf,
    pub specifiers: Vec<String>,
    pub code: String,
    pub kind: SourceKind,
}

/// A module in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub id: ModuleId,
    /// Canonical absolute path
    pub path: PathBuf,
    /// Raw import specifiers in source order, duplicates kept
    pub specifiers: Vec<String>,
    /// Lowered code expecting `require`, `module` and `exports` in scope
    pub code: String,
    pub dependencies: SpecifierMap,
}

impl ModuleRecord {
    pub fn new(
        id: ModuleId,
        path: impl Into<PathBuf>,
        specifiers: Vec<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            id,
            path: path.into(),
            specifiers,
            code: code.into(),
            dependencies: SpecifierMap::new(),
        }
    }

    /// Identity a specifier resolved to.
    pub fn dependency(&self, specifier: &str) -> Option<ModuleId> {
        self.dependencies.get(specifier).copied()
    }

    /// Whether every specifier has been resolved.
    pub fn is_linked(&self) -> bool {
        self.specifiers
            .iter()
            .all(|s| self.dependencies.contains_key(s))
    }
}

impl From<ModuleShell> for ModuleRecord {
    fn from(shell: ModuleShell) -> Self {
        ModuleRecord::new(shell.id, shell.path, shell.specifiers, shell.code)
    }
}
