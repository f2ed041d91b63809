//! Module analysis: read, parse, extract imports, lower.

use std::path::Path;

use sprat_lower::{LowerOptions, import_specifiers, lower, lower_json, parse_module};
use tracing::debug;

use crate::error::{BuildError, BuildResult};
use crate::record::{ModuleId, ModuleShell, SourceKind};

/// Produces a [`ModuleShell`] for one canonical path.
///
/// Implementations hold no cache; the graph builder guarantees a single
/// call per path.
pub trait Analyze: Sync {
    fn analyze(&self, id: ModuleId, path: &Path) -> BuildResult<ModuleShell>;
}

/// Reads modules from disk and lowers them with sprat-lower.
#[derive(Debug, Clone, Default)]
pub struct SourceAnalyzer {
    options: LowerOptions,
}

impl SourceAnalyzer {
    pub fn new(options: LowerOptions) -> Self {
        Self { options }
    }
}

impl Analyze for SourceAnalyzer {
    fn analyze(&self, id: ModuleId, path: &Path) -> BuildResult<ModuleShell> {
        let source =
            std::fs::read_to_string(path).map_err(|e| BuildError::read(path, e))?;
        let source = strip_shebang(&source);
        let kind = SourceKind::from_path(path);

        let (specifiers, code) = match kind.dialect() {
            Some(dialect) => {
                let parsed = parse_module(&source, &path.display().to_string(), dialect)
                    .map_err(|e| BuildError::Parse {
                        path: path.to_path_buf(),
                        message: e.message,
                        line: e.line,
                        column: e.column,
                    })?;
                let specifiers = import_specifiers(&parsed.module);
                let code = lower(parsed, &self.options)
                    .map_err(|e| BuildError::lower(path, e.to_string()))?;
                (specifiers, code)
            }
            None => {
                let code = lower_json(&source).map_err(|e| BuildError::Parse {
                    path: path.to_path_buf(),
                    message: e.message,
                    line: e.line,
                    column: e.column,
                })?;
                (Vec::new(), code)
            }
        };

        debug!(
            "Analyzed module {} ({:?}, {} imports): {}",
            id,
            kind,
            specifiers.len(),
            path.display()
        );

        Ok(ModuleShell {
            id,
            path: path.to_path_buf(),
            specifiers,
            code,
            kind,
        })
    }
}

/// Blank out a `#!` line, keeping line numbers intact.
fn strip_shebang(source: &str) -> String {
    if source.starts_with("#!") {
        if let Some(newline_pos) = source.find('\n') {
            format!("{}{}", " ".repeat(newline_pos), &source[newline_pos..])
        } else {
            String::new()
        }
    } else {
        source.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_analyze_javascript() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entry.js");
        fs::write(&path, "import { a } from './a';\nimport './b';\nconsole.log(a);\n").unwrap();

        let shell = SourceAnalyzer::default().analyze(ModuleId::ENTRY, &path).unwrap();
        assert_eq!(shell.id, ModuleId::ENTRY);
        assert_eq!(shell.kind, SourceKind::JavaScript);
        assert_eq!(shell.specifiers, vec!["./a", "./b"]);
        assert!(shell.code.contains(r#"require("./a")"#));
        assert!(!shell.code.contains("import "));
    }

    #[test]
    fn test_analyze_typescript() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("math.ts");
        fs::write(&path, "export function square(n: number): number { return n * n; }\n")
            .unwrap();

        let shell = SourceAnalyzer::default().analyze(ModuleId(3), &path).unwrap();
        assert_eq!(shell.kind, SourceKind::TypeScript);
        assert!(shell.specifiers.is_empty());
        assert!(!shell.code.contains(": number"));
    }

    #[test]
    fn test_analyze_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ \"port\": 8080 }\n").unwrap();

        let shell = SourceAnalyzer::default().analyze(ModuleId(1), &path).unwrap();
        assert_eq!(shell.kind, SourceKind::Json);
        assert!(shell.specifiers.is_empty());
        assert_eq!(shell.code, "module.exports = { \"port\": 8080 };");
    }

    #[test]
    fn test_shebang_keeps_line_numbers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cli.js");
        fs::write(&path, "#!/usr/bin/env node\nconst x = ;\n").unwrap();

        let err = SourceAnalyzer::default().analyze(ModuleId(0), &path).unwrap_err();
        match err {
            BuildError::Parse { line, path: p, .. } => {
                assert_eq!(line, 2);
                assert_eq!(p, path);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.js");
        let err = SourceAnalyzer::default().analyze(ModuleId(0), &path).unwrap_err();
        assert!(matches!(err, BuildError::Read { .. }));
    }

    #[test]
    fn test_strip_shebang() {
        assert_eq!(strip_shebang("#!/bin/node\nx"), "           \nx");
        assert_eq!(strip_shebang("#!/bin/node"), "");
        assert_eq!(strip_shebang("x"), "x");
    }
}
