//! Specifier resolution
//!
//! Relative paths, absolute paths, directory `index` files and bare package
//! specifiers (`node_modules`, `package.json` exports) are handled by
//! oxc-resolver.

use std::path::{Path, PathBuf};

use oxc_resolver::{ResolveOptions, Resolver};

use crate::error::ResolveError;
use crate::options::ResolverOptions;

/// Turns a raw specifier into a canonical path.
pub trait Resolve: Sync {
    /// Resolve `specifier` as written in a module living in `from_dir`.
    fn resolve(&self, specifier: &str, from_dir: &Path) -> Result<PathBuf, ResolveError>;
}

/// Filesystem resolver backed by oxc-resolver.
pub struct FsResolver {
    options: ResolverOptions,
    resolver: Resolver,
}

impl FsResolver {
    pub fn new(options: ResolverOptions) -> Self {
        let resolve_options = ResolveOptions {
            extensions: options.extensions.iter().map(|e| normalize_extension(e)).collect(),
            condition_names: vec!["import".into(), "module".into(), "default".into()],
            ..ResolveOptions::default()
        };

        Self {
            resolver: Resolver::new(resolve_options),
            options,
        }
    }
}

impl Default for FsResolver {
    fn default() -> Self {
        Self::new(ResolverOptions::default())
    }
}

impl Resolve for FsResolver {
    fn resolve(&self, specifier: &str, from_dir: &Path) -> Result<PathBuf, ResolveError> {
        // Aliases are applied once; the replacement is not looked up again
        let target = self
            .options
            .aliases
            .get(specifier)
            .map(String::as_str)
            .unwrap_or(specifier);

        match self.resolver.resolve(from_dir, target) {
            Ok(resolution) => Ok(canonicalize_path(&resolution.full_path())),
            Err(e) if target != specifier => Err(ResolveError::new(format!(
                "{} (aliased to '{}')",
                e, target
            ))),
            Err(e) => Err(ResolveError::new(e.to_string())),
        }
    }
}

/// oxc-resolver expects extensions with a leading dot.
fn normalize_extension(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

pub(crate) fn canonicalize_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_relative_without_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "").unwrap();

        let resolver = FsResolver::default();
        let resolved = resolver.resolve("./a", dir.path()).unwrap();
        assert_eq!(resolved, fs::canonicalize(dir.path().join("a.js")).unwrap());
    }

    #[test]
    fn test_resolve_exact_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("data.json"), "{}").unwrap();

        let resolver = FsResolver::default();
        let resolved = resolver.resolve("./data.json", dir.path()).unwrap();
        assert!(resolved.ends_with("data.json"));
    }

    #[test]
    fn test_extension_order_is_respected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("util.js"), "").unwrap();
        fs::write(dir.path().join("util.ts"), "").unwrap();

        let js_first = FsResolver::default();
        assert!(js_first.resolve("./util", dir.path()).unwrap().ends_with("util.js"));

        let ts_first = FsResolver::new(ResolverOptions {
            extensions: vec!["ts".into(), "js".into()],
            ..Default::default()
        });
        assert!(ts_first.resolve("./util", dir.path()).unwrap().ends_with("util.ts"));
    }

    #[test]
    fn test_resolve_directory_index() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib").join("index.js"), "").unwrap();

        let resolver = FsResolver::default();
        let resolved = resolver.resolve("./lib", dir.path()).unwrap();
        assert!(resolved.ends_with("index.js"));
    }

    #[test]
    fn test_resolve_missing_fails() {
        let dir = tempdir().unwrap();
        let resolver = FsResolver::default();
        assert!(resolver.resolve("./missing", dir.path()).is_err());
    }

    #[test]
    fn test_alias_applied_before_resolution() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("real.js"), "").unwrap();

        let mut aliases = HashMap::new();
        aliases.insert("@app/real".to_string(), "./real.js".to_string());
        let resolver = FsResolver::new(ResolverOptions {
            aliases,
            ..Default::default()
        });

        let resolved = resolver.resolve("@app/real", dir.path()).unwrap();
        assert!(resolved.ends_with("real.js"));
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("ts"), ".ts");
        assert_eq!(normalize_extension(".ts"), ".ts");
    }
}
