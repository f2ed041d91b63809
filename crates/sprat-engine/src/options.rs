//! Build options

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use sprat_lower::LowerOptions;

/// Extensions tried for extensionless specifiers, in order.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs", ".ts", ".mts", ".cts", ".json"];

/// Path resolution settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// File extensions to try, in order
    pub extensions: Vec<String>,

    /// Specifier aliases, applied before resolution
    pub aliases: HashMap<String, String>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            aliases: HashMap::new(),
        }
    }
}

/// What to do when the graph contains a circular import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Cycles are legal; the loader hands out partial exports.
    #[default]
    Allow,
    /// Log each cycle, then build anyway.
    Warn,
    /// Fail the build.
    Deny,
}

impl FromStr for CyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Ok(CyclePolicy::Allow),
            "warn" => Ok(CyclePolicy::Warn),
            "deny" => Ok(CyclePolicy::Deny),
            other => Err(format!(
                "Unknown cycle policy '{}', expected allow, warn or deny",
                other
            )),
        }
    }
}

impl fmt::Display for CyclePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePolicy::Allow => "allow",
            CyclePolicy::Warn => "warn",
            CyclePolicy::Deny => "deny",
        };
        f.write_str(name)
    }
}

/// Everything a build needs besides the entry path.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub resolver: ResolverOptions,
    pub lower: LowerOptions,
    pub cycles: CyclePolicy,
    /// Analyze each discovery frontier on the rayon pool
    pub parallel: bool,
}
