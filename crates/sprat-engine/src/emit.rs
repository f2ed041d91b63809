//! Bundle emission.
//!
//! Records are first collected into an [`Artifact`] and then rendered in
//! one step. The script form looks like:
//!
//! ```javascript
//! (function (modules) {
//!   // runtime loader defining `require(id)`
//!   require(0);
//! })({
//! // entry.js
//! 0: [function (require, module, exports) {
//!   ...
//! }, {"./a":1}],
//! });
//! ```

use std::path::Path;

use serde::Serialize;

use crate::record::{ModuleId, ModuleRecord, SpecifierMap};

/// The runtime loader, spliced into every script bundle
const RUNTIME: &str = include_str!("runtime.js");

/// Everything a renderer needs, in identity order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub entry: ModuleId,
    pub modules: Vec<ArtifactModule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactModule {
    pub id: ModuleId,
    /// Path relative to the entry's directory where possible
    pub path: String,
    #[serde(skip)]
    pub code: String,
    pub dependencies: SpecifierMap,
}

impl Artifact {
    pub fn from_records(records: &[ModuleRecord]) -> Self {
        let mut sorted: Vec<&ModuleRecord> = records.iter().collect();
        sorted.sort_by_key(|r| r.id);

        let base = sorted
            .iter()
            .find(|r| r.id == ModuleId::ENTRY)
            .and_then(|r| r.path.parent());

        let modules = sorted
            .iter()
            .map(|r| ArtifactModule {
                id: r.id,
                path: display_path(&r.path, base),
                code: r.code.clone(),
                dependencies: r.dependencies.clone(),
            })
            .collect();

        Self {
            entry: ModuleId::ENTRY,
            modules,
        }
    }
}

fn display_path(path: &Path, base: Option<&Path>) -> String {
    base.and_then(|b| path.strip_prefix(b).ok())
        .unwrap_or(path)
        .display()
        .to_string()
}

/// An output format for an [`Artifact`].
pub trait Render {
    fn render(&self, artifact: &Artifact) -> String;
}

/// Self-contained script: runtime loader, module registry, bootstrap call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptRenderer;

impl Render for ScriptRenderer {
    fn render(&self, artifact: &Artifact) -> String {
        let mut result = String::new();

        result.push_str("(function (modules) {\n");
        result.push_str(RUNTIME);
        result.push_str(&format!("\n  require({});\n", artifact.entry));
        result.push_str("})({\n");

        for module in &artifact.modules {
            // Serialize dependencies as JSON object for runtime resolution
            let deps_json =
                serde_json::to_string(&module.dependencies).unwrap_or_else(|_| "{}".to_string());

            result.push_str(&format!(
                "// {}\n{}: [function (require, module, exports) {{\n{}\n}}, {}],\n",
                comment_safe(&module.path),
                module.id,
                module.code.trim_end(),
                deps_json
            ));
        }

        result.push_str("});\n");
        result
    }
}

/// Line comments end at a line break; keep the whole path on one line.
fn comment_safe(path: &str) -> String {
    path.replace(['\n', '\r', '\u{2028}', '\u{2029}'], " ")
}

/// JSON description of the graph, without module code.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestRenderer;

impl Render for ManifestRenderer {
    fn render(&self, artifact: &Artifact) -> String {
        let mut json = serde_json::to_string_pretty(artifact).unwrap_or_else(|_| "{}".to_string());
        json.push('\n');
        json
    }
}

/// Render records as a script bundle.
pub fn emit(records: &[ModuleRecord]) -> String {
    ScriptRenderer.render(&Artifact::from_records(records))
}
