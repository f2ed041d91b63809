//! sprat-engine - module graph construction and bundle emission.
//!
//! # Pipeline
//!
//! 1. [`GraphBuilder`] walks imports breadth-first from the entry, asking a
//!    [`Resolve`] implementation for canonical paths and an [`Analyze`]
//!    implementation for each module's imports and lowered code.
//! 2. [`emit`] turns the finished records into one script that carries its
//!    own module loader.
//!
//! ```no_run
//! use std::path::Path;
//! use sprat_engine::{BuildOptions, bundle};
//!
//! let script = bundle(Path::new("src/entry.js"), &BuildOptions::default())?;
//! println!("{}", script);
//! # Ok::<(), sprat_engine::BuildError>(())
//! ```

pub mod analyzer;
pub mod emit;
pub mod error;
pub mod graph;
pub mod options;
pub mod record;
pub mod resolver;

use std::path::Path;

pub use analyzer::{Analyze, SourceAnalyzer};
pub use emit::{Artifact, ArtifactModule, ManifestRenderer, Render, ScriptRenderer, emit};
pub use error::{BuildError, BuildResult, ResolveError};
pub use graph::{GraphBuilder, IdAllocator, ModuleGraph, Worklist};
pub use options::{BuildOptions, CyclePolicy, DEFAULT_EXTENSIONS, ResolverOptions};
pub use record::{ModuleId, ModuleRecord, ModuleShell, SourceKind, SpecifierMap};
pub use resolver::{FsResolver, Resolve};

pub use sprat_lower::{EsVersion, LowerOptions, parse_target};

/// Build the module graph for `entry` with the filesystem resolver and analyzer.
pub fn build(entry: &Path, options: &BuildOptions) -> BuildResult<ModuleGraph> {
    let resolver = FsResolver::new(options.resolver.clone());
    let analyzer = SourceAnalyzer::new(options.lower.clone());

    GraphBuilder::new(&resolver, &analyzer)
        .cycles(options.cycles)
        .parallel(options.parallel)
        .build(entry)
}

/// Build and emit a script bundle for `entry`.
pub fn bundle(entry: &Path, options: &BuildOptions) -> BuildResult<String> {
    let graph = build(entry, options)?;
    Ok(emit(graph.records()))
}
