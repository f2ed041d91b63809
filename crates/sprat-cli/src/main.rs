//! sprat - bundle an ES module graph into a single script.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use sprat_engine::{
    Artifact, BuildOptions, CyclePolicy, LowerOptions, ManifestRenderer, Render,
    ResolverOptions, ScriptRenderer, build,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::EnvFilter;

use crate::config::{Config, load_config};

const DEFAULT_ENTRY: &str = "src/entry.js";

#[derive(Parser, Debug)]
#[command(name = "sprat", version, about = "Bundle an ES module graph into a single script")]
struct Cli {
    /// Entry module [default: src/entry.js]
    entry: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(short = 'o', long)]
    outfile: Option<PathBuf>,

    /// Print the module manifest as JSON instead of the bundle
    #[arg(long)]
    manifest: bool,

    /// Extension to try for extensionless imports; repeat to list several in order
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Analyze modules in parallel
    #[arg(long)]
    parallel: bool,

    /// Circular import handling: allow, warn or deny
    #[arg(long, value_name = "POLICY")]
    cycles: Option<CyclePolicy>,

    /// ECMAScript version to print code for (e.g. es2020)
    #[arg(long)]
    target: Option<String>,

    /// Enable minification
    #[arg(long)]
    minify: bool,

    /// Path to sprat.toml (searched upward from the current directory by default)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn entry(&self, config: &Config) -> PathBuf {
        self.entry
            .clone()
            .or_else(|| config.entry())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENTRY))
    }

    /// Merge flags over config file values.
    fn build_options(&self, config: &Config) -> Result<BuildOptions> {
        let mut resolver = ResolverOptions {
            aliases: config.aliases(),
            ..Default::default()
        };
        if !self.extensions.is_empty() {
            resolver.extensions = self.extensions.clone();
        } else if let Some(extensions) = &config.resolve.extensions {
            resolver.extensions = extensions.clone();
        }

        let mut lower = LowerOptions {
            minify: self.minify || config.output.minify,
            ..Default::default()
        };
        if let Some(name) = self.target.as_ref().or(config.output.target.as_ref()) {
            lower.target = sprat_engine::parse_target(name)
                .with_context(|| format!("Unknown target '{}'", name))?;
        }

        Ok(BuildOptions {
            resolver,
            lower,
            cycles: self.cycles.or(config.build.cycles).unwrap_or_default(),
            parallel: self.parallel || config.build.parallel,
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let options = cli.build_options(&config)?;
    let entry = cli.entry(&config);

    let output = bundle(&entry, &options, cli.manifest)?;
    write_output(cli.outfile.as_deref(), &output)
}

fn bundle(entry: &Path, options: &BuildOptions, manifest: bool) -> Result<String> {
    let graph =
        build(entry, options).with_context(|| format!("Failed to bundle {}", entry.display()))?;
    let artifact = Artifact::from_records(graph.records());

    let output = if manifest {
        ManifestRenderer.render(&artifact)
    } else {
        ScriptRenderer.render(&artifact)
    };
    Ok(output)
}

fn write_output(outfile: Option<&Path>, output: &str) -> Result<()> {
    match outfile {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(path, output)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Wrote {} ({} bytes)", path.display(), output.len());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(output.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
