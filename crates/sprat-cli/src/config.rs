//! Configuration file parsing for sprat.toml.

use serde::Deserialize;
use sprat_engine::CyclePolicy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Module resolution settings
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Code generation settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Directory of the file this was loaded from
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

/// Module resolution configuration.
#[derive(Debug, Default, Deserialize)]
pub struct ResolveConfig {
    /// Extensions to try, in order. Replaces the built-in list.
    pub extensions: Option<Vec<String>>,

    /// Import map aliases
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

/// Code generation configuration.
#[derive(Debug, Default, Deserialize)]
pub struct OutputConfig {
    /// ECMAScript target, e.g. "es2020"
    pub target: Option<String>,

    #[serde(default)]
    pub minify: bool,
}

/// Build configuration.
#[derive(Debug, Default, Deserialize)]
pub struct BuildConfig {
    /// Entry module, relative to the config file
    pub entry: Option<PathBuf>,

    pub cycles: Option<CyclePolicy>,

    #[serde(default)]
    pub parallel: bool,
}

impl Config {
    /// Entry path from the config file, anchored at its directory.
    pub fn entry(&self) -> Option<PathBuf> {
        self.build.entry.as_ref().map(|entry| self.anchor(entry))
    }

    /// Aliases with relative targets anchored at the config file's directory.
    ///
    /// Bare package names are left alone so they still resolve through
    /// `node_modules` of the importing module.
    pub fn aliases(&self) -> HashMap<String, String> {
        self.resolve
            .aliases
            .iter()
            .map(|(from, to)| {
                let to = if let Some(local) = to.strip_prefix("./") {
                    self.anchor(Path::new(local)).display().to_string()
                } else if to.starts_with("../") {
                    self.anchor(Path::new(to)).display().to_string()
                } else {
                    to.clone()
                };
                (from.clone(), to)
            })
            .collect()
    }

    fn anchor(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Load configuration from a file or search for default config files.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = path
        && !path.exists()
    {
        anyhow::bail!("Config file {} does not exist", path.display());
    }

    let config_path = path.map(PathBuf::from).or_else(find_config_file);

    match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let mut config: Config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            config.root = config_root(&path)?;
            tracing::debug!("Loaded config from {}", path.display());
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// Absolute directory of a config file, so relative anchors do not depend
/// on how the file was named on the command line.
fn config_root(path: &Path) -> anyhow::Result<Option<PathBuf>> {
    let path = std::fs::canonicalize(path)
        .map_err(|e| anyhow::anyhow!("Failed to locate {}: {}", path.display(), e))?;
    Ok(path.parent().map(Path::to_path_buf))
}

/// Search for configuration file in the current directory and parent directories.
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_ancestors(&cwd)
}

fn find_config_in_ancestors(start: &Path) -> Option<PathBuf> {
    const CONFIG_NAMES: &[&str] = &["sprat.toml", ".spratrc.toml"];

    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }

    None
}
