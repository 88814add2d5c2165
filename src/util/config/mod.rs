//! const-promotion configuration system
//!
//! Supports user-level and project-level configuration with merge semantics.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. File given with --config
//! 3. Project-level (const-promotion.toml next to the input)
//! 4. User-level (~/.config/const-promotion/config.toml)
//! 5. Default values
//! ```
//!
//! Files are merged key by key, so a project file that only sets
//! `[eval] step_limit` keeps every other setting from the layers below.
//!
//! # Usage
//!
//! ```rust
//! use const_promotion::util::config::Config;
//!
//! let config: Config = toml::from_str("[eval]\nstep_limit = 1000").unwrap();
//! assert_eq!(config.eval.step_limit, 1000);
//! assert!(config.promotion.enabled);
//! ```

use crate::middle::interpret::InterpConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Directory name under the user config dir
const APP_DIR: &str = "const-promotion";

/// Project-level config file name
pub const PROJECT_CONFIG_FILE: &str = "const-promotion.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub eval: EvalConfig,
    #[serde(default)]
    pub promotion: PromotionConfig,
    #[serde(default)]
    pub lint: LintConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Limits of the compile-time evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Statements and terminators one evaluation may execute
    #[serde(default = "default_step_limit")]
    pub step_limit: u64,
    /// Nested const fn calls
    #[serde(default = "default_stack_limit")]
    pub stack_limit: usize,
    /// Elements a single array value may hold
    #[serde(default = "default_max_alloc_elems")]
    pub max_alloc_elems: u64,
}

fn default_step_limit() -> u64 {
    1_000_000
}

fn default_stack_limit() -> usize {
    64
}

fn default_max_alloc_elems() -> u64 {
    1 << 20
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            step_limit: default_step_limit(),
            stack_limit: default_stack_limit(),
            max_alloc_elems: default_max_alloc_elems(),
        }
    }
}

impl From<EvalConfig> for InterpConfig {
    fn from(config: EvalConfig) -> Self {
        InterpConfig {
            step_limit: config.step_limit,
            stack_limit: config.stack_limit,
            max_alloc_elems: config.max_alloc_elems,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionConfig {
    /// Run the promotion pass at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Extend the lifetime of borrowed temps that cannot be promoted
    #[serde(default = "default_true")]
    pub lifetime_extension: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lifetime_extension: true,
        }
    }
}

/// Lint level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LintLevel {
    Allow,
    Warn,
    #[default]
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LintConfig {
    /// Unconst operations outside `unconst` blocks in const code
    #[serde(default)]
    pub unconst: LintLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Analyze bodies on the rayon thread pool
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Colored text diagnostics
    #[serde(default = "default_true")]
    pub color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            color: true,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join(APP_DIR));
    }

    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join(APP_DIR));
    }

    // On Windows, try %APPDATA%
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join(APP_DIR));
    }

    None
}

/// Get the user config file path (~/.config/const-promotion/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Project config that applies to `input`, if one exists
pub fn project_config_path(input: &Path) -> Option<PathBuf> {
    let dir = if input.is_dir() { input } else { input.parent()? };
    let path = dir.join(PROJECT_CONFIG_FILE);
    path.is_file().then_some(path)
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    content.parse::<toml::Table>().map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Overlay `top` onto `base`; nested tables merge, everything else replaces
fn merge_tables(
    base: &mut toml::Table,
    top: toml::Table,
) {
    for (key, value) in top {
        let value = match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(top_table)) => {
                merge_tables(base_table, top_table);
                continue;
            }
            (_, value) => value,
        };
        base.insert(key, value);
    }
}

impl Config {
    /// Merge the given files, lowest priority first. Missing optional
    /// layers are skipped; a named file that cannot be read is an error.
    pub fn from_layers<'a>(layers: impl IntoIterator<Item = &'a Path>) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        for path in layers {
            debug!("loading config layer {}", path.display());
            merge_tables(&mut merged, read_table(path)?);
        }
        Ok(toml::Value::Table(merged).try_into()?)
    }

    /// User config, then the project config for `input`, then `explicit`
    pub fn load(
        input: Option<&Path>,
        explicit: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();
        if let Some(user) = get_config_path().filter(|p| p.is_file()) {
            layers.push(user);
        }
        if let Some(project) = input.and_then(project_config_path) {
            layers.push(project);
        }
        if let Some(explicit) = explicit {
            layers.push(explicit.to_path_buf());
        }
        Self::from_layers(layers.iter().map(PathBuf::as_path))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
