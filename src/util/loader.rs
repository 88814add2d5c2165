//! Reading and writing IR modules
//!
//! Modules are stored as RON (`.ron`) or JSON (`.json`). Every body is
//! verified on load, so the passes can index locals and blocks freely.

use crate::middle::ir::{verify_body, TyError};
use crate::middle::ty::ModuleIR;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFormat {
    Ron,
    Json,
}

impl ModuleFormat {
    /// Format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "ron" => Some(ModuleFormat::Ron),
            "json" => Some(ModuleFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is neither a .ron nor a .json file")]
    UnknownFormat { path: PathBuf },
    #[error("RON syntax error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON output error: {0}")]
    RonWrite(#[from] ron::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid body `{body}`: {source}")]
    InvalidBody {
        body: String,
        #[source]
        source: TyError,
    },
    #[error("`{item}` refers to body #{index}, but the module has {count} bodies")]
    MissingBody {
        item: String,
        index: usize,
        count: usize,
    },
}

/// Parse and verify a module
pub fn parse_module(
    text: &str,
    format: ModuleFormat,
) -> Result<ModuleIR, LoadError> {
    let module: ModuleIR = match format {
        ModuleFormat::Ron => ron::from_str(text)?,
        ModuleFormat::Json => serde_json::from_str(text)?,
    };
    verify_module(&module)?;
    Ok(module)
}

/// Load a module from a `.ron` or `.json` file
pub fn load_module(path: &Path) -> Result<ModuleIR, LoadError> {
    let format = ModuleFormat::from_path(path).ok_or_else(|| LoadError::UnknownFormat {
        path: path.to_path_buf(),
    })?;
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let module = parse_module(&text, format)?;
    debug!(
        "loaded {}: {} bodies, {} functions, {} statics",
        path.display(),
        module.bodies.len(),
        module.functions.len(),
        module.statics.len()
    );
    Ok(module)
}

pub fn module_to_string(
    module: &ModuleIR,
    format: ModuleFormat,
) -> Result<String, LoadError> {
    Ok(match format {
        ModuleFormat::Ron => ron::ser::to_string_pretty(module, ron::ser::PrettyConfig::default())?,
        ModuleFormat::Json => serde_json::to_string_pretty(module)?,
    })
}

/// Write a module in the format its extension names
pub fn write_module(
    path: &Path,
    module: &ModuleIR,
) -> Result<(), LoadError> {
    let format = ModuleFormat::from_path(path).ok_or_else(|| LoadError::UnknownFormat {
        path: path.to_path_buf(),
    })?;
    let text = module_to_string(module, format)?;
    fs::write(path, text).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Body references of items are in range, and every body (promoted ones
/// included) is well formed
pub fn verify_module(module: &ModuleIR) -> Result<(), LoadError> {
    let count = module.bodies.len();
    let fn_bodies = module.functions.iter().filter_map(|f| Some((&f.name, f.body?)));
    let static_bodies = module.statics.iter().filter_map(|s| Some((&s.name, s.init?)));
    for (item, id) in fn_bodies.chain(static_bodies) {
        if id.0 >= count {
            return Err(LoadError::MissingBody {
                item: item.clone(),
                index: id.0,
                count,
            });
        }
    }

    let mut pending: Vec<_> = module.bodies.iter().collect();
    while let Some(body) = pending.pop() {
        verify_body(module, body).map_err(|source| LoadError::InvalidBody {
            body: body.display_name(),
            source,
        })?;
        pending.extend(body.promoted.iter());
    }
    Ok(())
}
