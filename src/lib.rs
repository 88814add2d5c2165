//! const-promotion
//!
//! Promotion of constant temporaries over a mid-level IR, with the checks
//! that decide what may run at compile time.
//!
//! A module (`middle::ModuleIR`) holds function, `const` and `static`
//! bodies as control-flow graphs. The analyzer
//!
//! - rejects operations that are not allowed in const contexts,
//! - flags operations whose result may differ between compile time and
//!   runtime (const safety),
//! - moves borrows of constant temporaries such as `&(1 + 2)` into promoted
//!   constants, and
//! - evaluates `const` and `static` initializers with a small interpreter.
//!
//! # Example
//!
//! ```no_run
//! use const_promotion::util::config::Config;
//! use const_promotion::{analyze_file, Result};
//!
//! fn main() -> Result<()> {
//!     let (_module, report) = analyze_file("module.ron".as_ref(), &Config::default())?;
//!     for item in &report.items {
//!         println!("{}: {} = {}", item.name, item.ty, item.value);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod middle;
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

use crate::middle::{AnalysisReport, Analyzer, ModuleIR};
use crate::util::config::Config;
use std::path::Path;
use tracing::debug;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tool name, also the `source` of emitted diagnostics
pub const NAME: &str = "const-promotion";

/// Run the whole pipeline over `module`, rewriting its bodies in place
pub fn analyze_module(
    module: &mut ModuleIR,
    config: &Config,
) -> Result<AnalysisReport> {
    let report = Analyzer::new(config.clone())
        .run(module)
        .context("promotion failed")?;
    Ok(report)
}

/// Load a `.ron` or `.json` module and run the pipeline over it
pub fn analyze_file(
    path: &Path,
    config: &Config,
) -> Result<(ModuleIR, AnalysisReport)> {
    debug!("analyzing {}", path.display());
    let mut module = util::loader::load_module(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let report = analyze_module(&mut module, config)
        .with_context(|| format!("failed to analyze {}", path.display()))?;
    Ok((module, report))
}
