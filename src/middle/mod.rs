//! Mid-level IR and the passes over it
//!
//! Bodies are control-flow graphs of basic blocks over typed locals. The
//! passes in here decide which temporaries can be computed at compile time,
//! check that const code stays const, and evaluate it.

pub mod builder;
pub mod const_check;
pub mod const_safety;
pub mod interpret;
pub mod ir;
pub mod passes;
pub mod pretty;
pub mod promote;
pub mod qualifs;
pub mod traversal;
pub mod ty;
pub mod visit;

pub use ir::{Body, BodyKind};
pub use passes::{AnalysisReport, Analyzer};
pub use ty::ModuleIR;
