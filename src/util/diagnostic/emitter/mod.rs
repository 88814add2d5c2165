//! 诊断输出模块

pub mod json;
pub mod text;

pub use json::{JsonEmitter, LspDiagnostic};
pub use text::{EmitterConfig, TextEmitter};
