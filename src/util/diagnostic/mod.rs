//! 统一诊断系统
//!
//! # 模块结构
//!
//! - [`error`] - 诊断数据结构 (Diagnostic, Severity)
//! - [`codes`] - 错误码注册表与构建器
//! - [`emitter`] - 文本与 JSON 输出
//!
//! # 示例
//!
//! ```ignore
//! use const_promotion::util::diagnostic::{ErrorCodeDefinition, TextEmitter};
//!
//! let diagnostic = ErrorCodeDefinition::unconditional_panic("f", "explicit panic")
//!     .at(span)
//!     .build();
//! print!("{}", TextEmitter::new().render(&diagnostic));
//! ```

pub mod codes;
pub mod emitter;
pub mod error;

pub use codes::{DiagnosticBuilder, ErrorCategory, ErrorCodeDefinition};
pub use emitter::{EmitterConfig, JsonEmitter, TextEmitter};
pub use error::{Diagnostic, Severity};
