//! N0xxx: notes attached to another diagnostic as related information.

use super::{DiagnosticBuilder, ErrorCategory, ErrorCodeDefinition};
use crate::util::diagnostic::Severity;

pub const ARGUMENT_ORIGIN: ErrorCodeDefinition = ErrorCodeDefinition {
    code: "N0001",
    category: ErrorCategory::Promotion,
    severity: Severity::Hint,
    message_template: "argument {index} gets its value here",
    help_template: "",
};

/// N0xxx 注释码列表
pub static N0XXX: &[ErrorCodeDefinition] = &[ARGUMENT_ORIGIN];

impl ErrorCodeDefinition {
    /// N0001 where a rejected required-const argument was computed
    pub fn argument_origin(index: usize) -> DiagnosticBuilder {
        ARGUMENT_ORIGIN.builder().param("index", index.to_string())
    }
}
