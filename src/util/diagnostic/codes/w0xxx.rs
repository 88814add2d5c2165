//! W0xxx: warnings. Reported, but the analysis still succeeds.

use super::{DiagnosticBuilder, ErrorCategory, ErrorCodeDefinition};
use crate::util::diagnostic::Severity;

pub const UNCONDITIONAL_PANIC: ErrorCodeDefinition = ErrorCodeDefinition {
    code: "W0001",
    category: ErrorCategory::Promotion,
    severity: Severity::Warning,
    message_template: "this operation will panic at runtime: {message}",
    help_template: "the value was not promoted; the panic happens when `{item}` runs",
};

pub const UNCONST_OPERATION_WARN: ErrorCodeDefinition = ErrorCodeDefinition {
    code: "W0002",
    category: ErrorCategory::ConstSafety,
    severity: Severity::Warning,
    message_template: "{op} may give a different result at compile time",
    help_template: "wrap it in an `unconst` block to allow it",
};

/// W0xxx 警告码列表
pub static W0XXX: &[ErrorCodeDefinition] = &[UNCONDITIONAL_PANIC, UNCONST_OPERATION_WARN];

impl ErrorCodeDefinition {
    /// W0001 promoted value panics during evaluation
    pub fn unconditional_panic(
        item: &str,
        message: impl Into<String>,
    ) -> DiagnosticBuilder {
        UNCONDITIONAL_PANIC
            .builder()
            .param("item", item)
            .param("message", message)
    }

    /// W0002 unconst operation, at warning level
    pub fn unconst_operation_warn(op: impl Into<String>) -> DiagnosticBuilder {
        UNCONST_OPERATION_WARN.builder().param("op", op)
    }
}
