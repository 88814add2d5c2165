//! 错误码定义
//!
//! E0xxx: errors. Any of them fails the analysis.

use super::{DiagnosticBuilder, ErrorCategory, ErrorCodeDefinition};
use crate::util::diagnostic::Severity;

pub const NOT_CONST: ErrorCodeDefinition = ErrorCodeDefinition {
    code: "E0001",
    category: ErrorCategory::ConstCheck,
    severity: Severity::Error,
    message_template: "{reason}",
    help_template: "only operations with a compile-time result are allowed in {context}",
};

pub const CONST_EVAL_FAILED: ErrorCodeDefinition = ErrorCodeDefinition {
    code: "E0002",
    category: ErrorCategory::ConstEval,
    severity: Severity::Error,
    message_template: "evaluation of `{item}` failed: {reason}",
    help_template: "",
};

pub const ARGUMENT_NOT_CONST: ErrorCodeDefinition = ErrorCodeDefinition {
    code: "E0003",
    category: ErrorCategory::Promotion,
    severity: Severity::Error,
    message_template: "argument {index} of `{callee}` must be a constant",
    help_template: "the argument cannot be computed at compile time: {reason}",
};

pub const UNCONST_OPERATION: ErrorCodeDefinition = ErrorCodeDefinition {
    code: "E0004",
    category: ErrorCategory::ConstSafety,
    severity: Severity::Error,
    message_template: "{op} is not const safe",
    help_template: "wrap it in an `unconst` block if the result may differ between compile time and runtime",
};

/// E0xxx 错误码列表
pub static E0XXX: &[ErrorCodeDefinition] =
    &[NOT_CONST, CONST_EVAL_FAILED, ARGUMENT_NOT_CONST, UNCONST_OPERATION];

// E0xxx 快捷方法
impl ErrorCodeDefinition {
    /// E0001 operation not allowed in a const context
    pub fn not_const(
        reason: impl Into<String>,
        context: &str,
    ) -> DiagnosticBuilder {
        NOT_CONST
            .builder()
            .param("reason", reason)
            .param("context", context)
    }

    /// E0002 const or static initializer failed to evaluate
    pub fn const_eval_failed(
        item: &str,
        reason: impl Into<String>,
    ) -> DiagnosticBuilder {
        CONST_EVAL_FAILED
            .builder()
            .param("item", item)
            .param("reason", reason)
    }

    /// E0003 required-const argument is not a constant
    pub fn argument_not_const(
        index: usize,
        callee: &str,
        reason: impl Into<String>,
    ) -> DiagnosticBuilder {
        ARGUMENT_NOT_CONST
            .builder()
            .param("index", index.to_string())
            .param("callee", callee)
            .param("reason", reason)
    }

    /// E0004 unconst operation outside an `unconst` block
    pub fn unconst_operation(op: impl Into<String>) -> DiagnosticBuilder {
        UNCONST_OPERATION.builder().param("op", op)
    }
}
