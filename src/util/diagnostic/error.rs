//! 诊断数据结构
//!
//! `Diagnostic` carries a fully rendered message and help text. Diagnostics
//! are only created through a registered code (`ErrorCodeDefinition`) and
//! its `DiagnosticBuilder`, so every code a user sees is documented in the
//! registry.

use crate::util::span::Span;
use serde::Serialize;

/// 诊断严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Hint,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// 检查是否为错误级别
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
            Severity::Hint => write!(f, "hint"),
        }
    }
}

/// 诊断信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// 错误码，如 "E0001"
    pub code: String,
    pub message: String,
    /// Empty when the code has no help text
    pub help: String,
    pub span: Option<Span>,
    /// Item the diagnostic was reported in
    pub item: Option<String>,
    pub related: Vec<Diagnostic>,
}

impl Diagnostic {
    /// Only `DiagnosticBuilder::build` creates diagnostics.
    pub(crate) fn new(
        severity: Severity,
        code: String,
        message: String,
        help: String,
        span: Option<Span>,
    ) -> Self {
        Self {
            severity,
            code,
            message,
            help,
            span,
            item: None,
            related: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity.is_error()
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)
    }
}
