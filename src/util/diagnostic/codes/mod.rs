//! 错误码注册表
//!
//! Every code the analyzer can report, with its message and help
//! templates. `E0xxx` are errors, `W0xxx` warnings, `N0xxx` notes that
//! only appear as related information.

pub mod builder;
pub mod e0xxx;
pub mod n0xxx;
pub mod w0xxx;

pub use builder::DiagnosticBuilder;

use crate::util::diagnostic::Severity;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Operations not allowed in const contexts
    ConstCheck,
    /// Compile-time evaluation
    ConstEval,
    /// Promotion of temporaries and required-const arguments
    Promotion,
    /// Const safety of code
    ConstSafety,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ErrorCategory::ConstCheck => write!(f, "Const Check"),
            ErrorCategory::ConstEval => write!(f, "Const Eval"),
            ErrorCategory::Promotion => write!(f, "Promotion"),
            ErrorCategory::ConstSafety => write!(f, "Const Safety"),
        }
    }
}

/// 错误码定义
#[derive(Debug, Clone, Copy)]
pub struct ErrorCodeDefinition {
    /// 错误码，如 "E0001"
    pub code: &'static str,
    pub category: ErrorCategory,
    pub severity: Severity,
    /// 消息模板，支持 {param} 占位符
    pub message_template: &'static str,
    pub help_template: &'static str,
}

impl ErrorCodeDefinition {
    /// 根据代码查找错误码定义
    pub fn find(code: &str) -> Option<&'static Self> {
        Self::all().find(|c| c.code == code)
    }

    /// 获取所有错误码
    pub fn all() -> impl Iterator<Item = &'static Self> {
        e0xxx::E0XXX
            .iter()
            .chain(w0xxx::W0XXX.iter())
            .chain(n0xxx::N0XXX.iter())
    }

    /// 按类别获取错误码
    pub fn by_category(category: ErrorCategory) -> impl Iterator<Item = &'static Self> {
        Self::all().filter(move |c| c.category == category)
    }

    /// 创建 DiagnosticBuilder
    pub fn builder(&self) -> DiagnosticBuilder {
        DiagnosticBuilder::new(
            self.code,
            self.severity,
            self.message_template,
            self.help_template,
        )
    }
}
