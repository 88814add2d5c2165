//! 通用诊断构建器
//!
//! 支持模板参数化的错误消息构建器: `{name}` placeholders in a code's
//! message and help templates are filled from the builder's params.

use crate::util::diagnostic::{Diagnostic, Severity};
use crate::util::span::Span;

/// 诊断构建器（支持模板参数）
#[derive(Debug, Clone)]
pub struct DiagnosticBuilder {
    code: &'static str,
    severity: Severity,
    message_template: &'static str,
    help_template: &'static str,
    params: Vec<(&'static str, String)>,
    span: Option<Span>,
    item: Option<String>,
    related: Vec<Diagnostic>,
}

impl DiagnosticBuilder {
    pub fn new(
        code: &'static str,
        severity: Severity,
        message_template: &'static str,
        help_template: &'static str,
    ) -> Self {
        Self {
            code,
            severity,
            message_template,
            help_template,
            params: Vec::new(),
            span: None,
            item: None,
            related: Vec::new(),
        }
    }

    /// 添加模板参数
    pub fn param(
        mut self,
        key: &'static str,
        value: impl Into<String>,
    ) -> Self {
        self.params.push((key, value.into()));
        self
    }

    /// 设置位置
    #[inline]
    pub fn at(
        mut self,
        span: Span,
    ) -> Self {
        self.span = Some(span);
        self
    }

    /// Item the diagnostic belongs to
    #[inline]
    pub fn in_item(
        mut self,
        item: impl Into<String>,
    ) -> Self {
        self.item = Some(item.into());
        self
    }

    /// Override the registered severity, for lints with a configurable level
    #[inline]
    pub fn with_severity(
        mut self,
        severity: Severity,
    ) -> Self {
        self.severity = severity;
        self
    }

    /// 添加相关诊断
    #[inline]
    pub fn with_related(
        mut self,
        related: Vec<Diagnostic>,
    ) -> Self {
        self.related = related;
        self
    }

    /// 构建 Diagnostic
    pub fn build(self) -> Diagnostic {
        if cfg!(debug_assertions) {
            self.validate_params();
        }
        let message = render(self.message_template, &self.params);
        let help = render(self.help_template, &self.params);
        let mut diagnostic =
            Diagnostic::new(self.severity, self.code.to_string(), message, help, self.span);
        diagnostic.item = self.item;
        diagnostic.related = self.related;
        diagnostic
    }

    /// Every placeholder must have a param; catches typos in tests
    fn validate_params(&self) {
        for key in placeholders(self.message_template).chain(placeholders(self.help_template)) {
            assert!(
                self.params.iter().any(|(k, _)| *k == key),
                "diagnostic {} is missing template parameter `{}`",
                self.code,
                key
            );
        }
    }
}

fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    template.split('{').skip(1).filter_map(|rest| rest.split_once('}').map(|(key, _)| key))
}

/// Replace `{key}` with its param. Unknown placeholders are left as they are.
fn render(
    template: &str,
    params: &[(&'static str, String)],
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match params.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
