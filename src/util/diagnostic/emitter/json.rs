//! JSON 诊断渲染器
//!
//! 提供符合 Language Server Protocol (LSP) 规范的 JSON 输出

use crate::util::diagnostic::{Diagnostic, Severity};
use crate::util::span::Span;
use serde::{Deserialize, Serialize};
use serde_json::to_string_pretty;

/// LSP 诊断严重级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(into = "u8", from = "u8")]
pub enum LspDiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl From<LspDiagnosticSeverity> for u8 {
    fn from(val: LspDiagnosticSeverity) -> Self {
        val as u8
    }
}

impl From<u8> for LspDiagnosticSeverity {
    fn from(val: u8) -> Self {
        match val {
            1 => LspDiagnosticSeverity::Error,
            2 => LspDiagnosticSeverity::Warning,
            4 => LspDiagnosticSeverity::Hint,
            _ => LspDiagnosticSeverity::Information,
        }
    }
}

impl From<Severity> for LspDiagnosticSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => LspDiagnosticSeverity::Error,
            Severity::Warning => LspDiagnosticSeverity::Warning,
            Severity::Info => LspDiagnosticSeverity::Information,
            Severity::Hint => LspDiagnosticSeverity::Hint,
        }
    }
}

/// LSP 位置范围
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LspRange {
    pub start: LspPosition,
    pub end: LspPosition,
}

/// LSP 位置 (zero-based)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LspPosition {
    pub line: u32,
    pub character: u32,
}

/// LSP 诊断结构
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspDiagnostic {
    pub range: LspRange,
    pub severity: Option<LspDiagnosticSeverity>,
    pub code: Option<String>,
    pub source: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Item the diagnostic was reported in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_information: Vec<LspDiagnostic>,
}

/// JSON 诊断渲染器
#[derive(Debug, Clone)]
pub struct JsonEmitter;

impl JsonEmitter {
    /// 渲染诊断为 JSON 字符串
    pub fn render(diagnostic: &Diagnostic) -> String {
        to_string_pretty(&Self::to_lsp_diagnostic(diagnostic)).unwrap_or_else(|_| "{}".to_string())
    }

    /// 渲染多个诊断
    pub fn render_all(diagnostics: &[Diagnostic]) -> String {
        let lsp: Vec<LspDiagnostic> = diagnostics.iter().map(Self::to_lsp_diagnostic).collect();
        to_string_pretty(&lsp).unwrap_or_else(|_| "[]".to_string())
    }

    /// 转换为 LSP 诊断结构
    pub fn to_lsp_diagnostic(diagnostic: &Diagnostic) -> LspDiagnostic {
        LspDiagnostic {
            range: Self::span_to_range(diagnostic.span.as_ref()),
            severity: Some(diagnostic.severity.into()),
            code: (!diagnostic.code.is_empty()).then(|| diagnostic.code.clone()),
            source: crate::NAME.to_string(),
            message: diagnostic.message.clone(),
            help: (!diagnostic.help.is_empty()).then(|| diagnostic.help.clone()),
            item: diagnostic.item.clone(),
            related_information: diagnostic.related.iter().map(Self::to_lsp_diagnostic).collect(),
        }
    }

    /// 转换 Span 到 LSP Range
    fn span_to_range(span: Option<&Span>) -> LspRange {
        match span {
            Some(s) if !s.is_dummy() => LspRange {
                start: LspPosition {
                    line: s.start.line.saturating_sub(1) as u32,
                    character: s.start.column.saturating_sub(1) as u32,
                },
                end: LspPosition {
                    line: s.end.line.saturating_sub(1) as u32,
                    character: s.end.column.saturating_sub(1) as u32,
                },
            },
            _ => Self::dummy_range(),
        }
    }

    /// 创建虚拟 Range（用于无位置的错误）
    fn dummy_range() -> LspRange {
        let origin = LspPosition { line: 0, character: 0 };
        LspRange {
            start: origin,
            end: origin,
        }
    }
}
