//! 诊断渲染器
//!
//! rustc-style text output:
//!
//! ```text
//! error [E0001] cannot call non-const fn `read_line` in constants
//!  --> input.ron:3:5 (in `LIMIT`)
//! help: only operations with a compile-time result are allowed in constants
//! ```

use crate::util::diagnostic::{Diagnostic, Severity};
use owo_colors::OwoColorize;

/// 渲染器配置
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// 是否启用颜色输出
    pub use_colors: bool,
    /// 是否显示帮助信息
    pub show_help: bool,
    /// 是否显示相关诊断
    pub show_related: bool,
    /// File name shown in locations
    pub file_name: Option<String>,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            use_colors: true,
            show_help: true,
            show_related: true,
            file_name: None,
        }
    }
}

/// 文本诊断渲染器
#[derive(Debug, Clone, Default)]
pub struct TextEmitter {
    config: EmitterConfig,
}

impl TextEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EmitterConfig) -> Self {
        Self { config }
    }

    /// 渲染单个诊断
    pub fn render(
        &self,
        diagnostic: &Diagnostic,
    ) -> String {
        let mut output = String::new();
        self.render_internal(diagnostic, 0, &mut output);
        output
    }

    /// Render `diagnostics` followed by an error/warning count line
    pub fn render_all<'a>(
        &self,
        diagnostics: impl IntoIterator<Item = &'a Diagnostic>,
    ) -> String {
        let mut output = String::new();
        let (mut errors, mut warnings) = (0, 0);
        for diagnostic in diagnostics {
            match diagnostic.severity {
                Severity::Error => errors += 1,
                Severity::Warning => warnings += 1,
                _ => {}
            }
            self.render_internal(diagnostic, 0, &mut output);
            output.push('\n');
        }
        if errors + warnings > 0 {
            output.push_str(&summary_line(errors, warnings));
            output.push('\n');
        }
        output
    }

    fn render_internal(
        &self,
        diagnostic: &Diagnostic,
        indent: usize,
        output: &mut String,
    ) {
        let pad = "  ".repeat(indent);

        // 1. 渲染头部
        output.push_str(&pad);
        output.push_str(&self.render_header(diagnostic));
        output.push('\n');

        // 2. 渲染位置
        if let Some(location) = self.render_location(diagnostic) {
            output.push_str(&pad);
            output.push_str(&location);
            output.push('\n');
        }

        // 3. 渲染帮助信息
        if self.config.show_help && !diagnostic.help.is_empty() {
            output.push_str(&pad);
            output.push_str(&self.paint("help", Severity::Hint));
            output.push_str(": ");
            output.push_str(&diagnostic.help);
            output.push('\n');
        }

        // 4. 渲染相关诊断
        if self.config.show_related {
            for related in &diagnostic.related {
                self.render_internal(related, indent + 1, output);
            }
        }
    }

    fn render_header(
        &self,
        diagnostic: &Diagnostic,
    ) -> String {
        let severity = self.paint(&diagnostic.severity.to_string(), diagnostic.severity);
        if diagnostic.code.is_empty() {
            format!("{}: {}", severity, diagnostic.message)
        } else {
            let code = format!("[{}]", diagnostic.code);
            let code = if self.config.use_colors {
                code.bold().to_string()
            } else {
                code
            };
            format!("{} {} {}", severity, code, diagnostic.message)
        }
    }

    fn render_location(
        &self,
        diagnostic: &Diagnostic,
    ) -> Option<String> {
        let span = diagnostic.span.filter(|span| !span.is_dummy());
        let file = self.config.file_name.as_deref().unwrap_or("<input>");
        let item = diagnostic.item.as_deref();
        match (span, item) {
            (Some(span), Some(item)) => Some(format!(" --> {}:{} (in `{}`)", file, span.start, item)),
            (Some(span), None) => Some(format!(" --> {}:{}", file, span.start)),
            (None, Some(item)) => Some(format!(" --> {} (in `{}`)", file, item)),
            (None, None) => None,
        }
    }

    fn paint(
        &self,
        text: &str,
        severity: Severity,
    ) -> String {
        if !self.config.use_colors {
            return text.to_string();
        }
        match severity {
            Severity::Error => text.red().bold().to_string(),
            Severity::Warning => text.yellow().bold().to_string(),
            Severity::Info => text.blue().to_string(),
            Severity::Hint => text.cyan().to_string(),
        }
    }
}

fn summary_line(
    errors: usize,
    warnings: usize,
) -> String {
    let plural = |n: usize, word: &str| {
        if n == 1 {
            format!("1 {}", word)
        } else {
            format!("{} {}s", n, word)
        }
    };
    match (errors, warnings) {
        (0, w) => format!("{} emitted", plural(w, "warning")),
        (e, 0) => format!("{} emitted", plural(e, "error")),
        (e, w) => format!("{} and {} emitted", plural(e, "error"), plural(w, "warning")),
    }
}
