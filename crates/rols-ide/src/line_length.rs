use rols_hooks::Hook;
use rols_hooks::HookContext;
use rols_hooks::HookRegistry;
use rols_hooks::Plugin;
use rols_workspace::DocumentText;
use serde_json::json;
use serde_json::Value;
use tower_lsp_server::lsp_types::Diagnostic;
use tower_lsp_server::lsp_types::DiagnosticSeverity;
use tower_lsp_server::lsp_types::NumberOrString;
use tower_lsp_server::lsp_types::Position;
use tower_lsp_server::lsp_types::Range;

use crate::names::to_u32;
use crate::SOURCE_NAME;

const DEFAULT_MAX_LINE_LENGTH: usize = 79;

/// Flags lines longer than `maxLineLength`.
///
/// The limit comes from this plugin's own settings and falls back to the
/// `pycodestyle` settings, so a `[pycodestyle]` section in `setup.cfg` applies.
#[derive(Debug, Clone, Copy)]
pub struct LineLength;

impl Plugin for LineLength {
    fn name(&self) -> &'static str {
        "line_length"
    }

    fn register(&self, registry: &mut HookRegistry) {
        registry.register(Hook::Lint, self.name(), lint_hook, 0);
        registry.register(
            Hook::Settings,
            self.name(),
            |_: &HookContext| -> anyhow::Result<Option<Value>> {
                Ok(Some(json!({"plugins": {"line_length": {"enabled": true}}})))
            },
            0,
        );
    }
}

fn lint_hook(context: &HookContext) -> anyhow::Result<Option<Value>> {
    let document = context.require_document()?;
    let max = max_line_length(context);
    let diagnostics = lint(&document.text()?, max);
    tracing::debug!(
        "{} lines over {} characters in {}",
        diagnostics.len(),
        max,
        document.uri()
    );
    Ok(Some(serde_json::to_value(diagnostics)?))
}

fn max_line_length(context: &HookContext) -> usize {
    ["line_length", "pycodestyle"]
        .iter()
        .find_map(|plugin| {
            context
                .plugin_settings(plugin)
                .get("maxLineLength")
                .and_then(Value::as_u64)
        })
        .and_then(|max| usize::try_from(max).ok())
        .unwrap_or(DEFAULT_MAX_LINE_LENGTH)
}

#[must_use]
pub fn lint(text: &DocumentText, max: usize) -> Vec<Diagnostic> {
    text.lines()
        .enumerate()
        .filter_map(|(line, content)| {
            let length = content.chars().count();
            (length > max).then(|| Diagnostic {
                range: Range::new(
                    Position::new(to_u32(line), to_u32(max)),
                    Position::new(to_u32(line), to_u32(length)),
                ),
                severity: Some(DiagnosticSeverity::WARNING),
                code: Some(NumberOrString::String("E501".to_string())),
                source: Some(SOURCE_NAME.to_string()),
                message: format!("E501 line too long ({length} > {max} characters)"),
                ..Diagnostic::default()
            })
        })
        .collect()
}
