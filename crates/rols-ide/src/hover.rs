use rols_hooks::Hook;
use rols_hooks::HookContext;
use rols_hooks::HookRegistry;
use rols_hooks::Plugin;
use rols_workspace::DocumentText;
use serde_json::json;
use serde_json::Value;
use tower_lsp_server::lsp_types::Hover as LspHover;
use tower_lsp_server::lsp_types::HoverContents;
use tower_lsp_server::lsp_types::LanguageString;
use tower_lsp_server::lsp_types::MarkedString;
use tower_lsp_server::lsp_types::Position;

use crate::names;
use crate::names::NameKind;

/// Signature and docstring of functions defined in the same document.
#[derive(Debug, Clone, Copy)]
pub struct Hover;

impl Plugin for Hover {
    fn name(&self) -> &'static str {
        "hover"
    }

    fn register(&self, registry: &mut HookRegistry) {
        registry.register(Hook::Hover, self.name(), hover_hook, 0);
        registry.register(
            Hook::Settings,
            self.name(),
            |_: &HookContext| -> anyhow::Result<Option<Value>> {
                Ok(Some(json!({"plugins": {"hover": {"enabled": true}}})))
            },
            0,
        );
    }
}

fn hover_hook(context: &HookContext) -> anyhow::Result<Option<Value>> {
    let document = context.require_document()?;
    let Some(position) = context.position() else {
        return Ok(None);
    };

    match hover(&document.text()?, position) {
        Some(hover) => Ok(Some(serde_json::to_value(hover)?)),
        None => Ok(None),
    }
}

#[must_use]
pub fn hover(text: &DocumentText, position: Position) -> Option<LspHover> {
    let names = names::scan(text);
    let target = names::name_at(&names, position)?;
    let definition = names
        .iter()
        .find(|name| name.text == target.text && name.kind == NameKind::Function)?;

    let line_number = definition.range.start.line as usize;
    let line: Vec<char> = text.line(line_number)?.chars().collect();
    let after_name = definition.range.end.character as usize;
    let signature = format!(
        "{}{}",
        definition.text,
        parameters(&line[after_name.min(line.len())..])
    );

    let mut contents = vec![MarkedString::LanguageString(LanguageString {
        language: "python".to_string(),
        value: signature,
    })];
    if let Some(docstring) = docstring(text, line_number + 1) {
        contents.push(MarkedString::String(docstring));
    }

    Some(LspHover {
        contents: HoverContents::Array(contents),
        range: None,
    })
}

/// The parenthesised parameter list at the start of `rest`, on a single line.
fn parameters(rest: &[char]) -> String {
    if rest.first() != Some(&'(') {
        return String::new();
    }

    let mut depth = 0usize;
    for (i, c) in rest.iter().enumerate() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return rest[..=i].iter().collect();
                }
            }
            _ => {}
        }
    }
    rest.iter().collect::<String>().trim_end_matches(':').to_string()
}

/// Text of a triple-quoted string starting on `line_number`.
fn docstring(text: &DocumentText, line_number: usize) -> Option<String> {
    let first = text.line(line_number)?.trim_start();
    let quote = first.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let delimiter = quote.to_string().repeat(3);
    let body = first.strip_prefix(delimiter.as_str())?;

    if let Some((inner, _)) = body.split_once(delimiter.as_str()) {
        return Some(inner.trim().to_string());
    }

    let mut lines = vec![body.trim().to_string()];
    for next in line_number + 1..text.line_index().line_count() {
        let line = text.line(next)?;
        if let Some((inner, _)) = line.split_once(delimiter.as_str()) {
            lines.push(inner.trim().to_string());
            return Some(lines.join("\n").trim().to_string());
        }
        lines.push(line.trim().to_string());
    }
    None
}
