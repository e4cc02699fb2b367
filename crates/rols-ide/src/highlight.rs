use rols_hooks::Hook;
use rols_hooks::HookContext;
use rols_hooks::HookRegistry;
use rols_hooks::Plugin;
use rols_workspace::DocumentText;
use serde_json::json;
use serde_json::Value;
use tower_lsp_server::lsp_types::DocumentHighlight;
use tower_lsp_server::lsp_types::DocumentHighlightKind;
use tower_lsp_server::lsp_types::Position;

use crate::names;

/// Highlights every occurrence of the name under the cursor.
#[derive(Debug, Clone, Copy)]
pub struct Highlight;

impl Plugin for Highlight {
    fn name(&self) -> &'static str {
        "highlight"
    }

    fn register(&self, registry: &mut HookRegistry) {
        registry.register(Hook::DocumentHighlight, self.name(), document_highlight_hook, 0);
        registry.register(
            Hook::Settings,
            self.name(),
            |_: &HookContext| -> anyhow::Result<Option<Value>> {
                Ok(Some(json!({"plugins": {"highlight": {"enabled": true}}})))
            },
            0,
        );
    }
}

fn document_highlight_hook(context: &HookContext) -> anyhow::Result<Option<Value>> {
    let document = context.require_document()?;
    let Some(position) = context.position() else {
        return Ok(None);
    };

    let highlights = document_highlight(&document.text()?, position);
    if highlights.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_value(highlights)?))
}

/// Occurrences of the name at `position`; bindings are writes, everything else reads.
#[must_use]
pub fn document_highlight(text: &DocumentText, position: Position) -> Vec<DocumentHighlight> {
    let names = names::scan(text);
    let Some(target) = names::name_at(&names, position) else {
        return Vec::new();
    };

    names
        .iter()
        .filter(|name| name.text == target.text)
        .map(|name| DocumentHighlight {
            range: name.range,
            kind: Some(if name.is_definition() {
                DocumentHighlightKind::WRITE
            } else {
                DocumentHighlightKind::READ
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight() {
        let text = DocumentText::new("a = \"hello\"\na.startswith(\"b\")\n");

        let highlights = document_highlight(&text, Position::new(1, 0));
        assert_eq!(
            serde_json::to_value(highlights).unwrap(),
            json!([
                {
                    "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 1}},
                    "kind": 3,
                },
                {
                    "range": {"start": {"line": 1, "character": 0}, "end": {"line": 1, "character": 1}},
                    "kind": 2,
                },
            ])
        );
    }

    #[test]
    fn test_sys_highlight() {
        let text = DocumentText::new("import sys\nprint sys.path\n");

        let highlights = document_highlight(&text, Position::new(0, 8));
        assert_eq!(
            serde_json::to_value(highlights).unwrap(),
            json!([
                {
                    "range": {"start": {"line": 0, "character": 7}, "end": {"line": 0, "character": 10}},
                    "kind": 3,
                },
                {
                    "range": {"start": {"line": 1, "character": 6}, "end": {"line": 1, "character": 9}},
                    "kind": 2,
                },
            ])
        );
    }

    #[test]
    fn test_nothing_under_cursor() {
        let text = DocumentText::new("x = 1\n\n");
        assert!(document_highlight(&text, Position::new(1, 0)).is_empty());
    }
}
