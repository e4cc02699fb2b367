use rols_hooks::Hook;
use rols_hooks::HookContext;
use rols_hooks::HookRegistry;
use rols_hooks::Plugin;
use rols_workspace::DocumentText;
use serde_json::json;
use serde_json::Value;
use tower_lsp_server::lsp_types::Position;
use tower_lsp_server::lsp_types::Range;

use crate::names;

/// Go-to-definition for names bound in the same document.
#[derive(Debug, Clone, Copy)]
pub struct Definitions;

impl Plugin for Definitions {
    fn name(&self) -> &'static str {
        "definitions"
    }

    fn register(&self, registry: &mut HookRegistry) {
        registry.register(Hook::Definitions, self.name(), definitions_hook, 0);
        registry.register(
            Hook::Settings,
            self.name(),
            |_: &HookContext| -> anyhow::Result<Option<Value>> {
                Ok(Some(json!({"plugins": {"definitions": {"enabled": true}}})))
            },
            0,
        );
    }
}

fn definitions_hook(context: &HookContext) -> anyhow::Result<Option<Value>> {
    let document = context.require_document()?;
    let Some(position) = context.position() else {
        return Ok(None);
    };

    let locations: Vec<Value> = definitions(&document.text()?, position)
        .into_iter()
        .map(|range| json!({"uri": document.uri().as_str(), "range": range}))
        .collect();

    Ok((!locations.is_empty()).then_some(Value::Array(locations)))
}

/// Ranges where the name under the cursor is bound.
#[must_use]
pub fn definitions(text: &DocumentText, position: Position) -> Vec<Range> {
    let names = names::scan(text);
    let Some(target) = names::name_at(&names, position) else {
        return Vec::new();
    };

    names
        .iter()
        .filter(|name| name.text == target.text && name.is_definition())
        .map(|name| name.range)
        .collect()
}
