use rols_hooks::Hook;
use rols_hooks::HookContext;
use rols_hooks::HookRegistry;
use rols_hooks::Plugin;
use rols_workspace::DocumentText;
use serde_json::json;
use serde_json::Value;
use tower_lsp_server::lsp_types::Range;
use tower_lsp_server::lsp_types::SymbolKind;

use crate::names;
use crate::names::NameKind;

/// Classes and functions, nested by indentation.
#[derive(Debug, Clone, Copy)]
pub struct Symbols;

impl Plugin for Symbols {
    fn name(&self) -> &'static str {
        "symbols"
    }

    fn register(&self, registry: &mut HookRegistry) {
        registry.register(Hook::DocumentSymbols, self.name(), document_symbols_hook, 0);
        registry.register(
            Hook::Settings,
            self.name(),
            |_: &HookContext| -> anyhow::Result<Option<Value>> {
                Ok(Some(json!({"plugins": {"symbols": {"enabled": true}}})))
            },
            0,
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub range: Range,
    pub container: Option<String>,
}

fn document_symbols_hook(context: &HookContext) -> anyhow::Result<Option<Value>> {
    let document = context.require_document()?;
    let symbols: Vec<Value> = document_symbols(&document.text()?)
        .into_iter()
        .map(|symbol| {
            let mut value = json!({
                "name": symbol.name,
                "kind": symbol.kind,
                "location": {"uri": document.uri().as_str(), "range": symbol.range},
            });
            if let Some(container) = symbol.container {
                value["containerName"] = Value::String(container);
            }
            value
        })
        .collect();
    Ok((!symbols.is_empty()).then_some(Value::Array(symbols)))
}

#[must_use]
pub fn document_symbols(text: &DocumentText) -> Vec<Symbol> {
    let mut symbols = Vec::new();
    let mut scopes: Vec<(u32, String, NameKind)> = Vec::new();

    for name in names::scan(text) {
        if !matches!(name.kind, NameKind::Function | NameKind::Class) {
            continue;
        }

        while scopes.last().is_some_and(|(indent, _, _)| *indent >= name.indent) {
            scopes.pop();
        }

        let parent = scopes.last();
        let kind = match (name.kind, parent) {
            (NameKind::Class, _) => SymbolKind::CLASS,
            (_, Some((_, _, NameKind::Class))) => SymbolKind::METHOD,
            _ => SymbolKind::FUNCTION,
        };

        symbols.push(Symbol {
            name: name.text.clone(),
            kind,
            range: name.range,
            container: parent.map(|(_, container, _)| container.clone()),
        });
        scopes.push((name.indent, name.text, name.kind));
    }

    symbols
}
