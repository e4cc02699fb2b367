use rols_hooks::Hook;
use rols_hooks::HookContext;
use rols_hooks::HookRegistry;
use rols_hooks::Plugin;
use rols_workspace::DocumentText;
use serde_json::json;
use serde_json::Value;

use crate::names::to_u32;

/// Folds the body of every block opened by a line ending in `:`.
#[derive(Debug, Clone, Copy)]
pub struct Folding;

impl Plugin for Folding {
    fn name(&self) -> &'static str {
        "folding"
    }

    fn register(&self, registry: &mut HookRegistry) {
        registry.register(Hook::FoldingRange, self.name(), folding_range_hook, 0);
        registry.register(
            Hook::Settings,
            self.name(),
            |_: &HookContext| -> anyhow::Result<Option<Value>> {
                Ok(Some(json!({"plugins": {"folding": {"enabled": true}}})))
            },
            0,
        );
    }
}

fn folding_range_hook(context: &HookContext) -> anyhow::Result<Option<Value>> {
    let document = context.require_document()?;
    let ranges: Vec<Value> = folding_ranges(&document.text()?)
        .into_iter()
        .map(|(start, end)| json!({"startLine": start, "endLine": end}))
        .collect();
    Ok((!ranges.is_empty()).then_some(Value::Array(ranges)))
}

/// `(start_line, end_line)` pairs, sorted by start line.
#[must_use]
pub fn folding_ranges(text: &DocumentText) -> Vec<(u32, u32)> {
    let lines: Vec<Option<(usize, &str)>> = text
        .lines()
        .map(|line| {
            let code = line.split('#').next().unwrap_or_default().trim_end();
            let indent = line.len() - line.trim_start().len();
            (!code.trim().is_empty()).then_some((indent, code))
        })
        .collect();

    let mut ranges = Vec::new();
    for (start, line) in lines.iter().enumerate() {
        let Some((indent, code)) = line else {
            continue;
        };
        if !code.ends_with(':') {
            continue;
        }

        let end = lines[start + 1..]
            .iter()
            .enumerate()
            .filter_map(|(offset, line)| line.map(|(inner, _)| (start + 1 + offset, inner)))
            .take_while(|(_, inner)| inner > indent)
            .last()
            .map(|(end, _)| end);

        if let Some(end) = end {
            ranges.push((to_u32(start), to_u32(end)));
        }
    }
    ranges
}
