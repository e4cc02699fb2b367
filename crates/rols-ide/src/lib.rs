//! Built-in plugins
//!
//! Small, self-contained implementations of a few hooks. They go through the same
//! [`Plugin`] contract as any other plugin and can be disabled through settings.

mod definitions;
mod folding;
mod highlight;
mod hover;
mod line_length;
pub mod names;
mod symbols;

use rols_hooks::HookRegistry;
use rols_hooks::Plugin;

pub use crate::definitions::definitions;
pub use crate::definitions::Definitions;
pub use crate::folding::folding_ranges;
pub use crate::folding::Folding;
pub use crate::highlight::document_highlight;
pub use crate::highlight::Highlight;
pub use crate::hover::hover;
pub use crate::hover::Hover;
pub use crate::line_length::lint;
pub use crate::line_length::LineLength;
pub use crate::symbols::document_symbols;
pub use crate::symbols::Symbol;
pub use crate::symbols::Symbols;

/// Value of the `source` field on diagnostics produced here.
pub const SOURCE_NAME: &str = "rols";

static BUILTINS: [&dyn Plugin; 6] = [
    &Definitions,
    &Folding,
    &Highlight,
    &Hover,
    &LineLength,
    &Symbols,
];

#[must_use]
pub fn builtin_plugins() -> &'static [&'static dyn Plugin] {
    &BUILTINS
}

/// A registry with every built-in plugin added.
#[must_use]
pub fn builtin_registry() -> HookRegistry {
    let mut registry = HookRegistry::new();
    for plugin in builtin_plugins() {
        registry.add_plugin(*plugin);
    }
    registry
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rols_conf::Config;
    use rols_hooks::Dispatcher;
    use rols_hooks::Hook;
    use rols_hooks::HookContext;
    use rols_workspace::Workspace;
    use serde_json::json;
    use serde_json::Value;
    use url::Url;

    use super::*;

    fn setup(source: &str) -> (Dispatcher, Arc<Workspace>, Url) {
        let workspace = Arc::new(Workspace::with_config(
            Url::parse("file:///ws").unwrap(),
            Config::with_user_config_dir(None, None),
        ));
        let uri = Url::parse("file:///ws/mod.py").unwrap();
        workspace.put_document(uri.clone(), source, Some(1));
        let dispatcher = Dispatcher::new(builtin_registry(), Duration::from_secs(5));
        (dispatcher, workspace, uri)
    }

    #[test]
    fn test_builtin_names() {
        let registry = builtin_registry();
        assert_eq!(
            registry.plugins(),
            ["definitions", "folding", "highlight", "hover", "line_length", "symbols"]
        );
    }

    #[tokio::test]
    async fn test_settings_hook_collects_defaults() {
        let (dispatcher, workspace, _) = setup("");
        let context = HookContext::new(workspace);

        let Value::Array(defaults) = dispatcher.dispatch(Hook::Settings, &context).await else {
            panic!("settings is an aggregate hook");
        };
        assert_eq!(defaults.len(), builtin_plugins().len());
        assert!(defaults.contains(&json!({"plugins": {"hover": {"enabled": true}}})));
    }

    #[tokio::test]
    async fn test_highlight_through_dispatcher() {
        let (dispatcher, workspace, uri) = setup("a = 1\nprint(a)\n");
        let document = workspace.get_document(&uri);
        let context = HookContext::for_document(workspace, document)
            .with_params(json!({"position": {"line": 1, "character": 6}}));

        let result = dispatcher.dispatch(Hook::DocumentHighlight, &context).await;
        assert_eq!(
            result,
            json!([[
                {"range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 1}}, "kind": 3},
                {"range": {"start": {"line": 1, "character": 6}, "end": {"line": 1, "character": 7}}, "kind": 2},
            ]])
        );
    }

    #[tokio::test]
    async fn test_disabled_builtin() {
        let (dispatcher, workspace, uri) = setup("def f():\n    pass\n\nf()\n");
        workspace
            .config()
            .update(json!({"plugins": {"definitions": {"enabled": false}}}));
        let document = workspace.get_document(&uri);
        let context = HookContext::for_document(workspace, document)
            .with_params(json!({"position": {"line": 3, "character": 0}}));

        let result = dispatcher.dispatch(Hook::Definitions, &context).await;
        assert_eq!(result, json!([]));
    }

    #[tokio::test]
    async fn test_definition_shape() {
        let (dispatcher, workspace, uri) = setup("def f():\n    pass\n\nf()\n");
        let document = workspace.get_document(&uri);
        let context = HookContext::for_document(workspace, document)
            .with_params(json!({"position": {"line": 3, "character": 0}}));

        let result = dispatcher.dispatch(Hook::Definitions, &context).await;
        assert_eq!(
            result,
            json!([[{
                "uri": "file:///ws/mod.py",
                "range": {"start": {"line": 0, "character": 4}, "end": {"line": 0, "character": 5}},
            }]])
        );
    }
}
