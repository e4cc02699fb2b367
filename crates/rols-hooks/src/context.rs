use std::sync::Arc;

use rols_conf::ResolvedConfig;
use rols_workspace::Document;
use rols_workspace::Workspace;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;
use tower_lsp_server::lsp_types::Position;
use tower_lsp_server::lsp_types::Range;

/// Everything a hook implementation gets to see.
///
/// The context is a snapshot: the document is a clone and the configuration is an
/// already merged tree, so implementations never hold session locks.
#[derive(Debug, Clone)]
pub struct HookContext {
    workspace: Arc<Workspace>,
    config: ResolvedConfig,
    document: Option<Document>,
    params: Value,
}

impl HookContext {
    /// A context scoped to the workspace root, without a document.
    #[must_use]
    pub fn new(workspace: Arc<Workspace>) -> Self {
        let config = workspace.resolve_config(None);
        Self {
            workspace,
            config,
            document: None,
            params: Value::Null,
        }
    }

    /// A context for `document`, with configuration resolved from its location.
    #[must_use]
    pub fn for_document(workspace: Arc<Workspace>, document: Document) -> Self {
        let config = workspace.resolve_config(Some(document.uri()));
        Self {
            workspace,
            config,
            document: Some(document),
            params: Value::Null,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ResolvedConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    #[must_use]
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    #[must_use]
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// The document, or an error for hooks that cannot run without one.
    pub fn require_document(&self) -> anyhow::Result<&Document> {
        self.document
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("hook needs a document"))
    }

    #[must_use]
    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Deserialize one request parameter, `None` when absent or of the wrong shape.
    #[must_use]
    pub fn param<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let value = self.params.get(name)?;
        serde_json::from_value(value.clone()).ok()
    }

    #[must_use]
    pub fn position(&self) -> Option<Position> {
        self.param("position")
    }

    #[must_use]
    pub fn range(&self) -> Option<Range> {
        self.param("range")
    }

    #[must_use]
    pub fn plugin_settings(&self, plugin: &str) -> Map<String, Value> {
        self.config.plugin_settings(plugin)
    }
}
