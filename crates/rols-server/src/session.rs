//! Multi-root session state
//!
//! A [`Session`] owns one root [`Workspace`] plus any number of additional workspace
//! folders and routes every document and configuration operation to the workspace
//! that owns the URI involved. Ownership goes to the registered root that is the
//! longest containing ancestor of a URI, falling back to the root workspace.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use rols_conf::Config;
use rols_conf::SERVER_NAME;
use rols_hooks::HookContext;
use rols_workspace::uris;
use rols_workspace::Document;
use rols_workspace::DocumentError;
use rols_workspace::Workspace;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use tower_lsp_server::lsp_types;
use tower_lsp_server::lsp_types::TextDocumentContentChangeEvent;
use url::Url;

/// How new workspaces are set up.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Lowest configuration layer, seeded into every workspace.
    pub plugin_defaults: Value,
    /// Where per-tool user config files live; `None` skips the user layer.
    pub user_config_dir: Option<PathBuf>,
    /// Settings tree treated as the first client push.
    pub initial_settings: Value,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            plugin_defaults: Value::Object(Map::new()),
            user_config_dir: rols_conf::sources::user_config_dir(),
            initial_settings: Value::Object(Map::new()),
        }
    }
}

/// One entry of a workspace folder change. Either field may be missing when the
/// client sends partial data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FolderEntry {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceFoldersChange {
    #[serde(default)]
    pub added: Vec<FolderEntry>,
    #[serde(default)]
    pub removed: Vec<FolderEntry>,
}

impl From<lsp_types::WorkspaceFolder> for FolderEntry {
    fn from(folder: lsp_types::WorkspaceFolder) -> Self {
        Self {
            uri: Some(folder.uri.as_str().to_string()),
            name: Some(folder.name),
        }
    }
}

impl From<lsp_types::WorkspaceFoldersChangeEvent> for WorkspaceFoldersChange {
    fn from(event: lsp_types::WorkspaceFoldersChangeEvent) -> Self {
        Self {
            added: event.added.into_iter().map(FolderEntry::from).collect(),
            removed: event.removed.into_iter().map(FolderEntry::from).collect(),
        }
    }
}

impl From<lsp_types::DidChangeWorkspaceFoldersParams> for WorkspaceFoldersChange {
    fn from(params: lsp_types::DidChangeWorkspaceFoldersParams) -> Self {
        params.event.into()
    }
}

#[derive(Debug)]
struct Registry {
    root: Arc<Workspace>,
    /// Every registered workspace keyed by root URI, the root workspace included.
    workspaces: BTreeMap<Url, Arc<Workspace>>,
    server_settings: Value,
    plugin_defaults: Value,
}

impl Registry {
    fn owner(&self, uri: &Url) -> Arc<Workspace> {
        self.workspaces
            .iter()
            .filter(|(root, _)| uris::contains(root, uri))
            .max_by_key(|(root, _)| uris::depth(root))
            .map_or_else(|| Arc::clone(&self.root), |(_, workspace)| Arc::clone(workspace))
    }
}

#[derive(Debug)]
pub struct Session {
    registry: RwLock<Registry>,
    user_config_dir: Option<PathBuf>,
}

impl Session {
    #[must_use]
    pub fn new(root_uri: Url, options: SessionOptions) -> Self {
        let root_uri = uris::normalize(root_uri);
        let server_settings = namespace(&options.initial_settings);
        let root = Arc::new(create_workspace(
            root_uri.clone(),
            options.user_config_dir.clone(),
            &options.plugin_defaults,
            &server_settings,
        ));

        let mut workspaces = BTreeMap::new();
        workspaces.insert(root_uri, Arc::clone(&root));

        Self {
            registry: RwLock::new(Registry {
                root,
                workspaces,
                server_settings,
                plugin_defaults: options.plugin_defaults,
            }),
            user_config_dir: options.user_config_dir,
        }
    }

    #[must_use]
    pub fn root_uri(&self) -> Url {
        self.read().root.root_uri().clone()
    }

    #[must_use]
    pub fn root(&self) -> Arc<Workspace> {
        Arc::clone(&self.read().root)
    }

    /// Root URIs of every registered workspace, in sorted order.
    #[must_use]
    pub fn workspace_uris(&self) -> Vec<Url> {
        self.read().workspaces.keys().cloned().collect()
    }

    /// The workspace that owns `uri`.
    #[must_use]
    pub fn resolve_owner(&self, uri: &Url) -> Arc<Workspace> {
        self.read().owner(uri)
    }

    /// The registered workspace rooted exactly at `root_uri`.
    #[must_use]
    pub fn workspace(&self, root_uri: &Url) -> Option<Arc<Workspace>> {
        self.read().workspaces.get(root_uri).cloned()
    }

    // Document operations hold the registry read guard until the owning workspace has
    // been updated, so a folder change cannot move documents out from under them.

    pub fn did_open(&self, uri: Url, text: impl Into<Arc<str>>, version: i32) {
        let registry = self.read();
        registry.owner(&uri).put_document(uri, text, Some(version));
    }

    pub fn did_change(
        &self,
        uri: &Url,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> Result<(), DocumentError> {
        let registry = self.read();
        registry.owner(uri).update_document(uri, changes, version)
    }

    /// A saved file may be a config file, so cached settings are dropped.
    pub fn did_save(&self, uri: &Url) {
        self.resolve_owner(uri).config().invalidate();
    }

    pub fn did_close(&self, uri: &Url) -> bool {
        let registry = self.read();
        registry.owner(uri).remove_document(uri)
    }

    /// The owning workspace and a snapshot of the document at `uri`.
    #[must_use]
    pub fn document(&self, uri: &Url) -> (Arc<Workspace>, Document) {
        let registry = self.read();
        let workspace = registry.owner(uri);
        let document = workspace.get_document(uri);
        (workspace, document)
    }

    /// A hook context for `uri`, with configuration resolved from its location.
    #[must_use]
    pub fn context(&self, uri: &Url) -> HookContext {
        let (workspace, document) = self.document(uri);
        HookContext::for_document(workspace, document)
    }

    /// A hook context scoped to the root workspace.
    #[must_use]
    pub fn root_context(&self) -> HookContext {
        HookContext::new(self.root())
    }

    /// Replace the plugin defaults layer everywhere, including future workspaces.
    pub fn set_plugin_defaults(&self, defaults: Value) {
        let mut registry = self.write();
        for workspace in registry.workspaces.values() {
            workspace.config().set_plugin_defaults(defaults.clone());
        }
        registry.plugin_defaults = defaults;
    }

    /// Apply a `workspace/didChangeConfiguration` settings tree.
    ///
    /// Only the server's own namespace is read; it replaces the server layer of every
    /// workspace and is remembered for workspaces added later.
    pub fn did_change_configuration(&self, settings: &Value) {
        let server_settings = namespace(settings);
        let mut registry = self.write();
        for workspace in registry.workspaces.values() {
            workspace.config().update(server_settings.clone());
        }
        registry.server_settings = server_settings;
    }

    #[must_use]
    pub fn server_settings(&self) -> Value {
        self.read().server_settings.clone()
    }

    /// Register added folders, unregister removed ones and move documents to their
    /// new owners. The registry stays write-locked throughout, so every document is
    /// reachable before and after.
    pub fn did_change_workspace_folders(&self, change: WorkspaceFoldersChange) {
        let mut registry = self.write();

        for uri in change.added.iter().filter_map(folder_uri) {
            if registry.workspaces.contains_key(&uri) {
                tracing::debug!("Workspace {uri} is already registered");
                continue;
            }
            tracing::info!("Adding workspace {uri}");
            let workspace = create_workspace(
                uri.clone(),
                self.user_config_dir.clone(),
                &registry.plugin_defaults,
                &registry.server_settings,
            );
            registry.workspaces.insert(uri, Arc::new(workspace));
        }

        let mut orphans = Vec::new();
        for uri in change.removed.iter().filter_map(folder_uri) {
            match registry.workspaces.remove(&uri) {
                Some(workspace) => {
                    tracing::info!("Removing workspace {uri}");
                    orphans.push(workspace);
                }
                None => tracing::debug!("Ignoring removal of unknown workspace {uri}"),
            }
        }

        let root_uri = registry.root.root_uri().clone();
        if !registry.workspaces.contains_key(&root_uri) {
            match registry.workspaces.values().next().cloned() {
                Some(next) => {
                    tracing::info!("Root workspace removed, {} is the new root", next.root_uri());
                    registry.root = next;
                }
                None => {
                    tracing::debug!("Last workspace removed, keeping {root_uri} as root");
                    let root = Arc::clone(&registry.root);
                    orphans.retain(|workspace| !Arc::ptr_eq(workspace, &root));
                    registry.workspaces.insert(root_uri, root);
                }
            }
        }

        rebalance(&registry, &orphans);
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Move every document that no longer routes to the workspace holding it.
fn rebalance(registry: &Registry, orphans: &[Arc<Workspace>]) {
    for holder in registry.workspaces.values().chain(orphans) {
        let moved = holder.take_documents_where(|uri| {
            !Arc::ptr_eq(&registry.owner(uri), holder)
        });
        for document in moved {
            registry.owner(document.uri()).adopt(document);
        }
    }
}

fn create_workspace(
    root_uri: Url,
    user_config_dir: Option<PathBuf>,
    plugin_defaults: &Value,
    server_settings: &Value,
) -> Workspace {
    let root_path = uris::to_fs_path(&root_uri).ok();
    let config = Config::with_user_config_dir(root_path, user_config_dir);
    config.set_plugin_defaults(plugin_defaults.clone());
    config.update(server_settings.clone());
    Workspace::with_config(root_uri, config)
}

fn folder_uri(entry: &FolderEntry) -> Option<Url> {
    let Some(text) = entry.uri.as_deref() else {
        tracing::debug!("Ignoring workspace folder without uri: {:?}", entry.name);
        return None;
    };
    uris::parse(text)
        .map_err(|err| tracing::debug!("Ignoring workspace folder: {err}"))
        .ok()
}

fn namespace(settings: &Value) -> Value {
    settings
        .get(SERVER_NAME)
        .filter(|value| value.is_object())
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}
