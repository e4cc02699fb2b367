//! A single project root and everything it owns
//!
//! [`Workspace`] holds the documents routed to its root and the configuration resolver
//! scoped to that root. All methods take `&self`: the document map is a [`DashMap`] and
//! the resolver guards its own state, so a workspace can be shared behind an `Arc`.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use rols_conf::Config;
use rols_conf::ResolvedConfig;
use serde_json::Map;
use serde_json::Value;
use tower_lsp_server::lsp_types::TextDocumentContentChangeEvent;
use url::Url;

use crate::document::Document;
use crate::document::DocumentError;
use crate::system::FileSystem;
use crate::system::OsFileSystem;
use crate::uris;

#[derive(Debug)]
pub struct Workspace {
    root_uri: Url,
    root_path: Option<PathBuf>,
    documents: DashMap<Url, Document>,
    config: Config,
    fs: Arc<dyn FileSystem>,
}

impl Workspace {
    /// Create a workspace whose resolver also reads the user's per-tool config files.
    #[must_use]
    pub fn new(root_uri: Url) -> Self {
        let root_path = uris::to_fs_path(&root_uri).ok();
        let config = Config::new(root_path.clone());
        Self::with_config(root_uri, config)
    }

    /// Create a workspace around an already configured resolver.
    #[must_use]
    pub fn with_config(root_uri: Url, config: Config) -> Self {
        let root_path = uris::to_fs_path(&root_uri).ok();
        Self {
            root_uri,
            root_path,
            documents: DashMap::new(),
            config,
            fs: Arc::new(OsFileSystem),
        }
    }

    #[must_use]
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    #[must_use]
    pub fn root_uri(&self) -> &Url {
        &self.root_uri
    }

    #[must_use]
    pub fn root_path(&self) -> Option<&Path> {
        self.root_path.as_deref()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the root is a directory on this machine rather than a remote or
    /// virtual location.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.root_path
            .as_deref()
            .is_some_and(|path| self.fs.is_directory(path))
    }

    /// Create or replace a document with client-owned text.
    pub fn put_document(&self, uri: Url, text: impl Into<Arc<str>>, version: Option<i32>) {
        let text = text.into();
        if let Some(mut document) = self.documents.get_mut(&uri) {
            document.set_text(text, version);
            return;
        }

        tracing::debug!("Tracking {} in {}", uri, self.root_uri);
        let document = Document::tracked(
            uri.clone(),
            text,
            version,
            self.root_path.clone(),
            Arc::clone(&self.fs),
        );
        self.documents.insert(uri, document);
    }

    /// The document at `uri`, created as an untracked read-through document when this
    /// workspace has not seen it before.
    #[must_use]
    pub fn get_document(&self, uri: &Url) -> Document {
        self.documents
            .entry(uri.clone())
            .or_insert_with(|| self.untracked(uri))
            .value()
            .clone()
    }

    pub fn update_document(
        &self,
        uri: &Url,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> Result<(), DocumentError> {
        let mut document = self
            .documents
            .entry(uri.clone())
            .or_insert_with(|| self.untracked(uri));
        document.apply_change(changes, version)
    }

    /// Drop the tracked text of a document. The entry stays, so later reads go to disk.
    ///
    /// Returns `false` when the document was never seen by this workspace.
    pub fn remove_document(&self, uri: &Url) -> bool {
        match self.documents.get_mut(uri) {
            Some(mut document) => {
                document.clear();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn has_document(&self, uri: &Url) -> bool {
        self.documents.contains_key(uri)
    }

    #[must_use]
    pub fn document_uris(&self) -> Vec<Url> {
        self.documents.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Remove and return every document whose URI matches `predicate`.
    pub fn take_documents_where(&self, predicate: impl Fn(&Url) -> bool) -> Vec<Document> {
        let uris: Vec<Url> = self
            .documents
            .iter()
            .filter(|entry| predicate(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        uris.iter()
            .filter_map(|uri| self.documents.remove(uri))
            .map(|(_, document)| document)
            .collect()
    }

    /// Take ownership of a document that previously lived in another workspace.
    pub fn adopt(&self, document: Document) {
        tracing::debug!("Moving {} into {}", document.uri(), self.root_uri);
        let document = document.reparent(self.root_path.clone());
        self.documents.insert(document.uri().clone(), document);
    }

    /// Configuration as seen from `uri`, or from the root when no document applies.
    #[must_use]
    pub fn resolve_config(&self, uri: Option<&Url>) -> ResolvedConfig {
        let path = uri.and_then(|uri| uris::to_fs_path(uri).ok());
        self.config.resolve(path.as_deref())
    }

    #[must_use]
    pub fn settings(&self, uri: Option<&Url>) -> Arc<Value> {
        let path = uri.and_then(|uri| uris::to_fs_path(uri).ok());
        self.config.settings(path.as_deref())
    }

    #[must_use]
    pub fn plugin_settings(&self, name: &str, uri: Option<&Url>) -> Map<String, Value> {
        self.resolve_config(uri).plugin_settings(name)
    }

    fn untracked(&self, uri: &Url) -> Document {
        Document::untracked(uri.clone(), self.root_path.clone(), Arc::clone(&self.fs))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn workspace_at(root: &Path) -> Workspace {
        let root_uri = uris::from_fs_path(root).unwrap();
        let config = Config::with_user_config_dir(Some(root.to_path_buf()), None);
        Workspace::with_config(root_uri, config)
    }

    mod documents {
        use super::*;

        #[test]
        fn test_put_get_round_trip() {
            let dir = tempdir().unwrap();
            let workspace = workspace_at(dir.path());
            let uri = uris::from_fs_path(&dir.path().join("a.py")).unwrap();

            workspace.put_document(uri.clone(), "X", Some(1));

            let document = workspace.get_document(&uri);
            assert_eq!(&*document.source().unwrap(), "X");
            assert_eq!(document.version(), Some(1));
        }

        #[test]
        fn test_get_unopened_document_reads_disk() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("b.py");
            fs::write(&path, "Y").unwrap();
            let workspace = workspace_at(dir.path());
            let uri = uris::from_fs_path(&path).unwrap();

            let document = workspace.get_document(&uri);
            assert!(!document.is_tracked());
            assert_eq!(&*document.source().unwrap(), "Y");
            assert!(workspace.has_document(&uri));
        }

        #[test]
        fn test_remove_document_falls_back_to_disk() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("c.py");
            fs::write(&path, "on disk").unwrap();
            let workspace = workspace_at(dir.path());
            let uri = uris::from_fs_path(&path).unwrap();

            workspace.put_document(uri.clone(), "in memory", Some(1));
            assert!(workspace.remove_document(&uri));

            assert!(workspace.has_document(&uri));
            assert_eq!(&*workspace.get_document(&uri).source().unwrap(), "on disk");
        }

        #[test]
        fn test_remove_unknown_document() {
            let dir = tempdir().unwrap();
            let workspace = workspace_at(dir.path());
            let uri = uris::from_fs_path(&dir.path().join("ghost.py")).unwrap();
            assert!(!workspace.remove_document(&uri));
        }

        #[test]
        fn test_put_keeps_existing_entry() {
            let dir = tempdir().unwrap();
            let workspace = workspace_at(dir.path());
            let uri = uris::from_fs_path(&dir.path().join("a.py")).unwrap();

            workspace.put_document(uri.clone(), "one", Some(1));
            workspace.put_document(uri.clone(), "two", Some(2));

            assert_eq!(workspace.document_uris(), vec![uri.clone()]);
            assert_eq!(&*workspace.get_document(&uri).source().unwrap(), "two");
        }

        #[test]
        fn test_update_document_rejects_stale_version() {
            let dir = tempdir().unwrap();
            let workspace = workspace_at(dir.path());
            let uri = uris::from_fs_path(&dir.path().join("a.py")).unwrap();
            workspace.put_document(uri.clone(), "v5", Some(5));

            let change = TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: "v4".to_string(),
            };
            let result = workspace.update_document(&uri, &[change], 4);

            assert!(matches!(result, Err(DocumentError::StaleVersion { .. })));
            assert_eq!(&*workspace.get_document(&uri).source().unwrap(), "v5");
        }

        #[test]
        fn test_take_and_adopt_moves_documents() {
            let dir = tempdir().unwrap();
            let inner = dir.path().join("inner");
            fs::create_dir(&inner).unwrap();
            let outer = workspace_at(dir.path());
            let nested = workspace_at(&inner);

            let moved = uris::from_fs_path(&inner.join("m.py")).unwrap();
            let stays = uris::from_fs_path(&dir.path().join("s.py")).unwrap();
            outer.put_document(moved.clone(), "moved", Some(1));
            outer.put_document(stays.clone(), "stays", Some(1));

            let root = nested.root_uri().clone();
            for document in outer.take_documents_where(|uri| uris::contains(&root, uri)) {
                nested.adopt(document);
            }

            assert!(!outer.has_document(&moved));
            assert!(outer.has_document(&stays));
            let document = nested.get_document(&moved);
            assert_eq!(&*document.source().unwrap(), "moved");
            assert_eq!(document.version(), Some(1));
            assert_eq!(document.project_root(), Some(inner.as_path()));
        }
    }

    mod locality {
        use super::*;

        #[test]
        fn test_existing_directory_is_local() {
            let dir = tempdir().unwrap();
            assert!(workspace_at(dir.path()).is_local());
        }

        #[test]
        fn test_missing_or_virtual_root_is_not_local() {
            let dir = tempdir().unwrap();
            assert!(!workspace_at(&dir.path().join("missing")).is_local());

            let remote = Workspace::with_config(
                Url::parse("vscode-vfs://github/org/repo").unwrap(),
                Config::with_user_config_dir(None, None),
            );
            assert!(!remote.is_local());
        }
    }

    mod configuration {
        use super::*;

        #[test]
        fn test_project_file_beats_server_setting() {
            let dir = tempdir().unwrap();
            fs::write(
                dir.path().join("pycodestyle.cfg"),
                "[pycodestyle]\nmax-line-length = 1000\n",
            )
            .unwrap();
            let workspace = workspace_at(dir.path());
            workspace.config().update(json!({
                "plugins": {"pycodestyle": {"maxLineLength": 10}}
            }));

            let uri = uris::from_fs_path(&dir.path().join("mod.py")).unwrap();
            let settings = workspace.plugin_settings("pycodestyle", Some(&uri));
            assert_eq!(settings.get("maxLineLength"), Some(&json!(1000)));
        }

        #[test]
        fn test_server_settings_apply_without_document() {
            let dir = tempdir().unwrap();
            let workspace = workspace_at(dir.path());
            workspace.config().update(json!({
                "plugins": {"jedi": {"environment": "/usr/bin/python3"}}
            }));

            let settings = workspace.plugin_settings("jedi", None);
            assert_eq!(
                Value::Object(settings),
                json!({"environment": "/usr/bin/python3"})
            );
        }
    }
}
