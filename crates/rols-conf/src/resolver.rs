//! Layered plugin settings for one workspace root
//!
//! Layers, lowest precedence first: plugin defaults, the user's per-tool files, settings
//! pushed by the client, and project files found above the queried document. Merged
//! trees are cached per starting directory and dropped whenever a layer changes.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use rustc_hash::FxHashMap;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;

use crate::merge::merge;
use crate::sources::user_config_dir;
use crate::sources::ToolSource;
use crate::sources::SOURCES;

/// A merged settings tree as seen from one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedConfig(Arc<Value>);

impl ResolvedConfig {
    #[must_use]
    pub fn new(tree: Arc<Value>) -> Self {
        Self(tree)
    }

    #[must_use]
    pub fn tree(&self) -> &Value {
        &self.0
    }

    /// Settings under `plugins.<name>`, empty when the plugin has none.
    #[must_use]
    pub fn plugin_settings(&self, name: &str) -> Map<String, Value> {
        self.0
            .get("plugins")
            .and_then(|plugins| plugins.get(name))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// A plugin runs unless its settings say `enabled: false`.
    #[must_use]
    pub fn plugin_enabled(&self, name: &str) -> bool {
        self.0
            .pointer(&format!("/plugins/{name}/enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

#[derive(Debug, Default)]
struct State {
    defaults: Value,
    user: Value,
    server: Value,
    merged: FxHashMap<PathBuf, Arc<Value>>,
    discovered: FxHashMap<(&'static str, PathBuf), Option<PathBuf>>,
    project: FxHashMap<(&'static str, PathBuf), Option<Value>>,
}

impl State {
    fn clear_caches(&mut self) {
        self.merged.clear();
        self.discovered.clear();
        self.project.clear();
    }
}

#[derive(Debug)]
pub struct Config {
    root: Option<PathBuf>,
    sources: &'static [ToolSource],
    state: Mutex<State>,
}

impl Config {
    /// A resolver for `root` that also reads the user's per-tool files.
    #[must_use]
    pub fn new(root: Option<PathBuf>) -> Self {
        Self::with_user_config_dir(root, user_config_dir())
    }

    /// A resolver reading user files from `user_config_dir` instead of the platform
    /// default, or none at all.
    #[must_use]
    pub fn with_user_config_dir(root: Option<PathBuf>, user_config_dir: Option<PathBuf>) -> Self {
        let mut user = Value::Object(Map::new());
        if let Some(dir) = user_config_dir.as_deref() {
            for source in SOURCES {
                if let Some(settings) = source.load_user(dir) {
                    tracing::debug!(
                        "Loaded user {} settings from {}",
                        source.name(),
                        dir.display()
                    );
                    merge(&mut user, &plugin_tree(source.name(), settings));
                }
            }
        }

        Self {
            root,
            sources: SOURCES,
            state: Mutex::new(State {
                defaults: Value::Object(Map::new()),
                user,
                server: Value::Object(Map::new()),
                ..State::default()
            }),
        }
    }

    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Install the lowest layer, usually gathered from every plugin's `settings` hook.
    pub fn set_plugin_defaults(&self, defaults: Value) {
        let mut state = self.lock();
        state.defaults = defaults;
        state.merged.clear();
    }

    /// Replace the client-pushed layer.
    pub fn update(&self, server: Value) {
        let mut state = self.lock();
        state.server = server;
        state.merged.clear();
    }

    /// Forget everything read from disk, e.g. after a config file was saved.
    pub fn invalidate(&self) {
        self.lock().clear_caches();
    }

    /// The merged tree for a document at `path`, or for the root when `path` is `None`.
    #[must_use]
    pub fn settings(&self, path: Option<&Path>) -> Arc<Value> {
        let start = self.start_dir(path);
        let mut state = self.lock();

        if let Some(tree) = state.merged.get(&start) {
            return Arc::clone(tree);
        }

        let mut tree = state.defaults.clone();
        merge(&mut tree, &state.user);
        merge(&mut tree, &state.server);

        for source in self.sources {
            if let Some(project) = self.project_settings(&mut state, source, &start) {
                merge(&mut tree, &project);
            }
        }

        let tree = Arc::new(tree);
        state.merged.insert(start, Arc::clone(&tree));
        tree
    }

    #[must_use]
    pub fn resolve(&self, path: Option<&Path>) -> ResolvedConfig {
        ResolvedConfig::new(self.settings(path))
    }

    #[must_use]
    pub fn plugin_settings(&self, name: &str, path: Option<&Path>) -> Map<String, Value> {
        self.resolve(path).plugin_settings(name)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_dir(&self, path: Option<&Path>) -> PathBuf {
        match path {
            Some(path) if path.is_dir() => path.to_path_buf(),
            Some(path) => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            None => self.root.clone().unwrap_or_default(),
        }
    }

    fn project_settings(
        &self,
        state: &mut State,
        source: &ToolSource,
        start: &Path,
    ) -> Option<Value> {
        let key = (source.name(), start.to_path_buf());
        let dir = match state.discovered.get(&key) {
            Some(dir) => dir.clone(),
            None => {
                let dir = self.discover(source, start);
                state.discovered.insert(key, dir.clone());
                dir
            }
        }?;

        let key = (source.name(), dir);
        if let Some(settings) = state.project.get(&key) {
            return settings.clone();
        }

        let settings = source.load_project(&key.1).map(|settings| {
            tracing::debug!("Loaded {} settings from {}", source.name(), key.1.display());
            plugin_tree(source.name(), settings)
        });
        state.project.insert(key, settings.clone());
        settings
    }

    /// Nearest directory at or above `start`, not leaving the root, that configures
    /// `source`. Without a root there is nothing to bound the walk, so no project
    /// layer applies.
    fn discover(&self, source: &ToolSource, start: &Path) -> Option<PathBuf> {
        let root = self.root.as_deref()?;
        start
            .ancestors()
            .take_while(|dir| dir.starts_with(root))
            .find(|dir| source.is_configured_in(dir))
            .map(Path::to_path_buf)
    }
}

fn plugin_tree(name: &str, settings: Map<String, Value>) -> Value {
    json!({ "plugins": { name: settings } })
}
