use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use rols_hooks::Dispatcher;
use rols_hooks::Hook;
use tokio::task::JoinHandle;
use tower_lsp_server::lsp_types::Diagnostic;
use url::Url;

use crate::client;
use crate::ext::UrlExt;
use crate::session::Session;

/// Receives the diagnostics of a finished lint run.
pub type Publish = Arc<dyn Fn(Url, Vec<Diagnostic>, Option<i32>) + Send + Sync>;

/// Background lint runs, at most one per document.
pub struct LintScheduler {
    tasks: Arc<DashMap<Url, JoinHandle<()>>>,
    publish: Publish,
}

impl LintScheduler {
    #[must_use]
    pub fn new(publish: Publish) -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            publish,
        }
    }

    /// Run the lint hook for `uri` and publish the result, unless the document
    /// changed in the meantime. A newer run for the same URI aborts the pending one.
    pub fn schedule(&self, session: Arc<Session>, dispatcher: Dispatcher, uri: Url) {
        let publish = Arc::clone(&self.publish);
        let key = uri.clone();

        let handle = tokio::spawn(async move {
            let context = session.context(&uri);
            let version = context.document().and_then(|document| document.version());
            let diagnostics: Vec<Diagnostic> =
                dispatcher.dispatch_all(Hook::Lint, &context).await;

            let (_, current) = session.document(&uri);
            if current.version() != version {
                tracing::debug!("Discarding diagnostics for outdated version of {uri}");
                return;
            }
            publish(uri, diagnostics, version);
        });

        if let Some(previous) = self.tasks.insert(key, handle) {
            previous.abort();
        }
    }

    pub fn cancel(&self, uri: &Url) {
        if let Some((_, handle)) = self.tasks.remove(uri) {
            handle.abort();
        }
    }

    pub fn cancel_all(&self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
        self.tasks.clear();
    }
}

impl Default for LintScheduler {
    /// Publishes through the connected client.
    fn default() -> Self {
        Self::new(Arc::new(publish_to_client))
    }
}

fn publish_to_client(uri: Url, diagnostics: Vec<Diagnostic>, version: Option<i32>) {
    if let Some(lsp_uri) = uri.to_lsp_uri() {
        client::diagnostics::publish_diagnostics(lsp_uri, diagnostics, version);
    }
}

impl fmt::Debug for LintScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LintScheduler")
            .field("pending", &self.tasks.len())
            .finish_non_exhaustive()
    }
}
