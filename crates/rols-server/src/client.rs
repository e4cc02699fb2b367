use std::fmt::Display;
use std::sync::Arc;
use std::sync::OnceLock;

pub use messages::*;
use tower_lsp_server::Client;

static CLIENT: OnceLock<Arc<Client>> = OnceLock::new();

pub fn init_client(client: Client) {
    if CLIENT.set(Arc::new(client)).is_err() {
        tracing::warn!("LSP client was already initialized");
    }
}

fn get_client() -> Option<Arc<Client>> {
    CLIENT.get().cloned()
}

/// Generates a fire-and-forget notification function that spawns an async task.
///
/// This...
/// ```rust,ignore
/// notify!(log_message, message_type: MessageType, message: impl Display + Send + 'static);
/// ```
///
/// ...expands to:
/// ```rust,ignore
/// pub fn log_message(message_type: MessageType, message: impl Display + Send + 'static) {
///     if let Some(client) = get_client() {
///         tokio::spawn(async move {
///             client.log_message(message_type, message).await;
///         });
///     }
/// }
/// ```
///
/// Without a client, as in tests, the call does nothing.
macro_rules! notify {
    ($name:ident, $($param:ident: $type:ty),*) => {
        pub fn $name($($param: $type),*) {
            if let Some(client) = get_client() {
                tokio::spawn(async move {
                    client.$name($($param),*).await;
                });
            }
        }
    };
}

pub mod messages {
    use tower_lsp_server::lsp_types;

    use super::get_client;
    use super::Display;

    notify!(log_message, message_type: lsp_types::MessageType, message: impl Display + Send + 'static);
    notify!(show_message, message_type: lsp_types::MessageType, message: impl Display + Send + 'static);
}

pub mod diagnostics {
    use tower_lsp_server::lsp_types;

    use super::get_client;

    notify!(publish_diagnostics, uri: lsp_types::Uri, diagnostics: Vec<lsp_types::Diagnostic>, version: Option<i32>);
}
