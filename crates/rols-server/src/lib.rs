mod client;
mod ext;
mod lint;
pub mod logging;
mod server;
pub mod session;

use anyhow::Result;
use tower_lsp_server::LspService;
use tower_lsp_server::Server;

pub use crate::server::RolsLanguageServer;
pub use crate::session::Session;
pub use crate::session::SessionOptions;

/// Serve the language server over stdio until the client disconnects.
///
/// Tracing is installed here, before the service exists; events emitted before the
/// client connects only reach the log file.
pub async fn run(log_directive: &str) -> Result<()> {
    let log_guard = logging::init_tracing(log_directive, |message_type, message| {
        client::log_message(message_type, message);
    });
    tracing::info!("Starting LSP server");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(|client| {
        client::init_client(client);
        RolsLanguageServer::new(Some(log_guard))
    })
    .finish();

    Server::new(stdin, stdout, socket).serve(service).await;
    tracing::info!("LSP server shutdown");

    Ok(())
}
