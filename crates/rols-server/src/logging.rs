//! Logging infrastructure bridging tracing events to LSP client messages.
//!
//! Two layers are installed by [`init_tracing`]: a daily rolling file in the system
//! temp directory that receives everything the `EnvFilter` lets through, and the
//! [`LspLayer`], which forwards INFO and above to the client as `window/logMessage`.

use std::sync::Arc;
use std::sync::OnceLock;

use tower_lsp_server::lsp_types::MessageType;
use tracing::field::Visit;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

const LOG_FILE: &str = "rols.log";

static FILE_FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// A tracing Layer that forwards events to the LSP client.
pub struct LspLayer {
    send_message: Arc<dyn Fn(MessageType, String) + Send + Sync>,
}

impl LspLayer {
    pub fn new<F>(send_message: F) -> Self
    where
        F: Fn(MessageType, String) + Send + Sync + 'static,
    {
        Self {
            send_message: Arc::new(send_message),
        }
    }
}

/// Visitor that extracts the message field from tracing events.
#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }
}

fn message_type(level: Level) -> Option<MessageType> {
    match level {
        Level::ERROR => Some(MessageType::ERROR),
        Level::WARN => Some(MessageType::WARNING),
        Level::INFO => Some(MessageType::INFO),
        Level::DEBUG => Some(MessageType::LOG),
        // too verbose for the client
        Level::TRACE => None,
    }
}

impl<S> Layer<S> for LspLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let Some(message_type) = message_type(*event.metadata().level()) else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if let Some(message) = visitor.message {
            (self.send_message)(message_type, message);
        }
    }
}

/// Initialize the dual-layer tracing subscriber.
///
/// `default_directive` applies when `RUST_LOG` is unset. Returns a `WorkerGuard` that
/// must be kept alive for the file logging to work. Installing a second global
/// subscriber is a no-op.
pub fn init_tracing<F>(default_directive: &str, send_message: F) -> WorkerGuard
where
    F: Fn(MessageType, String) + Send + Sync + 'static,
{
    let file_appender = tracing_appender::rolling::daily(std::env::temp_dir(), LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let (env_filter, filter_handle) = reload::Layer::new(env_filter);
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    let lsp_layer = LspLayer::new(send_message).with_filter(LevelFilter::INFO);

    if Registry::default()
        .with(file_layer)
        .with(lsp_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("A global tracing subscriber is already installed");
    } else if FILE_FILTER.set(filter_handle).is_err() {
        tracing::debug!("Log file filter handle was already set");
    }

    guard
}

/// Replace the log file filter with `directive`, as read from the server settings.
///
/// `RUST_LOG` takes precedence, so nothing changes while it is set. Returns whether
/// the filter was replaced.
pub fn set_file_directive(directive: &str) -> bool {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return false;
    }
    let Some(handle) = FILE_FILTER.get() else {
        return false;
    };
    let Some(filter) = parse_directive(directive) else {
        return false;
    };
    match handle.reload(filter) {
        Ok(()) => {
            tracing::info!("Log level set to {directive}");
            true
        }
        Err(err) => {
            tracing::warn!("Failed to change log level: {err}");
            false
        }
    }
}

fn parse_directive(directive: &str) -> Option<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|err| tracing::warn!("Ignoring invalid log level {directive:?}: {err}"))
        .ok()
}
