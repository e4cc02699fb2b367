use std::sync::Arc;
use std::sync::OnceLock;

use rols_conf::Settings;
use rols_hooks::Dispatcher;
use rols_hooks::Hook;
use rols_hooks::HookContext;
use rols_workspace::uris;
use rols_workspace::DocumentError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tower_lsp_server::jsonrpc::Result as LspResult;
use tower_lsp_server::lsp_types;
use tower_lsp_server::lsp_types::CodeActionParams;
use tower_lsp_server::lsp_types::CodeActionProviderCapability;
use tower_lsp_server::lsp_types::CodeActionResponse;
use tower_lsp_server::lsp_types::CodeLens;
use tower_lsp_server::lsp_types::CodeLensOptions;
use tower_lsp_server::lsp_types::CodeLensParams;
use tower_lsp_server::lsp_types::CompletionList;
use tower_lsp_server::lsp_types::CompletionOptions;
use tower_lsp_server::lsp_types::CompletionParams;
use tower_lsp_server::lsp_types::CompletionResponse;
use tower_lsp_server::lsp_types::DidChangeConfigurationParams;
use tower_lsp_server::lsp_types::DidChangeTextDocumentParams;
use tower_lsp_server::lsp_types::DidChangeWorkspaceFoldersParams;
use tower_lsp_server::lsp_types::DidCloseTextDocumentParams;
use tower_lsp_server::lsp_types::DidOpenTextDocumentParams;
use tower_lsp_server::lsp_types::DidSaveTextDocumentParams;
use tower_lsp_server::lsp_types::DocumentFormattingParams;
use tower_lsp_server::lsp_types::DocumentHighlight;
use tower_lsp_server::lsp_types::DocumentHighlightParams;
use tower_lsp_server::lsp_types::DocumentRangeFormattingParams;
use tower_lsp_server::lsp_types::DocumentSymbolParams;
use tower_lsp_server::lsp_types::DocumentSymbolResponse;
use tower_lsp_server::lsp_types::ExecuteCommandOptions;
use tower_lsp_server::lsp_types::ExecuteCommandParams;
use tower_lsp_server::lsp_types::FoldingRange;
use tower_lsp_server::lsp_types::FoldingRangeParams;
use tower_lsp_server::lsp_types::FoldingRangeProviderCapability;
use tower_lsp_server::lsp_types::GotoDefinitionParams;
use tower_lsp_server::lsp_types::GotoDefinitionResponse;
use tower_lsp_server::lsp_types::HoverParams;
use tower_lsp_server::lsp_types::HoverProviderCapability;
use tower_lsp_server::lsp_types::InitializeParams;
use tower_lsp_server::lsp_types::InitializeResult;
use tower_lsp_server::lsp_types::InitializedParams;
use tower_lsp_server::lsp_types::Location;
use tower_lsp_server::lsp_types::MessageType;
use tower_lsp_server::lsp_types::OneOf;
use tower_lsp_server::lsp_types::PositionEncodingKind;
use tower_lsp_server::lsp_types::ReferenceParams;
use tower_lsp_server::lsp_types::RenameParams;
use tower_lsp_server::lsp_types::SaveOptions;
use tower_lsp_server::lsp_types::ServerCapabilities;
use tower_lsp_server::lsp_types::ServerInfo;
use tower_lsp_server::lsp_types::SignatureHelp;
use tower_lsp_server::lsp_types::SignatureHelpOptions;
use tower_lsp_server::lsp_types::SignatureHelpParams;
use tower_lsp_server::lsp_types::SymbolInformation;
use tower_lsp_server::lsp_types::TextDocumentSyncCapability;
use tower_lsp_server::lsp_types::TextDocumentSyncKind;
use tower_lsp_server::lsp_types::TextDocumentSyncOptions;
use tower_lsp_server::lsp_types::TextEdit;
use tower_lsp_server::lsp_types::WorkspaceEdit;
use tower_lsp_server::lsp_types::WorkspaceFoldersServerCapabilities;
use tower_lsp_server::lsp_types::WorkspaceServerCapabilities;
use tower_lsp_server::LanguageServer;
use tracing_appender::non_blocking::WorkerGuard;
use url::Url;

use crate::client;
use crate::lint::LintScheduler;
use crate::ext::ClientCapabilitiesExt;
use crate::ext::UriExt;
use crate::session::FolderEntry;
use crate::session::Session;
use crate::session::SessionOptions;
use crate::session::WorkspaceFoldersChange;

const SERVER_NAME: &str = "rols";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything that only exists once the client has said where the workspace is.
struct ServerState {
    session: Arc<Session>,
    dispatcher: Dispatcher,
}

pub struct RolsLanguageServer {
    state: OnceLock<ServerState>,
    lints: LintScheduler,
    options: SessionOptions,
    _log_guard: Option<WorkerGuard>,
}

impl RolsLanguageServer {
    #[must_use]
    pub fn new(log_guard: Option<WorkerGuard>) -> Self {
        Self::with_options(SessionOptions::default(), log_guard)
    }

    /// A server whose session is created from `options`; initialization options
    /// sent by the client replace `initial_settings`.
    #[must_use]
    pub fn with_options(options: SessionOptions, log_guard: Option<WorkerGuard>) -> Self {
        Self {
            state: OnceLock::new(),
            lints: LintScheduler::default(),
            options,
            _log_guard: log_guard,
        }
    }

    /// The session, once `initialize` has run.
    #[must_use]
    pub fn session(&self) -> Option<Arc<Session>> {
        self.state.get().map(|state| Arc::clone(&state.session))
    }

    fn capabilities(
        dispatcher: &Dispatcher,
        commands: Vec<String>,
        experimental: Option<Value>,
        position_encoding: Option<PositionEncodingKind>,
    ) -> ServerCapabilities {
        let registry = dispatcher.registry();
        let implements = |hook| registry.implements(hook);

        ServerCapabilities {
            position_encoding,
            text_document_sync: Some(TextDocumentSyncCapability::Options(
                TextDocumentSyncOptions {
                    open_close: Some(true),
                    change: Some(TextDocumentSyncKind::INCREMENTAL),
                    will_save: Some(false),
                    will_save_wait_until: Some(false),
                    save: Some(SaveOptions::default().into()),
                },
            )),
            hover_provider: implements(Hook::Hover)
                .then_some(HoverProviderCapability::Simple(true)),
            completion_provider: implements(Hook::Completions).then(|| CompletionOptions {
                resolve_provider: Some(false),
                trigger_characters: Some(vec![".".to_string()]),
                ..Default::default()
            }),
            signature_help_provider: implements(Hook::SignatureHelp).then(|| {
                SignatureHelpOptions {
                    trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                    ..Default::default()
                }
            }),
            definition_provider: implements(Hook::Definitions).then_some(OneOf::Left(true)),
            references_provider: implements(Hook::References).then_some(OneOf::Left(true)),
            document_highlight_provider: implements(Hook::DocumentHighlight)
                .then_some(OneOf::Left(true)),
            document_symbol_provider: implements(Hook::DocumentSymbols)
                .then_some(OneOf::Left(true)),
            code_action_provider: implements(Hook::CodeActions)
                .then_some(CodeActionProviderCapability::Simple(true)),
            code_lens_provider: implements(Hook::CodeLens).then_some(CodeLensOptions {
                resolve_provider: Some(false),
            }),
            document_formatting_provider: implements(Hook::FormatDocument)
                .then_some(OneOf::Left(true)),
            document_range_formatting_provider: implements(Hook::FormatRange)
                .then_some(OneOf::Left(true)),
            rename_provider: implements(Hook::Rename).then_some(OneOf::Left(true)),
            folding_range_provider: implements(Hook::FoldingRange)
                .then_some(FoldingRangeProviderCapability::Simple(true)),
            execute_command_provider: (!commands.is_empty()).then(|| ExecuteCommandOptions {
                commands,
                ..Default::default()
            }),
            workspace: Some(WorkspaceServerCapabilities {
                workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                    supported: Some(true),
                    change_notifications: Some(OneOf::Left(true)),
                }),
                file_operations: None,
            }),
            experimental,
            ..Default::default()
        }
    }

    fn schedule_lint(&self, uri: Url) {
        if let Some(state) = self.state.get() {
            let session = Arc::clone(&state.session);
            self.lints.schedule(session, state.dispatcher.clone(), uri);
        }
    }

    /// Notify every implementation of an aggregate hook that returns nothing useful.
    async fn notify(&self, hook: Hook, context: HookContext) {
        if let Some(state) = self.state.get() {
            state.dispatcher.dispatch(hook, &context).await;
        }
    }

    fn document_context(
        &self,
        uri: &lsp_types::Uri,
        params: &impl Serialize,
    ) -> Option<(&ServerState, HookContext)> {
        let state = self.state.get()?;
        let uri = uri.to_url()?;
        let params = serde_json::to_value(params).unwrap_or_default();
        let context = state.session.context(&uri).with_params(params);
        Some((state, context))
    }

    async fn first<T: DeserializeOwned>(
        &self,
        hook: Hook,
        uri: &lsp_types::Uri,
        params: &impl Serialize,
    ) -> Option<T> {
        let (state, context) = self.document_context(uri, params)?;
        state.dispatcher.dispatch_first(hook, &context).await
    }

    async fn all<T: DeserializeOwned>(
        &self,
        hook: Hook,
        uri: &lsp_types::Uri,
        params: &impl Serialize,
    ) -> Vec<T> {
        match self.document_context(uri, params) {
            Some((state, context)) => state.dispatcher.dispatch_all(hook, &context).await,
            None => Vec::new(),
        }
    }
}

/// Pick the root folder: the first workspace folder, then the deprecated root URI,
/// then the current directory. Remaining folders are returned for registration.
fn root_and_folders(params: &InitializeParams) -> (Option<Url>, Vec<FolderEntry>) {
    let mut folders: Vec<FolderEntry> = params
        .workspace_folders
        .clone()
        .unwrap_or_default()
        .into_iter()
        .map(FolderEntry::from)
        .collect();

    let first = (!folders.is_empty())
        .then(|| folders.remove(0))
        .and_then(|folder| folder.uri)
        .and_then(|uri| uris::parse(&uri).ok());

    #[allow(deprecated)]
    let root = first
        .or_else(|| params.root_uri.as_ref().and_then(UriExt::to_url))
        .or_else(|| {
            std::env::current_dir()
                .ok()
                .and_then(|dir| uris::from_fs_path(&dir).ok())
        });

    (root, folders)
}

fn load_settings(root: &Url) -> Settings {
    let Ok(path) = uris::to_fs_path(root) else {
        return Settings::default();
    };
    Settings::new(&path).unwrap_or_else(|err| {
        tracing::error!(?err, "Failed to load settings from {}", path.display());
        client::show_message(
            MessageType::WARNING,
            format!("rols: ignoring invalid settings in {}", path.display()),
        );
        Settings::default()
    })
}

impl LanguageServer for RolsLanguageServer {
    #[tracing::instrument(skip_all)]
    async fn initialize(&self, params: InitializeParams) -> LspResult<InitializeResult> {
        tracing::info!("Initializing server...");

        let (root, folders) = root_and_folders(&params);
        let Some(root) = root else {
            tracing::error!("No usable workspace root");
            return Err(tower_lsp_server::jsonrpc::Error::internal_error());
        };

        let settings = load_settings(&root);
        if let Some(directive) = settings.log_directive() {
            crate::logging::set_file_directive(directive);
        }
        let dispatcher = Dispatcher::new(rols_ide::builtin_registry(), settings.plugin_timeout());

        let mut options = self.options.clone();
        if let Some(initialization_options) = params.initialization_options.clone() {
            options.initial_settings = initialization_options;
        }
        let session = Arc::new(Session::new(root, options));
        session.did_change_workspace_folders(WorkspaceFoldersChange {
            added: folders,
            removed: Vec::new(),
        });

        let defaults = dispatcher.dispatch(Hook::Settings, &session.root_context()).await;
        let mut plugin_defaults = Value::Object(Map::new());
        for tree in defaults.as_array().into_iter().flatten() {
            rols_conf::merge(&mut plugin_defaults, tree);
        }
        session.set_plugin_defaults(plugin_defaults);

        let root_context = session
            .root_context()
            .with_params(serde_json::to_value(&params).unwrap_or_default());
        dispatcher.dispatch(Hook::Initialize, &root_context).await;

        let commands: Vec<String> = dispatcher.dispatch_all(Hook::Commands, &root_context).await;
        let mut experimental = Value::Object(Map::new());
        for tree in dispatcher
            .dispatch(Hook::ExperimentalCapabilities, &root_context)
            .await
            .as_array()
            .into_iter()
            .flatten()
        {
            rols_conf::merge(&mut experimental, tree);
        }
        let experimental = experimental
            .as_object()
            .is_some_and(|map| !map.is_empty())
            .then_some(experimental);

        let position_encoding = if params.capabilities.supports_utf32() {
            Some(PositionEncodingKind::UTF32)
        } else {
            tracing::warn!(
                "Client does not offer utf-32 positions; columns are counted in characters"
            );
            None
        };

        let capabilities =
            Self::capabilities(&dispatcher, commands, experimental, position_encoding);
        tracing::info!(
            "Serving {} with plugins: {}",
            session.root_uri(),
            dispatcher.registry().plugins().join(", ")
        );

        if self.state.set(ServerState { session, dispatcher }).is_err() {
            tracing::warn!("Received a second initialize request");
        }

        Ok(InitializeResult {
            capabilities,
            server_info: Some(ServerInfo {
                name: SERVER_NAME.to_string(),
                version: Some(SERVER_VERSION.to_string()),
            }),
            ..Default::default()
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        tracing::info!("Server received initialized notification.");
        if let Some(session) = self.session() {
            self.notify(Hook::Initialized, session.root_context()).await;
        }
    }

    async fn shutdown(&self) -> LspResult<()> {
        self.lints.cancel_all();
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(uri = ?params.text_document.uri))]
    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let Some(session) = self.session() else {
            return;
        };
        let Some(uri) = params.text_document.uri.to_url() else {
            tracing::warn!("Ignoring document with malformed URI");
            return;
        };
        tracing::debug!("Opened document: {uri}");

        session.did_open(uri.clone(), params.text_document.text, params.text_document.version);
        self.notify(Hook::DocumentDidOpen, session.context(&uri)).await;
        self.schedule_lint(uri);
    }

    #[tracing::instrument(skip_all, fields(uri = ?params.text_document.uri))]
    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(session) = self.session() else {
            return;
        };
        let Some(uri) = params.text_document.uri.to_url() else {
            return;
        };

        match session.did_change(&uri, &params.content_changes, params.text_document.version) {
            Ok(()) => self.schedule_lint(uri),
            Err(err @ DocumentError::StaleVersion { .. }) => tracing::warn!("{err}"),
            Err(err) => tracing::error!(?err, "Failed to apply changes to {uri}"),
        }
    }

    #[tracing::instrument(skip_all, fields(uri = ?params.text_document.uri))]
    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let Some(session) = self.session() else {
            return;
        };
        let Some(uri) = params.text_document.uri.to_url() else {
            return;
        };

        session.did_save(&uri);
        self.notify(Hook::DocumentDidSave, session.context(&uri)).await;
        self.schedule_lint(uri);
    }

    #[tracing::instrument(skip_all, fields(uri = ?params.text_document.uri))]
    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let Some(session) = self.session() else {
            return;
        };
        let Some(uri) = params.text_document.uri.to_url() else {
            return;
        };
        tracing::debug!("Closed document: {uri}");

        self.lints.cancel(&uri);
        session.did_close(&uri);
        client::diagnostics::publish_diagnostics(params.text_document.uri, Vec::new(), None);
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let Some(session) = self.session() else {
            return;
        };
        tracing::info!("Configuration change detected. Reloading settings...");
        session.did_change_configuration(&params.settings);

        for workspace_uri in session.workspace_uris() {
            let Some(workspace) = session.workspace(&workspace_uri) else {
                continue;
            };
            for uri in workspace.document_uris() {
                if workspace.get_document(&uri).is_tracked() {
                    self.schedule_lint(uri);
                }
            }
        }
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        if let Some(session) = self.session() {
            session.did_change_workspace_folders(params.into());
        }
    }

    async fn hover(&self, params: HoverParams) -> LspResult<Option<lsp_types::Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        Ok(self.first(Hook::Hover, uri, &params).await)
    }

    async fn completion(&self, params: CompletionParams) -> LspResult<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let items = self.all(Hook::Completions, uri, &params).await;
        Ok(Some(CompletionResponse::List(CompletionList {
            is_incomplete: false,
            items,
        })))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> LspResult<Option<GotoDefinitionResponse>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let locations: Vec<Location> = self.all(Hook::Definitions, uri, &params).await;
        Ok((!locations.is_empty()).then_some(GotoDefinitionResponse::Array(locations)))
    }

    async fn references(&self, params: ReferenceParams) -> LspResult<Option<Vec<Location>>> {
        let uri = &params.text_document_position.text_document.uri;
        Ok(Some(self.all(Hook::References, uri, &params).await))
    }

    async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> LspResult<Option<Vec<DocumentHighlight>>> {
        let uri = &params.text_document_position_params.text_document.uri;
        Ok(Some(self.all(Hook::DocumentHighlight, uri, &params).await))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> LspResult<Option<DocumentSymbolResponse>> {
        let uri = &params.text_document.uri;
        let symbols: Vec<SymbolInformation> = self.all(Hook::DocumentSymbols, uri, &params).await;
        Ok(Some(DocumentSymbolResponse::Flat(symbols)))
    }

    async fn folding_range(
        &self,
        params: FoldingRangeParams,
    ) -> LspResult<Option<Vec<FoldingRange>>> {
        Ok(self.first(Hook::FoldingRange, &params.text_document.uri, &params).await)
    }

    async fn formatting(
        &self,
        params: DocumentFormattingParams,
    ) -> LspResult<Option<Vec<TextEdit>>> {
        Ok(self.first(Hook::FormatDocument, &params.text_document.uri, &params).await)
    }

    async fn range_formatting(
        &self,
        params: DocumentRangeFormattingParams,
    ) -> LspResult<Option<Vec<TextEdit>>> {
        Ok(self.first(Hook::FormatRange, &params.text_document.uri, &params).await)
    }

    async fn code_action(&self, params: CodeActionParams) -> LspResult<Option<CodeActionResponse>> {
        Ok(Some(self.all(Hook::CodeActions, &params.text_document.uri, &params).await))
    }

    async fn code_lens(&self, params: CodeLensParams) -> LspResult<Option<Vec<CodeLens>>> {
        Ok(Some(self.all(Hook::CodeLens, &params.text_document.uri, &params).await))
    }

    async fn rename(&self, params: RenameParams) -> LspResult<Option<WorkspaceEdit>> {
        let uri = &params.text_document_position.text_document.uri;
        Ok(self.first(Hook::Rename, uri, &params).await)
    }

    async fn signature_help(
        &self,
        params: SignatureHelpParams,
    ) -> LspResult<Option<SignatureHelp>> {
        let uri = &params.text_document_position_params.text_document.uri;
        Ok(self.first(Hook::SignatureHelp, uri, &params).await)
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> LspResult<Option<Value>> {
        let Some(state) = self.state.get() else {
            return Ok(None);
        };
        let context = state
            .session
            .root_context()
            .with_params(serde_json::to_value(&params).unwrap_or_default());
        Ok(state.dispatcher.dispatch_first(Hook::ExecuteCommand, &context).await)
    }
}
