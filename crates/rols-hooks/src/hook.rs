use std::fmt;

/// How the results of several implementations of one hook are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Implementations run one at a time in priority order; the first non-empty
    /// result is the answer and the rest never start.
    FirstResult,
    /// Every implementation runs and every non-null result is kept.
    Aggregate,
}

/// A protocol capability plugins can implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hook {
    CodeActions,
    CodeLens,
    Commands,
    Completions,
    Definitions,
    DocumentDidOpen,
    DocumentDidSave,
    DocumentHighlight,
    DocumentSymbols,
    ExecuteCommand,
    ExperimentalCapabilities,
    FoldingRange,
    FormatDocument,
    FormatRange,
    Hover,
    Initialize,
    Initialized,
    Lint,
    References,
    Rename,
    Settings,
    SignatureHelp,
}

impl Hook {
    pub const ALL: [Hook; 22] = [
        Hook::CodeActions,
        Hook::CodeLens,
        Hook::Commands,
        Hook::Completions,
        Hook::Definitions,
        Hook::DocumentDidOpen,
        Hook::DocumentDidSave,
        Hook::DocumentHighlight,
        Hook::DocumentSymbols,
        Hook::ExecuteCommand,
        Hook::ExperimentalCapabilities,
        Hook::FoldingRange,
        Hook::FormatDocument,
        Hook::FormatRange,
        Hook::Hover,
        Hook::Initialize,
        Hook::Initialized,
        Hook::Lint,
        Hook::References,
        Hook::Rename,
        Hook::Settings,
        Hook::SignatureHelp,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Hook::CodeActions => "code_actions",
            Hook::CodeLens => "code_lens",
            Hook::Commands => "commands",
            Hook::Completions => "completions",
            Hook::Definitions => "definitions",
            Hook::DocumentDidOpen => "document_did_open",
            Hook::DocumentDidSave => "document_did_save",
            Hook::DocumentHighlight => "document_highlight",
            Hook::DocumentSymbols => "document_symbols",
            Hook::ExecuteCommand => "execute_command",
            Hook::ExperimentalCapabilities => "experimental_capabilities",
            Hook::FoldingRange => "folding_range",
            Hook::FormatDocument => "format_document",
            Hook::FormatRange => "format_range",
            Hook::Hover => "hover",
            Hook::Initialize => "initialize",
            Hook::Initialized => "initialized",
            Hook::Lint => "lint",
            Hook::References => "references",
            Hook::Rename => "rename",
            Hook::Settings => "settings",
            Hook::SignatureHelp => "signature_help",
        }
    }

    #[must_use]
    pub fn policy(self) -> Policy {
        match self {
            Hook::ExecuteCommand
            | Hook::FoldingRange
            | Hook::FormatDocument
            | Hook::FormatRange
            | Hook::Hover
            | Hook::Rename
            | Hook::SignatureHelp => Policy::FirstResult,
            _ => Policy::Aggregate,
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
