//! Documents tracked by a workspace
//!
//! A [`Document`] is either *tracked* (the client opened it and owns its text) or
//! *untracked*, in which case every read goes to disk. Tracked text is always
//! authoritative over the disk copy.

mod line_index;

use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;

pub use line_index::LineIndex;
use thiserror::Error;
use tower_lsp_server::lsp_types::Position;
use tower_lsp_server::lsp_types::TextDocumentContentChangeEvent;
use url::Url;

use crate::system::FileSystem;
use crate::uris;

/// Files whose presence marks a directory as a project root.
pub const PROJECT_MARKERS: &[&str] = &["setup.py", "pyproject.toml", "setup.cfg", "Cargo.toml"];

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("cannot read {uri}: {source}")]
    Unreadable {
        uri: Url,
        #[source]
        source: io::Error,
    },
    #[error("version {received} for {uri} is not newer than {current}")]
    StaleVersion {
        uri: Url,
        current: i32,
        received: i32,
    },
    #[error("change range {start:?}..{end:?} is outside of {uri}")]
    InvalidRange {
        uri: Url,
        start: Position,
        end: Position,
    },
}

/// Text of a document at one point in time together with its line index.
#[derive(Clone, Debug)]
pub struct DocumentText {
    text: Arc<str>,
    line_index: Arc<LineIndex>,
}

impl DocumentText {
    #[must_use]
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let line_index = Arc::new(LineIndex::new(&text));
        Self { text, line_index }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn shared(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    #[must_use]
    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }

    #[must_use]
    pub fn offset_at(&self, position: Position) -> Option<usize> {
        self.line_index.offset_at(position)
    }

    #[must_use]
    pub fn position_at(&self, offset: usize) -> Position {
        self.line_index.position_at(offset)
    }

    #[must_use]
    pub fn line(&self, line: usize) -> Option<&str> {
        self.line_index.line(&self.text, line)
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.line_index.line_count()).filter_map(|line| self.line(line))
    }

    /// Identifier under the cursor, if the cursor touches one.
    #[must_use]
    pub fn word_at_position(&self, position: Position) -> Option<String> {
        let line: Vec<char> = self.line(position.line as usize)?.chars().collect();
        let cursor = (position.character as usize).min(line.len());

        let mut start = cursor;
        while start > 0 && is_word_char(line[start - 1]) {
            start -= 1;
        }
        let mut end = cursor;
        while end < line.len() && is_word_char(line[end]) {
            end += 1;
        }

        (start < end).then(|| line[start..end].iter().collect())
    }
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[derive(Clone, Debug)]
pub struct Document {
    uri: Url,
    path: Option<PathBuf>,
    workspace_root: Option<PathBuf>,
    tracked: Option<DocumentText>,
    version: Option<i32>,
    project_root: Arc<OnceLock<Option<PathBuf>>>,
    fs: Arc<dyn FileSystem>,
}

impl Document {
    /// A document whose content is owned by the client.
    #[must_use]
    pub fn tracked(
        uri: Url,
        text: impl Into<Arc<str>>,
        version: Option<i32>,
        workspace_root: Option<PathBuf>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let mut document = Self::untracked(uri, workspace_root, fs);
        document.tracked = Some(DocumentText::new(text));
        document.version = version;
        document
    }

    /// A document that reads through to disk on every access.
    #[must_use]
    pub fn untracked(uri: Url, workspace_root: Option<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        let path = uris::to_fs_path(&uri).ok();
        Self {
            uri,
            path,
            workspace_root,
            tracked: None,
            version: None,
            project_root: Arc::new(OnceLock::new()),
            fs,
        }
    }

    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn version(&self) -> Option<i32> {
        self.version
    }

    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.tracked.is_some()
    }

    /// Current text, reading from disk when the document is not tracked.
    pub fn text(&self) -> Result<DocumentText, DocumentError> {
        if let Some(tracked) = &self.tracked {
            return Ok(tracked.clone());
        }

        let path = self.path.as_deref().ok_or_else(|| DocumentError::Unreadable {
            uri: self.uri.clone(),
            source: io::Error::new(io::ErrorKind::Unsupported, "not a file URI"),
        })?;

        self.fs
            .read_to_string(path)
            .map(DocumentText::new)
            .map_err(|source| DocumentError::Unreadable {
                uri: self.uri.clone(),
                source,
            })
    }

    pub fn source(&self) -> Result<Arc<str>, DocumentError> {
        self.text().map(|text| text.shared())
    }

    pub fn offset_at(&self, position: Position) -> Result<Option<usize>, DocumentError> {
        Ok(self.text()?.offset_at(position))
    }

    pub fn position_at(&self, offset: usize) -> Result<Position, DocumentError> {
        Ok(self.text()?.position_at(offset))
    }

    /// Replace the tracked text wholesale.
    pub fn set_text(&mut self, text: impl Into<Arc<str>>, version: Option<i32>) {
        self.tracked = Some(DocumentText::new(text));
        self.version = version;
    }

    /// Apply content changes in order and move to `version`.
    ///
    /// Out-of-order versions are rejected and leave the document untouched. Changes
    /// to an untracked document start from its disk content.
    pub fn apply_change(
        &mut self,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> Result<(), DocumentError> {
        if let Some(current) = self.version {
            if version <= current {
                return Err(DocumentError::StaleVersion {
                    uri: self.uri.clone(),
                    current,
                    received: version,
                });
            }
        }

        let base = match &self.tracked {
            Some(tracked) => tracked.as_str().to_string(),
            None if changes.first().is_some_and(|change| change.range.is_none()) => String::new(),
            None => self.text()?.as_str().to_string(),
        };

        let text = apply_text_changes(&self.uri, base, changes)?;
        self.set_text(text, Some(version));
        Ok(())
    }

    /// Drop the tracked text; later reads go to disk again.
    ///
    /// The resolved project root stays cached.
    pub fn clear(&mut self) {
        self.tracked = None;
        self.version = None;
    }

    /// Move this document under another workspace root, forgetting derived paths.
    #[must_use]
    pub fn reparent(mut self, workspace_root: Option<PathBuf>) -> Self {
        if self.workspace_root != workspace_root {
            self.workspace_root = workspace_root;
            self.project_root = Arc::new(OnceLock::new());
        }
        self
    }

    /// Nearest ancestor directory holding a project marker, bounded by the workspace
    /// root and falling back to it.
    #[must_use]
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root
            .get_or_init(|| self.find_project_root())
            .as_deref()
    }

    /// Directories analysis plugins should search for modules, most specific first.
    #[must_use]
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(project_root) = self.project_root() {
            paths.push(project_root.to_path_buf());
        }
        if let Some(root) = &self.workspace_root {
            if !paths.contains(root) {
                paths.push(root.clone());
            }
        }
        paths
    }

    fn find_project_root(&self) -> Option<PathBuf> {
        let fallback = self
            .workspace_root
            .clone()
            .or_else(|| self.path.as_deref()?.parent().map(Path::to_path_buf));

        let Some(start) = self.path.as_deref().and_then(Path::parent) else {
            return fallback;
        };

        for dir in start.ancestors() {
            if let Some(root) = &self.workspace_root {
                if !dir.starts_with(root) {
                    break;
                }
            }
            if PROJECT_MARKERS
                .iter()
                .any(|marker| self.fs.is_file(&dir.join(marker)))
            {
                tracing::trace!("Project root for {} is {}", self.uri, dir.display());
                return Some(dir.to_path_buf());
            }
        }

        fallback
    }
}

fn apply_text_changes(
    uri: &Url,
    mut text: String,
    changes: &[TextDocumentContentChangeEvent],
) -> Result<String, DocumentError> {
    for change in changes {
        let Some(range) = change.range else {
            text.clone_from(&change.text);
            continue;
        };

        let index = LineIndex::new(&text);
        let invalid = || DocumentError::InvalidRange {
            uri: uri.clone(),
            start: range.start,
            end: range.end,
        };
        let start = index.offset_at(range.start).ok_or_else(invalid)?;
        let end = index.offset_at(range.end).ok_or_else(invalid)?;
        if start > end {
            return Err(invalid());
        }

        let start = index.byte_offset(&text, start);
        let end = index.byte_offset(&text, end);
        text.replace_range(start..end, &change.text);
    }

    Ok(text)
}
