mod document;
mod system;
pub mod uris;
mod workspace;

pub use document::Document;
pub use document::DocumentError;
pub use document::DocumentText;
pub use document::LineIndex;
pub use document::PROJECT_MARKERS;
pub use system::FileSystem;
pub use system::OsFileSystem;
pub use uris::UriError;
pub use workspace::Workspace;
