//! Path and URI conversion utilities
//!
//! Documents and workspace folders are identified by URIs, while everything that
//! touches the disk works with paths. This module converts between the two and
//! answers the containment question that multi-root routing is built on.

use std::path::Path;
use std::path::PathBuf;

use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("malformed URI or path: {0}")]
    Malformed(String),
}

/// Convert a filesystem path to a `file://` URI.
///
/// Relative paths are made absolute against the current directory first.
pub fn from_fs_path(path: &Path) -> Result<Url, UriError> {
    let malformed = || UriError::Malformed(path.display().to_string());

    if path.as_os_str().is_empty() {
        return Err(malformed());
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::path::absolute(path).map_err(|_| malformed())?
    };

    Url::from_file_path(&absolute).map_err(|()| malformed())
}

/// Convert a `file://` URI to a [`PathBuf`].
///
/// Handles percent-encoding and platform-specific path formats (e.g., Windows drives).
pub fn to_fs_path(uri: &Url) -> Result<PathBuf, UriError> {
    if uri.scheme() != "file" {
        return Err(UriError::Malformed(uri.to_string()));
    }

    let path = percent_decode_str(uri.path())
        .decode_utf8()
        .map_err(|_| UriError::Malformed(uri.to_string()))?;

    #[cfg(windows)]
    let path = {
        // Remove leading '/' for paths like /C:/...
        path.strip_prefix('/').unwrap_or(&path)
    };

    Ok(PathBuf::from(path.as_ref()))
}

/// Parse a document or folder identifier into a normalized URI.
///
/// Clients send either a proper URI or a bare absolute path, so both are accepted.
/// A trailing slash on the path is dropped so `file:///a/` and `file:///a` name the
/// same folder.
pub fn parse(text: &str) -> Result<Url, UriError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(UriError::Malformed(String::new()));
    }

    // Single-letter schemes are Windows drive letters, not URIs.
    let url = match Url::parse(text) {
        Ok(url) if url.scheme().len() > 1 => url,
        _ => {
            let path = Path::new(text);
            if !path.is_absolute() {
                return Err(UriError::Malformed(text.to_string()));
            }
            from_fs_path(path)?
        }
    };

    Ok(normalize(url))
}

/// Strip a trailing `/` from the URI path, keeping the filesystem root intact.
#[must_use]
pub fn normalize(mut url: Url) -> Url {
    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        url.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
    }
    url
}

/// Whether `uri` is `root` itself or lives somewhere beneath it.
///
/// Comparison is component-wise, so `file:///ws1` does not contain `file:///ws10/a.py`.
#[must_use]
pub fn contains(root: &Url, uri: &Url) -> bool {
    if root.scheme() != uri.scheme()
        || root.host_str() != uri.host_str()
        || root.port() != uri.port()
    {
        return false;
    }

    let root_segments = segments(root);
    let uri_segments = segments(uri);

    root_segments.len() <= uri_segments.len()
        && root_segments
            .iter()
            .zip(&uri_segments)
            .all(|(left, right)| left == right)
}

/// Number of non-empty path segments, used to pick the most specific root.
#[must_use]
pub fn depth(uri: &Url) -> usize {
    segments(uri).len()
}

fn segments(uri: &Url) -> Vec<String> {
    uri.path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(text: &str) -> Url {
        Url::parse(text).unwrap()
    }

    #[test]
    fn test_to_fs_path_basic() {
        let path = to_fs_path(&url("file:///home/user/file.py")).unwrap();
        assert_eq!(path, PathBuf::from("/home/user/file.py"));
    }

    #[test]
    fn test_to_fs_path_with_spaces() {
        let path = to_fs_path(&url("file:///home/user/my%20file.py")).unwrap();
        assert_eq!(path, PathBuf::from("/home/user/my file.py"));
    }

    #[test]
    fn test_to_fs_path_non_file_scheme() {
        let result = to_fs_path(&url("untitled:Untitled-1"));
        assert!(matches!(result, Err(UriError::Malformed(_))));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_round_trip() {
        let original = PathBuf::from("/home/user/test file & more.py");
        let uri = from_fs_path(&original).unwrap();
        assert!(uri.as_str().contains("%20"));
        assert_eq!(to_fs_path(&uri).unwrap(), original);
    }

    #[test]
    fn test_from_fs_path_relative_is_made_absolute() {
        let uri = from_fs_path(Path::new("some/relative.py")).unwrap();
        assert_eq!(uri.scheme(), "file");
        assert!(uri.path().ends_with("/some/relative.py"));
    }

    #[test]
    fn test_from_fs_path_empty_is_malformed() {
        assert!(from_fs_path(Path::new("")).is_err());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_parse_accepts_bare_paths() {
        let uri = parse("/tmp/project/").unwrap();
        assert_eq!(uri.as_str(), "file:///tmp/project");
    }

    #[test]
    fn test_parse_keeps_uris() {
        assert_eq!(parse("file:///tmp/a.py").unwrap().as_str(), "file:///tmp/a.py");
        assert_eq!(parse("untitled:Untitled-1").unwrap().scheme(), "untitled");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("").is_err());
        assert!(parse("not a path").is_err());
    }

    #[test]
    fn test_normalize_keeps_root() {
        assert_eq!(normalize(url("file:///")).as_str(), "file:///");
        assert_eq!(normalize(url("file:///a/b//")).as_str(), "file:///a/b");
    }

    #[test]
    fn test_contains() {
        let root = url("file:///ws1");
        assert!(contains(&root, &url("file:///ws1")));
        assert!(contains(&root, &url("file:///ws1/pkg/mod.py")));
        assert!(!contains(&root, &url("file:///ws10/mod.py")));
        assert!(!contains(&root, &url("file:///other/mod.py")));
        assert!(!contains(&root, &url("untitled:ws1")));
    }

    #[test]
    fn test_contains_decodes_segments() {
        let root = url("file:///my%20ws");
        assert!(contains(&root, &url("file:///my%20ws/a.py")));
    }

    #[test]
    fn test_depth() {
        assert_eq!(depth(&url("file:///")), 0);
        assert_eq!(depth(&url("file:///a/b/c.py")), 3);
    }
}
