use std::str::FromStr;

use rols_workspace::uris;
use tower_lsp_server::lsp_types;
use url::Url;

pub(crate) trait UriExt {
    /// Convert an LSP Uri to a normalized [`Url`] for routing and storage.
    fn to_url(&self) -> Option<Url>;
}

impl UriExt for lsp_types::Uri {
    fn to_url(&self) -> Option<Url> {
        uris::parse(self.as_str())
            .inspect_err(|err| {
                tracing::trace!("URI conversion failed for {}: {err}", self.as_str());
            })
            .ok()
    }
}

pub(crate) trait UrlExt {
    fn to_lsp_uri(&self) -> Option<lsp_types::Uri>;
}

impl UrlExt for Url {
    fn to_lsp_uri(&self) -> Option<lsp_types::Uri> {
        lsp_types::Uri::from_str(self.as_str())
            .inspect_err(|_| tracing::trace!("URI conversion failed for {self}"))
            .ok()
    }
}

pub(crate) trait ClientCapabilitiesExt {
    /// Whether the client accepts positions counted in characters.
    fn supports_utf32(&self) -> bool;
}

impl ClientCapabilitiesExt for lsp_types::ClientCapabilities {
    fn supports_utf32(&self) -> bool {
        self.general
            .as_ref()
            .and_then(|general| general.position_encodings.as_ref())
            .is_some_and(|encodings| encodings.contains(&lsp_types::PositionEncodingKind::UTF32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_to_url_normalizes() {
        let uri = lsp_types::Uri::from_str("file:///ws/pkg/").unwrap();
        assert_eq!(uri.to_url(), Some(Url::parse("file:///ws/pkg").unwrap()));
    }

    #[test]
    fn test_url_round_trip() {
        let url = Url::parse("file:///ws/a%20b.py").unwrap();
        let uri = url.to_lsp_uri().unwrap();
        assert_eq!(uri.as_str(), "file:///ws/a%20b.py");
        assert_eq!(uri.to_url(), Some(url));
    }

    #[test]
    fn test_position_encodings() {
        let mut capabilities = lsp_types::ClientCapabilities::default();
        assert!(!capabilities.supports_utf32());

        capabilities.general = Some(lsp_types::GeneralClientCapabilities {
            position_encodings: Some(vec![
                lsp_types::PositionEncodingKind::UTF16,
                lsp_types::PositionEncodingKind::UTF32,
            ]),
            ..Default::default()
        });
        assert!(capabilities.supports_utf32());
    }
}
