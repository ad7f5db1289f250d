//! Instance content loading.
//!
//! External instance content is fetched by collaborators: an
//! [`InstanceLoader`] (also the shared cache's miss-filler) or, for
//! non-cached instances, an optional pluggable [`UriResolver`]. Fetches are
//! blocking calls with no retry at this layer — callers needing
//! retry/backoff wrap the loader.

use url::Url;

use horizon_trellis_core::{DataTree, XmlError};

/// Errors raised while loading instance content.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The fetch itself failed (connection, status, …).
    #[error("Failed to fetch '{url}': {message}")]
    Fetch { url: String, message: String },

    /// The fetched content was not well-formed XML.
    #[error("Failed to parse instance content from '{url}': {source}")]
    Parse {
        url: String,
        #[source]
        source: XmlError,
    },

    /// The source URL did not resolve.
    #[error("Invalid instance source URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

impl LoadError {
    /// Create a fetch error.
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(url: impl Into<String>, source: XmlError) -> Self {
        Self::Parse {
            url: url.into(),
            source,
        }
    }
}

/// Fetches and parses instance content from a resolved URL.
///
/// Used both directly for non-cached instances and as the shared instance
/// cache's miss-filler. `read_only` selects the parse mode; a read-only
/// parse may use a more compact representation internally.
pub trait InstanceLoader {
    /// Load the content behind `resolved_url` into a data tree.
    fn load(
        &self,
        resolved_url: &str,
        follow_includes: bool,
        read_only: bool,
    ) -> Result<DataTree, LoadError>;
}

impl<L: InstanceLoader + ?Sized> InstanceLoader for Box<L> {
    fn load(
        &self,
        resolved_url: &str,
        follow_includes: bool,
        read_only: bool,
    ) -> Result<DataTree, LoadError> {
        (**self).load(resolved_url, follow_includes, read_only)
    }
}

/// A pluggable resolver consulted for non-cached instances before falling
/// back to a direct connection.
pub trait UriResolver {
    /// Read the content behind `resolved_url` into a data tree.
    fn read(&self, resolved_url: &str, read_only: bool) -> Result<DataTree, LoadError>;
}

/// An [`InstanceLoader`] for documents that declare no external instances:
/// every load fails.
#[derive(Debug, Default)]
pub struct UnsupportedLoader;

impl InstanceLoader for UnsupportedLoader {
    fn load(
        &self,
        resolved_url: &str,
        _follow_includes: bool,
        _read_only: bool,
    ) -> Result<DataTree, LoadError> {
        Err(LoadError::fetch(resolved_url, "no instance loader configured"))
    }
}

/// Resolve an instance source URL against an optional base URL.
pub fn resolve_service_url(base: Option<&Url>, source: &str) -> Result<Url, LoadError> {
    let resolved = match base {
        Some(base) => base.join(source),
        None => Url::parse(source),
    };
    resolved.map_err(|e| LoadError::InvalidUrl {
        url: source.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_absolute_url() {
        let url = resolve_service_url(None, "http://example.org/data.xml").unwrap();
        assert_eq!(url.as_str(), "http://example.org/data.xml");
    }

    #[test]
    fn test_resolve_relative_against_base() {
        let base = Url::parse("http://example.org/forms/order.xhtml").unwrap();
        let url = resolve_service_url(Some(&base), "instances/data.xml").unwrap();
        assert_eq!(url.as_str(), "http://example.org/forms/instances/data.xml");
    }

    #[test]
    fn test_resolve_relative_without_base_fails() {
        assert!(resolve_service_url(None, "instances/data.xml").is_err());
    }
}
