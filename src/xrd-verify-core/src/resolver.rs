//! Resolution of named message resources.

use std::collections::HashMap;

use xrd_crypto::DigestValue;

use crate::error::TrustError;

/// What the caller knows about a named input: either its bytes or a digest
/// computed when it was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartContent {
    /// Pre-computed digest.
    Digest(DigestValue),
    /// Raw content.
    Bytes(Vec<u8>),
}

/// Supplies the content behind URIs referenced by hash chains.
pub trait DigestResolver: Send + Sync {
    /// Whether the reference to `uri` with declared digest `digest` should be
    /// checked at all. Detached content answers `false`; the declared digest
    /// is then taken as is.
    fn should_resolve(&self, uri: &str, digest: &[u8]) -> bool {
        let _ = (uri, digest);
        true
    }

    /// Content of `uri`. Unknown URIs fail with `InvalidReference`.
    fn resolve(&self, uri: &str) -> Result<Vec<u8>, TrustError>;
}

/// Resolver over an in-memory map of URI to content.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    entries: HashMap<String, Vec<u8>>,
}

impl MapResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content` for `uri`.
    pub fn insert(&mut self, uri: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.entries.insert(uri.into(), content.into());
    }

    /// Builder-style [`MapResolver::insert`].
    #[must_use]
    pub fn with(mut self, uri: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(uri, content);
        self
    }

    /// Whether `uri` has content.
    #[must_use]
    pub fn contains(&self, uri: &str) -> bool {
        self.entries.contains_key(uri)
    }
}

impl DigestResolver for MapResolver {
    fn resolve(&self, uri: &str) -> Result<Vec<u8>, TrustError> {
        self.entries
            .get(uri)
            .cloned()
            .ok_or_else(|| TrustError::InvalidReference {
                uri: uri.to_string(),
            })
    }
}

/// Tries `primary` first, then `fallback` for URIs it does not have.
/// Whether to resolve at all is decided by `fallback`.
pub(crate) struct LayeredResolver<'a> {
    pub(crate) primary: MapResolver,
    pub(crate) fallback: Option<&'a dyn DigestResolver>,
}

impl DigestResolver for LayeredResolver<'_> {
    fn should_resolve(&self, uri: &str, digest: &[u8]) -> bool {
        self.fallback
            .map_or(true, |fallback| fallback.should_resolve(uri, digest))
    }

    fn resolve(&self, uri: &str) -> Result<Vec<u8>, TrustError> {
        match self.fallback {
            Some(fallback) if !self.primary.contains(uri) => fallback.resolve(uri),
            _ => self.primary.resolve(uri),
        }
    }
}
