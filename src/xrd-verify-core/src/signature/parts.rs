//! Named message parts covered by a signature.

use xrd_crypto::{DigestAlgorithm, DigestValue};

use crate::resolver::PartContent;

/// The SOAP message body.
pub const MESSAGE: &str = "/message.xml";

/// Hash chain document of a batch signature.
pub const HASH_CHAIN: &str = "/hashchain.xml";

/// Hash chain result document of a batch signature.
pub const HASH_CHAIN_RESULT: &str = "/hashchainresult.xml";

/// Name of the `n`th attachment, counting from 1.
#[must_use]
pub fn attachment(n: usize) -> String {
    format!("/attachment{n}")
}

/// A message part supplied for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePart {
    /// Name the signature refers to the part by.
    pub name: String,
    /// Content or its digest.
    pub content: PartContent,
}

impl MessagePart {
    /// A part whose bytes are at hand.
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: PartContent::Bytes(data.into()),
        }
    }

    /// A part known only by its digest.
    #[must_use]
    pub fn from_digest(name: impl Into<String>, digest: DigestValue) -> Self {
        Self {
            name: name.into(),
            content: PartContent::Digest(digest),
        }
    }

    /// Digest of the part under `algorithm`, if it can be produced.
    ///
    /// A part given by digest only has one under its own algorithm.
    #[must_use]
    pub fn digest(&self, algorithm: DigestAlgorithm) -> Option<DigestValue> {
        match &self.content {
            PartContent::Digest(d) if d.algorithm == algorithm => Some(d.clone()),
            PartContent::Digest(_) => None,
            PartContent::Bytes(data) => Some(DigestValue::compute(algorithm, data)),
        }
    }
}
