//! Digest computation and algorithm-tagged digest values.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::types::DigestAlgorithm;

/// Compute a digest of `data` with `algorithm`.
#[must_use]
pub fn digest(algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
    match algorithm {
        DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
        DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
        DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
    }
}

/// A digest together with the algorithm that produced it.
///
/// Equality is algorithm-aware: two values with different algorithms are
/// never equal, even if their bytes coincide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DigestValue {
    /// Algorithm that produced `bytes`.
    pub algorithm: DigestAlgorithm,
    /// Raw digest bytes.
    pub bytes: Vec<u8>,
}

impl DigestValue {
    /// Wrap already computed digest bytes.
    #[must_use]
    pub fn new(algorithm: DigestAlgorithm, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            algorithm,
            bytes: bytes.into(),
        }
    }

    /// Digest `data` with `algorithm`.
    #[must_use]
    pub fn compute(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
        Self {
            algorithm,
            bytes: digest(algorithm, data),
        }
    }

    /// Constant-time comparison that also requires matching algorithms.
    #[must_use]
    pub fn matches(&self, other: &DigestValue) -> bool {
        self.algorithm == other.algorithm && crate::constant_time_eq(&self.bytes, &other.bytes)
    }

    /// Check `data` against this digest using the same algorithm.
    #[must_use]
    pub fn matches_data(&self, data: &[u8]) -> bool {
        crate::constant_time_eq(&self.bytes, &digest(self.algorithm, data))
    }
}
