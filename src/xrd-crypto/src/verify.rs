//! Algorithm dispatch for signatures over SubjectPublicKeyInfo keys.

use crate::digest::digest;
use crate::error::CryptoError;
use crate::types::{SignatureAlgorithm, SignatureEncoding};

/// Verifies signatures made by the key in a DER SubjectPublicKeyInfo.
///
/// `Ok(false)` means the inputs were well formed but the signature does not
/// verify. `Err` means the key or signature could not be decoded, or the
/// algorithm is not compiled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpkiVerifier;

impl SpkiVerifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Verify `signature` over `data`.
    ///
    /// `encoding` only matters for ECDSA; RSA and Ed25519 signatures have a
    /// single wire form.
    pub fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        spki_der: &[u8],
        data: &[u8],
        signature: &[u8],
        encoding: SignatureEncoding,
    ) -> Result<bool, CryptoError> {
        match algorithm {
            SignatureAlgorithm::RsaPkcs1Sha256
            | SignatureAlgorithm::RsaPkcs1Sha384
            | SignatureAlgorithm::RsaPkcs1Sha512 => {
                #[cfg(feature = "rsa")]
                {
                    crate::pkcs1::verify(algorithm, spki_der, data, signature)
                }
                #[cfg(not(feature = "rsa"))]
                {
                    Err(CryptoError::unsupported(algorithm.uri()))
                }
            },
            SignatureAlgorithm::EcdsaSha256
            | SignatureAlgorithm::EcdsaSha384
            | SignatureAlgorithm::EcdsaSha512 => {
                let Some(hash) = algorithm.digest() else {
                    return Err(CryptoError::unsupported(algorithm.uri()));
                };
                #[cfg(any(feature = "ecdsa-p256", feature = "ecdsa-p384"))]
                {
                    crate::ecdsa::verify_prehash(spki_der, &digest(hash, data), signature, encoding)
                }
                #[cfg(not(any(feature = "ecdsa-p256", feature = "ecdsa-p384")))]
                {
                    let _ = (hash, encoding);
                    Err(CryptoError::unsupported(algorithm.uri()))
                }
            },
            SignatureAlgorithm::Ed25519 => {
                #[cfg(feature = "ed25519")]
                {
                    crate::ed25519::verify(spki_der, data, signature)
                }
                #[cfg(not(feature = "ed25519"))]
                {
                    Err(CryptoError::unsupported(algorithm.uri()))
                }
            },
        }
    }

    /// Verify with an algorithm given by OID, as found in X.509 and OCSP.
    ///
    /// ECDSA signatures are expected in DER form.
    pub fn verify_oid(
        &self,
        oid: &str,
        spki_der: &[u8],
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError> {
        let algorithm =
            SignatureAlgorithm::from_oid(oid).ok_or_else(|| CryptoError::unsupported(oid))?;
        self.verify(algorithm, spki_der, data, signature, SignatureEncoding::Der)
    }
}
