//! # xrd-crypto
//!
//! Digest and signature primitives for federated message trust verification.
//!
//! Everything here is verification-only: keys arrive as DER
//! SubjectPublicKeyInfo taken from X.509 certificates, signatures arrive in
//! the wire form of the document that carried them.
//!
//! ## Supported Algorithms
//!
//! - **Digests**: SHA-1 (OCSP identifiers only), SHA-256, SHA-384, SHA-512
//! - **RSA**: PKCS#1 v1.5 with SHA-256/384/512
//! - **ECDSA**: P-256 and P-384 keys with SHA-256/384/512, DER or `r || s`
//! - **Ed25519**
//!
//! Algorithms are tagged by OID and by XML-DSig URI:
//!
//! ```rust
//! use xrd_crypto::{DigestAlgorithm, DigestValue};
//!
//! let alg = DigestAlgorithm::from_uri("http://www.w3.org/2001/04/xmlenc#sha256").unwrap();
//! let value = DigestValue::compute(alg, b"message");
//! assert!(value.matches_data(b"message"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod digest;
mod error;
mod types;
mod verify;

#[cfg(any(feature = "ecdsa-p256", feature = "ecdsa-p384"))]
mod ecdsa;

#[cfg(feature = "ed25519")]
mod ed25519;

#[cfg(feature = "rsa")]
mod pkcs1;

pub use digest::{digest, DigestValue};
pub use error::CryptoError;
pub use types::{DigestAlgorithm, SignatureAlgorithm, SignatureEncoding};
pub use verify::SpkiVerifier;

/// Constant-time byte comparison.
///
/// Compares two byte slices in constant time to prevent timing attacks.
/// Returns `true` if the slices are equal, `false` otherwise.
///
/// # Security
///
/// This function MUST be used for all digest and signature comparisons.
/// The length check still returns early, but length is typically not secret.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
