//! RSASSA-PKCS1-v1_5 signature verification.

use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::{Sha256, Sha384, Sha512};

use crate::error::CryptoError;
use crate::types::{DigestAlgorithm, SignatureAlgorithm};

/// Verify a PKCS#1 v1.5 signature against a DER SubjectPublicKeyInfo.
pub(crate) fn verify(
    algorithm: SignatureAlgorithm,
    spki_der: &[u8],
    data: &[u8],
    signature: &[u8],
) -> Result<bool, CryptoError> {
    let key = RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;

    let sig = Signature::try_from(signature)
        .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;

    let valid = match algorithm.digest() {
        Some(DigestAlgorithm::Sha256) => VerifyingKey::<Sha256>::new(key).verify(data, &sig).is_ok(),
        Some(DigestAlgorithm::Sha384) => VerifyingKey::<Sha384>::new(key).verify(data, &sig).is_ok(),
        Some(DigestAlgorithm::Sha512) => VerifyingKey::<Sha512>::new(key).verify(data, &sig).is_ok(),
        _ => return Err(CryptoError::unsupported(algorithm.uri())),
    };

    Ok(valid)
}
