//! Ed25519 signature verification.

use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::error::CryptoError;

/// Verify a pure Ed25519 signature against a DER SubjectPublicKeyInfo.
pub(crate) fn verify(spki_der: &[u8], data: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
    let vk = VerifyingKey::from_public_key_der(spki_der)
        .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;

    let sig = Signature::from_slice(signature)
        .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;

    Ok(vk.verify(data, &sig).is_ok())
}
