//! ECDSA verification over NIST P-256 and P-384 keys.
//!
//! The curve is taken from the SubjectPublicKeyInfo; the hash is taken from
//! the signature algorithm, so e.g. ecdsa-with-SHA384 over a P-256 key is
//! verified against the truncated SHA-384 pre-hash.

use signature::hazmat::PrehashVerifier;

use crate::error::CryptoError;
use crate::types::SignatureEncoding;

/// Verify an ECDSA signature over an already computed message digest.
pub(crate) fn verify_prehash(
    spki_der: &[u8],
    prehash: &[u8],
    signature: &[u8],
    encoding: SignatureEncoding,
) -> Result<bool, CryptoError> {
    #[cfg(feature = "ecdsa-p256")]
    {
        use p256::pkcs8::DecodePublicKey;

        if let Ok(vk) = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
            let sig = match encoding {
                SignatureEncoding::Der => p256::ecdsa::Signature::from_der(signature),
                SignatureEncoding::Fixed => p256::ecdsa::Signature::from_slice(signature),
            }
            .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;

            return Ok(vk.verify_prehash(prehash, &sig).is_ok());
        }
    }

    #[cfg(feature = "ecdsa-p384")]
    {
        use p384::pkcs8::DecodePublicKey;

        if let Ok(vk) = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
            let sig = match encoding {
                SignatureEncoding::Der => p384::ecdsa::Signature::from_der(signature),
                SignatureEncoding::Fixed => p384::ecdsa::Signature::from_slice(signature),
            }
            .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;

            return Ok(vk.verify_prehash(prehash, &sig).is_ok());
        }
    }

    let _ = (prehash, signature, encoding);
    Err(CryptoError::invalid_public_key(format!(
        "not a supported EC public key ({} bytes of SPKI)",
        spki_der.len()
    )))
}
