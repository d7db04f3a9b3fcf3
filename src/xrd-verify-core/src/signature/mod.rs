//! XAdES message signatures.
//!
//! Verification runs in a fixed order and stops at the first failure:
//!
//! 1. parse the container and extract certificates and OCSP responses
//! 2. check the signer's identity
//! 3. build and verify the certificate chain
//! 4. check message parts, directly or through the hash chain
//! 5. check same-document references and the signature value

mod container;
mod parts;
mod verifier;

pub use container::{
    ParsedSignature, Reference, SignatureContainer, ASIC_NS, DSIG_NS, XADES_NS,
};
pub use parts::{attachment, MessagePart, HASH_CHAIN, HASH_CHAIN_RESULT, MESSAGE};
pub use verifier::SignatureVerifier;
