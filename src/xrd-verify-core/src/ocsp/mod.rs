//! OCSP responses and their verification.
//!
//! A response is trusted for a (subject, issuer) pair only when it names that
//! pair, carries a valid signature from an authorized responder and is
//! current at the verification time. Fetching responses is the caller's job.

pub mod asn1;
mod response;
mod verifier;

pub use response::{CertId, CertStatus, OcspResponse, ResponderId, SingleResponse};
pub use verifier::{is_expired, OcspVerifier};
