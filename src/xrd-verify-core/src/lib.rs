//! # xrd-verify-core
//!
//! Trust verification for federated message exchange: certificate paths,
//! OCSP evidence, batch hash chains and XAdES message signatures.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SignatureVerifier                         │
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │  Signature   │  │ TrustStore   │  │  Identity    │      │
//! │  │  Container   │  │ (snapshot)   │  │  Resolver    │      │
//! │  └──────────────┘  └──────────────┘  └──────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │              CertChainVerifier                    │      │
//! │  │    (path building, constraints, validity)        │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │              OcspVerifier                         │      │
//! │  │    (responder authorization, freshness, cache)   │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │              HashChainVerifier                    │      │
//! │  │    (batch membership, DigestResolver)            │      │
//! │  └──────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Properties
//!
//! - **Fail-closed**: every failure is a typed [`TrustError`]; there is no
//!   partial-trust outcome
//! - **Snapshot configuration**: trust anchors and responders are read from
//!   an immutable [`TrustSnapshot`] per call
//! - **No I/O**: content and OCSP responses are supplied by the caller

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow product names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod c14n;
pub mod cache;
pub mod cert;
pub mod chain;
pub mod config;
pub mod error;
pub mod hashchain;
pub mod ocsp;
pub mod resolver;
pub mod signature;
pub mod xml;

pub use cache::{OcspCacheKey, OcspValidityCache};
pub use cert::{Certificate, Identity, IdentityResolver, SubjectNameIdentityResolver};
pub use chain::{CertChain, CertChainVerifier};
pub use config::{TrustSnapshot, TrustSnapshotBuilder, TrustStore, VerifierConfig};
pub use error::{ErrorCategory, TrustError};
pub use hashchain::{HashChainBuilder, HashChainResult, HashChainVerifier};
pub use ocsp::{CertStatus, OcspResponse, OcspVerifier};
pub use resolver::{DigestResolver, MapResolver, PartContent};
pub use signature::{MessagePart, SignatureContainer, SignatureVerifier};

pub use xrd_crypto::{DigestAlgorithm, DigestValue, SignatureAlgorithm};
