//! Hash chains: Merkle-tree proofs that a set of message parts belongs to a
//! signed batch.
//!
//! A signature over many messages signs one [`HashChainResult`]. Each message
//! carries a [`HashChain`] that recomputes that result from the message's own
//! parts and the sibling digests of the other messages.
//!
//! ```text
//!   HashChainResult ──► STEP0 ──► StepRef ──► STEP1 ──► DataRef (/message.xml)
//!                          │                     └────► DataRef (/attachment1)
//!                          └────► HashValue (other messages)
//! ```

mod builder;
mod model;
mod verifier;

pub use builder::{BuiltHashChain, HashChainBuilder};
pub use model::{
    digest_list, HashChain, HashChainResult, HashStep, StepValue, Transform, BASE64_TRANSFORM,
    HASH_CHAIN_NS,
};
pub use verifier::{inputs_from, HashChainVerifier, MAX_STEP_DEPTH};

pub(crate) use model::decode_base64;
