//! Hash chain verification.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, instrument, trace};
use xrd_crypto::{digest, DigestAlgorithm, DigestValue};

use super::model::{digest_list, split_step_uri, HashChain, HashChainResult, StepValue, Transform};
use crate::error::TrustError;
use crate::resolver::{DigestResolver, PartContent};

/// Longest chain of step references followed from the result.
pub const MAX_STEP_DEPTH: usize = 128;

/// Verifies hash chain results against ground-truth inputs.
pub struct HashChainVerifier<'r> {
    resolver: &'r dyn DigestResolver,
}

impl<'r> HashChainVerifier<'r> {
    /// Create a verifier that fetches chain documents and unsupplied inputs
    /// through `resolver`.
    #[must_use]
    pub fn new(resolver: &'r dyn DigestResolver) -> Self {
        Self { resolver }
    }

    /// Verify that the chain referenced by `result_xml` yields its declared
    /// digest and consumes every entry of `inputs` exactly once.
    ///
    /// An input mapped to `None` is known to exist but its content is
    /// fetched through the resolver.
    #[instrument(skip_all, fields(inputs = inputs.len()))]
    pub fn verify(
        &self,
        result_xml: &[u8],
        inputs: &HashMap<String, Option<PartContent>>,
    ) -> Result<(), TrustError> {
        let result = HashChainResult::parse(result_xml)?;
        let (file, step_id) = split_step_uri(&result.uri)?;
        if file.is_empty() {
            return Err(TrustError::malformed_hash_chain(
                "hash chain result must name a hash chain document",
            ));
        }

        let mut run = Run {
            resolver: self.resolver,
            inputs,
            chains: HashMap::new(),
            consumed: HashSet::new(),
            visited: HashSet::new(),
            in_progress: HashSet::new(),
        };
        let top = run.step_bytes(file, step_id)?;

        let computed = DigestValue::compute(result.digest.algorithm, &top);
        if !computed.matches(&result.digest) {
            return Err(TrustError::invalid_hash_chain_result(
                "hash chain result does not match hash chain calculation",
            ));
        }

        let mut unused: Vec<String> = inputs
            .keys()
            .filter(|name| !run.consumed.contains(name.as_str()))
            .cloned()
            .collect();
        if !unused.is_empty() {
            unused.sort();
            debug!(?unused, "hash chain leaves inputs unreferenced");
            return Err(TrustError::UnusedHashChainInputs { inputs: unused });
        }

        debug!(uri = %result.uri, "hash chain verified");
        Ok(())
    }
}

/// State of one verification.
struct Run<'v> {
    resolver: &'v dyn DigestResolver,
    inputs: &'v HashMap<String, Option<PartContent>>,
    /// Chain documents by file name.
    chains: HashMap<String, Rc<HashChain>>,
    /// Leaf URIs already referenced.
    consumed: HashSet<String>,
    /// `file#id` of every step resolved so far.
    visited: HashSet<String>,
    /// `file#id` of steps on the current resolution path.
    in_progress: HashSet<String>,
}

impl Run<'_> {
    fn chain(&mut self, file: &str) -> Result<Rc<HashChain>, TrustError> {
        if let Some(chain) = self.chains.get(file) {
            return Ok(Rc::clone(chain));
        }
        trace!(file, "loading hash chain document");
        let bytes = self.resolver.resolve(file)?;
        let chain = Rc::new(HashChain::parse(&bytes)?);
        self.chains.insert(file.to_string(), Rc::clone(&chain));
        Ok(chain)
    }

    /// DER digest list of step `id` in `file`.
    fn step_bytes(&mut self, file: &str, id: &str) -> Result<Vec<u8>, TrustError> {
        let key = format!("{file}#{id}");
        if self.in_progress.contains(&key) {
            return Err(TrustError::malformed_hash_chain(format!(
                "reference cycle through hash step {key}"
            )));
        }
        if !self.visited.insert(key.clone()) {
            return Err(TrustError::malformed_hash_chain(format!(
                "hash step {key} is referenced more than once"
            )));
        }
        if self.in_progress.len() >= MAX_STEP_DEPTH {
            return Err(TrustError::malformed_hash_chain(format!(
                "step references nested deeper than {MAX_STEP_DEPTH} levels"
            )));
        }
        self.in_progress.insert(key.clone());

        let chain = self.chain(file)?;
        let step = chain.step(id).ok_or_else(|| {
            TrustError::malformed_hash_chain(format!("no hash step {id} in {file}"))
        })?;

        let mut digests = Vec::with_capacity(step.values.len());
        for value in &step.values {
            digests.push(self.value_digest(value, file, chain.default_algorithm)?);
        }

        self.in_progress.remove(&key);
        Ok(digest_list(&digests))
    }

    fn value_digest(
        &mut self,
        value: &StepValue,
        file: &str,
        default_algorithm: DigestAlgorithm,
    ) -> Result<DigestValue, TrustError> {
        match value {
            StepValue::HashValue { algorithm, digest } => Ok(DigestValue::new(
                algorithm.unwrap_or(default_algorithm),
                digest.clone(),
            )),
            StepValue::StepRef {
                uri,
                algorithm,
                digest: declared,
            } => {
                let algorithm = algorithm.unwrap_or(default_algorithm);
                let (target_file, id) = split_step_uri(uri)?;
                let target_file = if target_file.is_empty() {
                    file
                } else {
                    target_file
                };

                let bytes = self.step_bytes(target_file, id)?;
                let computed = DigestValue::compute(algorithm, &bytes);
                if let Some(declared) = declared {
                    if !computed.matches(&DigestValue::new(algorithm, declared.clone())) {
                        return Err(TrustError::InvalidHashChainRef { uri: uri.clone() });
                    }
                }
                Ok(computed)
            },
            StepValue::DataRef {
                uri,
                transforms,
                algorithm,
                digest,
            } => self.data_digest(
                uri,
                transforms,
                DigestValue::new(algorithm.unwrap_or(default_algorithm), digest.clone()),
            ),
        }
    }

    fn data_digest(
        &mut self,
        uri: &str,
        transforms: &[Transform],
        declared: DigestValue,
    ) -> Result<DigestValue, TrustError> {
        if !self.consumed.insert(uri.to_string()) {
            return Err(TrustError::malformed_hash_chain(format!(
                "input {uri} is referenced more than once"
            )));
        }

        if !self.resolver.should_resolve(uri, &declared.bytes) {
            trace!(uri, "reference not resolved, using declared digest");
            return Ok(declared);
        }

        let actual = match self.inputs.get(uri) {
            Some(Some(PartContent::Digest(supplied))) => {
                if supplied.algorithm != declared.algorithm {
                    return Err(TrustError::invalid_hash_chain_result(format!(
                        "digest of {uri} uses {:?}, hash chain uses {:?}",
                        supplied.algorithm, declared.algorithm
                    )));
                }
                supplied.clone()
            },
            Some(Some(PartContent::Bytes(bytes))) => {
                DigestValue::new(declared.algorithm, transformed_digest(declared.algorithm, bytes, transforms)?)
            },
            Some(None) | None => {
                let bytes = self.resolver.resolve(uri)?;
                DigestValue::new(declared.algorithm, transformed_digest(declared.algorithm, &bytes, transforms)?)
            },
        };

        if !actual.matches(&declared) {
            return Err(TrustError::invalid_hash_chain_result(format!(
                "digest of {uri} does not match hash chain"
            )));
        }
        Ok(declared)
    }
}

fn transformed_digest(
    algorithm: DigestAlgorithm,
    data: &[u8],
    transforms: &[Transform],
) -> Result<Vec<u8>, TrustError> {
    let mut current = data.to_vec();
    for transform in transforms {
        current = transform.apply(&current)?;
    }
    Ok(digest(algorithm, &current))
}

/// Ground-truth input map from named contents.
#[must_use]
pub fn inputs_from<I, S>(parts: I) -> HashMap<String, Option<PartContent>>
where
    I: IntoIterator<Item = (S, Option<PartContent>)>,
    S: Into<String>,
{
    parts
        .into_iter()
        .map(|(name, content)| (name.into(), content))
        .collect()
}
