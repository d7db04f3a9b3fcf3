//! Construction of Merkle hash chains over groups of message parts.

use xrd_crypto::{digest, DigestAlgorithm, DigestValue};

use super::model::{digest_list, HashChain, HashChainResult, HashStep, StepValue};
use crate::error::TrustError;

/// Builds one hash chain result over several groups of inputs, plus one hash
/// chain per group that proves the group's membership.
///
/// A group with one input contributes that input's digest as a leaf. A group
/// with several inputs contributes the digest of their digest list.
#[derive(Debug, Clone)]
pub struct HashChainBuilder {
    algorithm: DigestAlgorithm,
    groups: Vec<Vec<(String, Vec<u8>)>>,
}

/// Output of [`HashChainBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltHashChain {
    /// The result to be signed.
    pub result: HashChainResult,
    /// One chain per group, in the order the groups were added.
    pub chains: Vec<HashChain>,
}

struct Node {
    digest: Vec<u8>,
    kind: NodeKind,
}

enum NodeKind {
    Group(usize),
    Pair(Box<Node>, Box<Node>),
}

impl Node {
    fn contains(&self, group: usize) -> bool {
        match &self.kind {
            NodeKind::Group(g) => *g == group,
            NodeKind::Pair(left, right) => left.contains(group) || right.contains(group),
        }
    }
}

impl HashChainBuilder {
    /// Create a builder digesting with `algorithm`.
    #[must_use]
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            groups: Vec::new(),
        }
    }

    /// Add a group of `(uri, digest)` inputs. Digests must be computed with
    /// the builder's algorithm.
    pub fn add_group<I, S>(&mut self, parts: I) -> &mut Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        self.groups
            .push(parts.into_iter().map(|(uri, d)| (uri.into(), d)).collect());
        self
    }

    /// Build the result and the per-group chains. Every chain is meant to be
    /// served as `chain_file`; the result points at its `STEP0`.
    pub fn build(&self, chain_file: &str) -> Result<BuiltHashChain, TrustError> {
        if self.groups.is_empty() {
            return Err(TrustError::malformed_hash_chain("no inputs to hash"));
        }
        for (i, group) in self.groups.iter().enumerate() {
            if group.is_empty() {
                return Err(TrustError::malformed_hash_chain(format!("input group {i} is empty")));
            }
            if let Some((uri, _)) = group
                .iter()
                .find(|(_, d)| d.len() != self.algorithm.output_len())
            {
                return Err(TrustError::malformed_hash_chain(format!(
                    "digest of {uri} does not fit {:?}",
                    self.algorithm
                )));
            }
        }

        let root = self.tree();
        let top = match &root.kind {
            NodeKind::Pair(left, right) => digest_list(&[self.value(left), self.value(right)]),
            NodeKind::Group(g) => digest_list(&self.part_digests(*g)),
        };
        let result = HashChainResult {
            digest: DigestValue::compute(self.algorithm, &top),
            uri: format!("{chain_file}#STEP0"),
        };

        let chains = (0..self.groups.len())
            .map(|group| HashChain {
                default_algorithm: self.algorithm,
                steps: self.steps_for(&root, group),
            })
            .collect();

        Ok(BuiltHashChain { result, chains })
    }

    fn part_digests(&self, group: usize) -> Vec<DigestValue> {
        self.groups[group]
            .iter()
            .map(|(_, d)| DigestValue::new(self.algorithm, d.clone()))
            .collect()
    }

    fn value(&self, node: &Node) -> DigestValue {
        DigestValue::new(self.algorithm, node.digest.clone())
    }

    fn tree(&self) -> Node {
        let mut level: Vec<Node> = (0..self.groups.len())
            .map(|g| {
                let digest = match self.groups[g].as_slice() {
                    [(_, single)] => single.clone(),
                    _ => digest(self.algorithm, &digest_list(&self.part_digests(g))),
                };
                Node {
                    digest,
                    kind: NodeKind::Group(g),
                }
            })
            .collect();

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut nodes = level.into_iter();
            while let Some(left) = nodes.next() {
                match nodes.next() {
                    Some(right) => {
                        let pair = digest_list(&[self.value(&left), self.value(&right)]);
                        next.push(Node {
                            digest: digest(self.algorithm, &pair),
                            kind: NodeKind::Pair(Box::new(left), Box::new(right)),
                        });
                    },
                    // Odd node out moves up unchanged.
                    None => next.push(left),
                }
            }
            level = next;
        }
        // `groups` is non-empty, so one node remains.
        level.pop().unwrap_or(Node {
            digest: Vec::new(),
            kind: NodeKind::Group(0),
        })
    }

    fn data_refs(&self, group: usize) -> Vec<StepValue> {
        self.groups[group]
            .iter()
            .map(|(uri, d)| StepValue::DataRef {
                uri: uri.clone(),
                transforms: Vec::new(),
                algorithm: None,
                digest: d.clone(),
            })
            .collect()
    }

    /// Steps from the root down to `group`'s leaf.
    fn steps_for(&self, root: &Node, group: usize) -> Vec<HashStep> {
        let mut steps = Vec::new();
        let mut node = root;
        loop {
            let id = format!("STEP{}", steps.len());
            let next_ref = format!("#STEP{}", steps.len() + 1);
            let NodeKind::Pair(left, right) = &node.kind else {
                steps.push(HashStep {
                    id,
                    values: self.data_refs(group),
                });
                return steps;
            };

            let mut values = Vec::with_capacity(2);
            let mut descend = None;
            for child in [left.as_ref(), right.as_ref()] {
                if !child.contains(group) {
                    values.push(StepValue::HashValue {
                        algorithm: None,
                        digest: child.digest.clone(),
                    });
                } else if matches!(child.kind, NodeKind::Group(_)) && self.groups[group].len() == 1 {
                    values.extend(self.data_refs(group));
                } else {
                    values.push(StepValue::StepRef {
                        uri: next_ref.clone(),
                        algorithm: None,
                        digest: Some(child.digest.clone()),
                    });
                    descend = Some(child);
                }
            }
            steps.push(HashStep { id, values });

            match descend {
                Some(child) => node = child,
                None => return steps,
            }
        }
    }
}
