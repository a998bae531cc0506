//! MinHash signature generation and signature comparison.

use crate::hash_family::HashFamily;

/// Computes MinHash signatures over token sets using a fixed [`HashFamily`].
///
/// The hasher is immutable after construction and safe to share across
/// threads for concurrent signature computation.
pub struct MinHasher {
    family: HashFamily,
}

impl MinHasher {
    /// Creates a hasher whose `len` hash functions are derived from `seed`.
    pub fn new(len: usize, seed: u64) -> Self {
        Self {
            family: HashFamily::new(len, seed),
        }
    }

    /// Wraps an existing hash family.
    pub const fn with_family(family: HashFamily) -> Self {
        Self { family }
    }

    /// Gets the length of produced signatures.
    pub fn signature_len(&self) -> usize {
        self.family.len()
    }

    /// Gets the underlying hash family.
    pub const fn family(&self) -> &HashFamily {
        &self.family
    }

    /// Computes the signature of a token set, or `None` if the set is empty.
    ///
    /// Component `i` is the minimum of the `i`-th hash function over all
    /// tokens. For two token sets with Jaccard similarity `J`, each component
    /// pair matches with probability `J`, making the fraction of matching
    /// components an unbiased estimator of `J`.
    pub fn signature(&self, tokens: &[u64]) -> Option<Vec<u64>> {
        if tokens.is_empty() {
            return None;
        }
        let mut sig = Vec::with_capacity(self.family.len());
        for i in 0..self.family.len() {
            let min = tokens.iter().map(|&t| self.family.hash(i, t)).min().unwrap();
            sig.push(min);
        }
        Some(sig)
    }
}

/// Computes the fraction of components at which two signatures agree.
///
/// # Panics
///
/// Panics if the signatures have different lengths.
pub fn estimated_jaccard(lhs: &[u64], rhs: &[u64]) -> f64 {
    assert_eq!(lhs.len(), rhs.len());
    if lhs.is_empty() {
        return 1.;
    }
    let matched = lhs.iter().zip(rhs.iter()).filter(|(x, y)| x == y).count();
    matched as f64 / lhs.len() as f64
}
