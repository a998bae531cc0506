//! A fixed family of seeded 64-bit hash functions.

use rand_xoshiro::rand_core::{RngCore, SeedableRng};

/// A fixed, deterministic family of seeded 64-bit hash functions.
///
/// All functions are derived from a single seed at construction and never
/// change afterwards. Reconstructing a family with the same `(len, seed)`
/// reproduces identical functions, so signatures computed against it remain
/// valid across persistence boundaries.
///
/// Each function rehashes its 64-bit input with an independent sub-seed
/// instead of applying an independent permutation of a token universe. This
/// derives all values from cheap mixing of one input hash, trading a little
/// independence purity for speed.
#[derive(Clone)]
pub struct HashFamily {
    seeds: Vec<u64>,
}

impl HashFamily {
    /// Creates a family of `len` functions derived from `seed`.
    pub fn new(len: usize, seed: u64) -> Self {
        let mut seeder = rand_xoshiro::SplitMix64::seed_from_u64(seed);
        let seeds = (0..len).map(|_| seeder.next_u64()).collect();
        Self { seeds }
    }

    /// Applies the `i`-th function to `x`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[inline(always)]
    pub fn hash(&self, i: usize, x: u64) -> u64 {
        crate::hash_u64(x, self.seeds[i])
    }

    /// Gets the number of functions in the family.
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    /// Checks if the family has no functions.
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconstruction_reproduces_functions() {
        let f1 = HashFamily::new(8, 42);
        let f2 = HashFamily::new(8, 42);
        for i in 0..8 {
            for x in [0u64, 1, 42, u64::MAX] {
                assert_eq!(f1.hash(i, x), f2.hash(i, x));
            }
        }
    }

    #[test]
    fn test_functions_differ() {
        let f = HashFamily::new(8, 42);
        // Distinct sub-seeds make collisions across functions vanishingly rare.
        let values: Vec<_> = (0..8).map(|i| f.hash(i, 12345)).collect();
        let mut dedup = values.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(values.len(), dedup.len());
    }

    #[test]
    fn test_seed_changes_functions() {
        let f1 = HashFamily::new(4, 1);
        let f2 = HashFamily::new(4, 2);
        assert_ne!(f1.hash(0, 12345), f2.hash(0, 12345));
    }
}
