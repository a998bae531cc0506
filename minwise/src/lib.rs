//! Minwise-hashing primitives: a fixed seeded hash family, MinHash signature
//! generation, and Jaccard similarity in both estimated and exact forms.
#![deny(missing_docs)]

pub mod hash_family;
pub mod minhash;

use std::hash::Hash;

use hashbrown::HashSet;
use rand_xoshiro::rand_core::{RngCore, SeedableRng};

pub use hash_family::HashFamily;
pub use minhash::{estimated_jaccard, MinHasher};

/// Generates a hash value.
#[inline(always)]
pub fn hash_u64(x: u64, seed: u64) -> u64 {
    rand_xoshiro::SplitMix64::seed_from_u64(x ^ seed).next_u64()
}

/// Computes the exact Jaccard similarity of two sets.
///
/// Two empty sets are defined to have similarity 1.
///
/// # Examples
///
/// ```
/// use minwise::jaccard_index;
///
/// let x = vec![1, 2, 4];
/// let y = vec![1, 2, 5, 7];
/// assert_eq!(jaccard_index(x, y), 0.4);
/// ```
pub fn jaccard_index<I, T>(lhs: I, rhs: I) -> f64
where
    I: IntoIterator<Item = T>,
    T: Hash + Eq,
{
    let a = HashSet::<T>::from_iter(lhs);
    let b = HashSet::<T>::from_iter(rhs);
    if a.is_empty() && b.is_empty() {
        return 1.;
    }
    (a.intersection(&b).count() as f64) / (a.union(&b).count() as f64)
}
