//! Near-duplicate document detection with MinHash signatures and LSH
//! banding.
//!
//! Documents are shingled into token sets, sketched into fixed-length
//! MinHash signatures, and indexed by splitting each signature into bands
//! bucketed per band. Querying unions the matching buckets and ranks the
//! candidates by estimated Jaccard similarity, replacing the quadratic
//! all-pairs comparison with sub-quadratic candidate retrieval.
//!
//! # Examples
//!
//! ```
//! use neardup::{Engine, EngineConfig, ShingleMode};
//!
//! let config = EngineConfig {
//!     num_bands: 16,
//!     rows_per_band: 4,
//!     window: 1,
//!     mode: ShingleMode::Words,
//!     seed: Some(42),
//!     ..EngineConfig::default()
//! };
//! let mut engine = Engine::new(config).unwrap();
//! engine.insert(0, "who was the first king of england").unwrap();
//! engine.insert(1, "who was the last pharaoh of egypt").unwrap();
//!
//! let hits = engine.query("who was the first king of england", 0.99).unwrap();
//! assert_eq!(hits, vec![(0, 1.0)]);
//! ```
#![deny(missing_docs)]

pub mod engine;
pub mod errors;
pub mod index;
pub mod shingle;

mod serialize;

pub use engine::{CancelFlag, Engine, EngineConfig};
pub use errors::EngineError;
pub use index::{candidate_probability, optimize_bands, BandingIndex};
pub use shingle::{ShingleConfig, ShingleMode, Shingler};

/// Document identifier supplied by the caller.
pub type DocId = u64;
