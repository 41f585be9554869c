//! Shared analysis algorithms used by the scoring stages.
//!
//! - `token`: name splitting, inverse-frequency weighting, and the greedy
//!   weighted syntactic similarity.
//! - `plateau`: the Z-score plateau detector (with cliff fallback) and the
//!   moving-average selector. These are intentionally different algorithms;
//!   the first classifies primary-key scores, the second thresholds
//!   reference probabilities.
//! - `buckets`: histogram construction and the Bhattacharyya coefficient.
//! - `lexical`: the pluggable WordNet-style similarity oracle.

pub mod buckets;
pub mod lexical;
pub mod plateau;
pub mod token;

pub use buckets::{bhattacharyya, numeric_buckets, NUM_BUCKETS};
pub use lexical::{LexicalOracle, NullOracle, TableOracle};
pub use plateau::{moving_average_plateau, zscore_plateau};
pub use token::{edit_ratio, split_tokens, weighted_similarity, TokenWeights};
