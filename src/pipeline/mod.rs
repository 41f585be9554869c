//! The five-stage discovery pipeline.
//!
//! Stages run strictly sequentially; each consumes the immutable output of
//! the previous one and materializes its results in the staging store before
//! the next begins:
//!
//! ```text
//! staged attributes
//!     |
//! [UAC Finder]    -> unique attribute combinations
//!     |
//! [IND Finder]    -> inclusion dependencies (+ optional maximal INDs)
//!     |
//! [PK Scorer]     -> per-UAC score components + plateau categories
//!     |
//! [FK Scorer]     -> per-IND similarities + composite probabilities
//!     |
//! [Selector]      -> primary keys, explicit / implicit references
//! ```
//!
//! A run is cancellable between stages and between outer loop iterations
//! within a stage; cancellation aborts the run and leaves partial staging
//! state for the next run's purge.

pub mod fk;
pub mod ind;
pub mod pk;
pub mod select;
pub mod uac;

pub use fk::FkScorer;
pub use ind::IndFinder;
pub use pk::PkScorer;
pub use select::Selector;
pub use uac::UacFinder;

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::analyze::LexicalOracle;
use crate::config::Config;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::staging::QueryInterface;

/// Cooperative cancellation flag shared between a run and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; honored at the next checkpoint.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Abort the run if cancellation was requested.
    pub fn checkpoint(&self) -> DiscoveryResult<()> {
        if self.is_cancelled() {
            Err(DiscoveryError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Wall-clock seconds per pipeline stage, reported alongside the results.
#[derive(Debug, Clone, Default)]
pub struct RuntimeMetrics {
    entries: BTreeMap<String, f64>,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: &str, started: Instant) {
        self.entries
            .insert(stage.to_string(), started.elapsed().as_secs_f64());
    }

    pub fn into_map(self) -> BTreeMap<String, f64> {
        self.entries
    }
}

/// Run the five analytic stages over a frozen staged snapshot.
pub fn run_stages<S: QueryInterface>(
    staging: &mut S,
    config: &Config,
    oracle: &dyn LexicalOracle,
    cancel: &CancelToken,
    metrics: &mut RuntimeMetrics,
) -> DiscoveryResult<()> {
    let discovery = &config.discovery;

    cancel.checkpoint()?;
    let started = Instant::now();
    UacFinder::new(staging, discovery.max_uac_attributes, cancel).run()?;
    metrics.record("time_find_uacs", started);
    info!("UAC enumeration finished");

    cancel.checkpoint()?;
    let started = Instant::now();
    IndFinder::new(staging, &discovery.inclusion_dependencies, cancel).run()?;
    metrics.record("time_find_inds", started);
    info!("IND search finished");

    cancel.checkpoint()?;
    let started = Instant::now();
    PkScorer::new(staging, &discovery.primary_keys, cancel).run()?;
    metrics.record("time_score_primarykeys", started);
    info!("primary key scoring finished");

    cancel.checkpoint()?;
    let started = Instant::now();
    FkScorer::new(staging, oracle, cancel).run()?;
    metrics.record("time_score_foreignkeys", started);
    info!("foreign key scoring finished");

    cancel.checkpoint()?;
    let started = Instant::now();
    Selector::new(staging, &discovery.metrics).run()?;
    metrics.record("time_select_references", started);
    info!("result selection finished");

    Ok(())
}

/// All size-`k` combinations of `items`, in lexicographic order over the
/// input order.
pub(crate) fn combinations<T: Clone>(items: &[T], k: usize) -> Vec<Vec<T>> {
    let mut result = Vec::new();
    if k == 0 || k > items.len() {
        return result;
    }
    let mut indexes: Vec<usize> = (0..k).collect();
    loop {
        result.push(indexes.iter().map(|&i| items[i].clone()).collect());
        // Advance to the next combination.
        let mut i = k;
        loop {
            if i == 0 {
                return result;
            }
            i -= 1;
            if indexes[i] != i + items.len() - k {
                break;
            }
        }
        indexes[i] += 1;
        for j in i + 1..k {
            indexes[j] = indexes[j - 1] + 1;
        }
    }
}

/// Cartesian product over the given lists.
pub(crate) fn cartesian_product<T: Clone>(lists: &[Vec<T>]) -> Vec<Vec<T>> {
    let mut result: Vec<Vec<T>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(result.len() * list.len());
        for prefix in &result {
            for item in list {
                let mut tuple = prefix.clone();
                tuple.push(item.clone());
                next.push(tuple);
            }
        }
        result = next;
    }
    result
}

pub(crate) fn has_duplicates<T: std::hash::Hash + Eq>(items: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(items.len());
    items.iter().any(|item| !seen.insert(item))
}

/// True iff all elements of `sub` occur in `main` in the same order,
/// allowing gaps.
pub(crate) fn is_subsequence<T: PartialEq>(sub: &[T], main: &[T]) -> bool {
    let mut main_iter = main.iter();
    sub.iter().all(|s| main_iter.any(|m| m == s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combinations_lexicographic() {
        let combos = combinations(&[1, 2, 3], 2);
        assert_eq!(combos, vec![vec![1, 2], vec![1, 3], vec![2, 3]]);
        assert_eq!(combinations(&[1, 2], 3), Vec::<Vec<i32>>::new());
        assert_eq!(combinations(&[1, 2, 3], 3), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_cartesian_product() {
        let product = cartesian_product(&[vec![1, 2], vec![3], vec![4, 5]]);
        assert_eq!(product.len(), 4);
        assert!(product.contains(&vec![1, 3, 4]));
        assert!(product.contains(&vec![2, 3, 5]));
    }

    #[test]
    fn test_has_duplicates() {
        assert!(has_duplicates(&[1, 2, 1]));
        assert!(!has_duplicates(&[1, 2, 3]));
    }

    #[test]
    fn test_is_subsequence() {
        assert!(is_subsequence(&[1, 3], &[1, 2, 3]));
        assert!(!is_subsequence(&[3, 1], &[1, 2, 3]));
        assert!(is_subsequence(&[] as &[i32], &[1]));
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(token.checkpoint().is_ok());
        token.cancel();
        assert!(matches!(
            token.checkpoint(),
            Err(DiscoveryError::Cancelled)
        ));
    }
}
