//! Stage 4: foreign-key scoring.
//!
//! Every IND gets four similarity scores and four composite probabilities:
//! weighted syntactic name similarity, distribution similarity
//! (Bhattacharyya over 20 buckets), IRIS similarity (syntactic-or-semantic
//! per token) and the weighted hybrid variant. The global token frequency
//! table is fully built before any per-IND score is computed.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::analyze::buckets::cumulative_to_probabilities;
use crate::analyze::{
    bhattacharyya, edit_ratio, numeric_buckets, split_tokens, weighted_similarity, LexicalOracle,
    TokenWeights, NUM_BUCKETS,
};
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::model::{AttributeId, FkScores, Uac, UacId, ValueType};
use crate::staging::QueryInterface;

use super::CancelToken;

/// Scores every IND against its parent UAC.
pub struct FkScorer<'a, S: QueryInterface> {
    staging: &'a mut S,
    oracle: &'a dyn LexicalOracle,
    cancel: &'a CancelToken,
}

impl<'a, S: QueryInterface> FkScorer<'a, S> {
    pub fn new(staging: &'a mut S, oracle: &'a dyn LexicalOracle, cancel: &'a CancelToken) -> Self {
        FkScorer {
            staging,
            oracle,
            cancel,
        }
    }

    pub fn run(&mut self) -> DiscoveryResult<()> {
        let weights = self.build_token_weights()?;
        let uacs: HashMap<UacId, Uac> =
            self.staging.uacs().into_iter().map(|u| (u.id, u)).collect();

        for ind in self.staging.inds() {
            self.cancel.checkpoint()?;
            let uac = uacs.get(&ind.uac_id).ok_or_else(|| {
                DiscoveryError::Internal(format!("IND {} references unknown UAC {}", ind.id, ind.uac_id))
            })?;
            let parents = &uac.attribute_ids;
            let children = &ind.child_attribute_ids;
            if parents.len() != children.len() {
                return Err(DiscoveryError::Internal(format!(
                    "IND {} has mismatched attribute sequences ({} vs {})",
                    ind.id,
                    parents.len(),
                    children.len()
                )));
            }
            let count = parents.len() as f64;

            let staging: &S = self.staging;

            // Weighted syntactic similarity over name + datastorage tokens.
            let mut name_weighted_similarity = 0.0;
            for (&parent, &child) in parents.iter().zip(children.iter()) {
                let parent_tokens = Self::name_and_storage_tokens(staging, parent)?;
                let child_tokens = Self::name_and_storage_tokens(staging, child)?;
                name_weighted_similarity +=
                    weighted_similarity(&parent_tokens, &child_tokens, &weights);
            }
            name_weighted_similarity /= count;

            // Distribution similarity.
            let mut distribution_similarity = 0.0;
            for (&parent, &child) in parents.iter().zip(children.iter()) {
                distribution_similarity += Self::position_distribution(staging, parent, child)?;
            }
            distribution_similarity /= count;

            // IRIS similarity: attribute-name tokens only, unweighted.
            let mut iris_similarity = 0.0;
            for (&parent, &child) in parents.iter().zip(children.iter()) {
                let parent_tokens = split_tokens(&staging.attribute(parent)?.name);
                let child_tokens = split_tokens(&staging.attribute(child)?.name);
                if parent_tokens.is_empty() {
                    continue;
                }
                let mut parent_result = 0.0;
                for parent_token in &parent_tokens {
                    parent_result += self.token_best(parent_token, &child_tokens);
                }
                iris_similarity += parent_result / parent_tokens.len() as f64;
            }
            iris_similarity /= count;

            // Hybrid similarity: same token decision, datastorage tokens
            // included, weight-normalized.
            let mut hybrid_similarity = 0.0;
            for (&parent, &child) in parents.iter().zip(children.iter()) {
                let parent_tokens = Self::name_and_storage_tokens(staging, parent)?;
                let child_tokens = Self::name_and_storage_tokens(staging, child)?;
                let mut sum_scores = 0.0;
                let mut sum_weights = 0.0;
                for parent_token in &parent_tokens {
                    let best = self.token_best(parent_token, &child_tokens);
                    let weight = weights.weight(parent_token);
                    sum_scores += best * weight;
                    sum_weights += weight;
                }
                if sum_weights > 0.0 {
                    hybrid_similarity += sum_scores / sum_weights;
                }
            }
            hybrid_similarity /= count;

            let scores = FkScores {
                name_weighted_similarity,
                distribution_similarity,
                iris_similarity,
                hybrid_similarity,
                hopf_probability: (distribution_similarity + name_weighted_similarity) / 2.0,
                iris_probability: iris_similarity,
                hybrid_only_name_probability: hybrid_similarity,
                hybrid_probability: (distribution_similarity + hybrid_similarity) / 2.0,
            };
            debug!(ind = ind.id, ?scores, "foreign key scores");
            self.staging.set_fk_scores(ind.id, scores)?;
        }
        Ok(())
    }

    /// Global token frequency table over every attribute name plus its
    /// datastorage's name (counted once per attribute), turned into
    /// inverse-frequency weights.
    fn build_token_weights(&self) -> DiscoveryResult<TokenWeights> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for server in self.staging.servers() {
            for database in self.staging.databases(server) {
                for datastorage in self.staging.datastorages(database) {
                    let storage_name = self.staging.datastorage(datastorage)?.name;
                    for attribute in self.staging.attributes(datastorage) {
                        let name = self.staging.attribute(attribute)?.name;
                        for token in split_tokens(&name) {
                            *counts.entry(token).or_insert(0) += 1;
                        }
                        for token in split_tokens(&storage_name) {
                            *counts.entry(token).or_insert(0) += 1;
                        }
                    }
                }
            }
        }
        Ok(TokenWeights::from_counts(&counts))
    }

    fn name_and_storage_tokens(staging: &S, attribute: AttributeId) -> DiscoveryResult<Vec<String>> {
        let record = staging.attribute(attribute)?;
        let mut tokens = split_tokens(&record.name);
        let storage = staging.datastorage(record.datastorage_id)?;
        tokens.extend(split_tokens(&storage.name));
        Ok(tokens)
    }

    /// Best match for one parent token: the syntactic edit ratio when it
    /// reaches 0.5, otherwise the lexical-oracle similarity when that
    /// reaches 0.7, otherwise back to the syntactic ratio.
    fn token_best(&self, parent_token: &str, child_tokens: &[String]) -> f64 {
        let max_syn = child_tokens
            .iter()
            .map(|child| edit_ratio(parent_token, child))
            .fold(0.0, f64::max);
        if max_syn >= 0.5 {
            return max_syn;
        }
        let max_sem = child_tokens
            .iter()
            .filter_map(|child| self.oracle.synset_similarity(parent_token, child))
            .map(|similarity| similarity / 100.0)
            .fold(0.0, f64::max);
        if max_sem >= 0.7 {
            max_sem
        } else {
            max_syn
        }
    }

    /// Distribution similarity for one positional pair.
    ///
    /// Integer-only parents (or int/float) use equal-width buckets over the
    /// parent's domain, both sides computed on distinct value sets. Other
    /// types use 19 parent quantile boundaries with cumulative `count_le`
    /// differencing, each side normalized by its own cell count.
    fn position_distribution(
        staging: &S,
        parent: AttributeId,
        child: AttributeId,
    ) -> DiscoveryResult<f64> {
        let parent_types = staging.attribute_types(parent)?;
        let int_only = parent_types.iter().all(|t| *t == ValueType::Int);
        let numeric_only = parent_types.iter().all(ValueType::is_numeric);

        if int_only || numeric_only {
            let parent_values =
                Self::distinct_numeric(&staging.distinct_values(parent)?, int_only);
            if parent_values.is_empty() {
                return Ok(0.0);
            }
            let minimum = parent_values[0];
            let maximum = parent_values[parent_values.len() - 1];
            let child_values = Self::distinct_numeric(&staging.distinct_values(child)?, int_only);
            let parent_buckets = numeric_buckets(&parent_values, minimum, maximum, NUM_BUCKETS);
            let child_buckets = numeric_buckets(&child_values, minimum, maximum, NUM_BUCKETS);
            return Ok(bhattacharyya(&parent_buckets, &child_buckets));
        }

        let parent_count = staging.cell_count(parent)? as f64;
        let child_count = staging.cell_count(child)? as f64;
        if parent_count == 0.0 || child_count == 0.0 {
            return Ok(0.0);
        }
        let steps = parent_count / NUM_BUCKETS as f64;
        let mut parent_cumulative = vec![0.0; NUM_BUCKETS];
        let mut child_cumulative = vec![0.0; NUM_BUCKETS];
        for i in 1..NUM_BUCKETS {
            let mut offset = (steps * i as f64).round() as u64;
            if offset >= parent_count as u64 {
                // Rounding can overshoot the population.
                offset = parent_count as u64 - 1;
            }
            let boundary = staging
                .value_at_sorted_position(parent, offset)?
                .ok_or_else(|| {
                    DiscoveryError::Internal(format!(
                        "no value at sorted position {offset} for attribute {parent}"
                    ))
                })?;
            parent_cumulative[i - 1] = staging.count_le(parent, &boundary)? as f64;
            child_cumulative[i - 1] = staging.count_le(child, &boundary)? as f64;
        }
        parent_cumulative[NUM_BUCKETS - 1] = parent_count;
        child_cumulative[NUM_BUCKETS - 1] = child_count;
        let parent_buckets = cumulative_to_probabilities(parent_cumulative, parent_count);
        let child_buckets = cumulative_to_probabilities(child_cumulative, child_count);
        Ok(bhattacharyya(&parent_buckets, &child_buckets))
    }

    /// Distinct numeric values, ascending. `as_int` parses integers only,
    /// matching the integer-typed bucket path; values that fail to parse
    /// are skipped.
    fn distinct_numeric(values: &BTreeSet<String>, as_int: bool) -> Vec<f64> {
        let mut parsed: Vec<f64> = values
            .iter()
            .filter_map(|v| {
                if as_int {
                    v.parse::<i64>().ok().map(|n| n as f64)
                } else {
                    v.parse::<f64>().ok()
                }
            })
            .collect();
        parsed.sort_by(f64::total_cmp);
        parsed.dedup();
        parsed
    }
}
