//! Stage 3: primary-key scoring and classification.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::analyze::zscore_plateau;
use crate::config::PrimaryKeyConfig;
use crate::error::DiscoveryResult;
use crate::model::{DatastorageId, PkCategories, PkScores, Uac, UacId, ValueType};
use crate::staging::QueryInterface;

use super::CancelToken;

/// Computes the five primary-key score components for every UAC, then
/// classifies each UAC per score family against its datastorage: 2 for the
/// best score, 1 for scores on the plateau, 0 otherwise.
pub struct PkScorer<'a, S: QueryInterface> {
    staging: &'a mut S,
    config: &'a PrimaryKeyConfig,
    cancel: &'a CancelToken,
}

impl<'a, S: QueryInterface> PkScorer<'a, S> {
    pub fn new(staging: &'a mut S, config: &'a PrimaryKeyConfig, cancel: &'a CancelToken) -> Self {
        PkScorer {
            staging,
            config,
            cancel,
        }
    }

    pub fn run(&mut self) -> DiscoveryResult<()> {
        let uacs = self.staging.uacs();

        // Component computation is independent per UAC.
        let staging: &S = self.staging;
        let config = self.config;
        let cancel = self.cancel;
        let scored: Vec<(UacId, PkScores)> = uacs
            .par_iter()
            .map(|uac| -> DiscoveryResult<(UacId, PkScores)> {
                cancel.checkpoint()?;
                Ok((uac.id, Self::score(staging, config, uac)?))
            })
            .collect::<DiscoveryResult<_>>()?;
        for (uac, scores) in &scored {
            self.staging.set_pk_scores(*uac, *scores)?;
        }

        self.classify()?;
        Ok(())
    }

    fn score(staging: &S, config: &PrimaryKeyConfig, uac: &Uac) -> DiscoveryResult<PkScores> {
        let attributes = &uac.attribute_ids;
        let count = attributes.len() as f64;

        // Cardinality: fewer columns score higher.
        let cardinality = 1.0 / count;

        // Value length: short values score higher; the component decays
        // once the average maximum length exceeds the configured bound.
        let mut length_sum = 0.0;
        for &attribute in attributes {
            length_sum += f64::from(staging.max_value_length(attribute)?);
        }
        let average = length_sum / count - f64::from(config.max_value_length);
        let mut value_length = 1.0 / average.max(1.0);

        // Position: rewards leading, contiguous placement. Positions are
        // per-cell averages, so the gap may dip below zero when arrays are
        // involved; clamp it.
        let mut positions = Vec::with_capacity(attributes.len());
        for &attribute in attributes {
            positions.push(staging.average_position(attribute)?);
        }
        let first_position = positions.iter().copied().fold(f64::INFINITY, f64::min);
        let last_position = positions.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let gap = (last_position - first_position - (count - 1.0)).max(0.0);
        let position = (1.0 / first_position + 1.0 / (gap + 1.0)) / 2.0;

        // Name suffix: fraction of members with a key-like name ending.
        let mut suffix_hits = 0usize;
        for &attribute in attributes {
            let name = staging.attribute(attribute)?.name.to_lowercase();
            if config.name_suffix.iter().any(|s| name.ends_with(s)) {
                suffix_hits += 1;
            }
        }
        let name_suffix = suffix_hits as f64 / count;

        // Datatype: every member must be homogeneous in one accepted type
        // family. Identifier families override the value-length component.
        let mut datatype = 1.0;
        for &attribute in attributes {
            let types = staging.attribute_types(attribute)?;
            let homogeneous = |t: ValueType| types.iter().all(|x| *x == t);
            if homogeneous(ValueType::Int) || homogeneous(ValueType::Str) {
                continue;
            }
            if homogeneous(ValueType::ElementId)
                || homogeneous(ValueType::DbRef)
                || homogeneous(ValueType::ObjectId)
            {
                value_length = 1.0;
                continue;
            }
            datatype = 0.0;
            break;
        }

        Ok(PkScores {
            cardinality,
            value_length,
            position,
            name_suffix,
            datatype,
        })
    }

    /// Per-datastorage, per-family classification against the maximum score
    /// and the Z-score plateau end.
    fn classify(&mut self) -> DiscoveryResult<()> {
        let uacs = self.staging.uacs();
        let mut by_datastorage: HashMap<DatastorageId, Vec<&Uac>> = HashMap::new();
        for uac in &uacs {
            by_datastorage.entry(uac.datastorage_id).or_default().push(uac);
        }

        let mut categories: Vec<(UacId, PkCategories)> = Vec::with_capacity(uacs.len());
        for group in by_datastorage.values() {
            let hopf_scores: Vec<f64> = group
                .iter()
                .map(|u| u.pk_scores.unwrap_or_default().hopf_total())
                .collect();
            let iris_scores: Vec<f64> = group
                .iter()
                .map(|u| u.pk_scores.unwrap_or_default().iris_total())
                .collect();
            let hopf_max = hopf_scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let iris_max = iris_scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let hopf_plateau = zscore_plateau(&hopf_scores);
            let iris_plateau = zscore_plateau(&iris_scores);

            for (uac, (hopf, iris)) in group
                .iter()
                .zip(hopf_scores.iter().zip(iris_scores.iter()))
            {
                let classify = |score: f64, max: f64, plateau: f64| -> u8 {
                    if score == max {
                        2
                    } else if score >= plateau {
                        1
                    } else {
                        0
                    }
                };
                categories.push((
                    uac.id,
                    PkCategories {
                        hopf: classify(*hopf, hopf_max, hopf_plateau),
                        iris: classify(*iris, iris_max, iris_plateau),
                    },
                ));
            }
        }

        for (uac, category) in categories {
            self.staging.set_pk_categories(uac, category)?;
        }
        Ok(())
    }
}
