//! Stage 5: result selection.

use std::collections::HashMap;

use tracing::debug;

use crate::analyze::moving_average_plateau;
use crate::config::{FkMetric, MetricsConfig, PkMetric};
use crate::error::DiscoveryResult;
use crate::model::{Ind, Uac, UacId};
use crate::staging::QueryInterface;

/// Applies the configured metrics: UACs classified at least plateau-level
/// become primary keys; INDs above the moving-average probability threshold
/// become explicit references when their parent UAC is a primary key,
/// implicit references otherwise.
pub struct Selector<'a, S: QueryInterface> {
    staging: &'a mut S,
    metrics: &'a MetricsConfig,
}

impl<'a, S: QueryInterface> Selector<'a, S> {
    pub fn new(staging: &'a mut S, metrics: &'a MetricsConfig) -> Self {
        Selector { staging, metrics }
    }

    pub fn run(&mut self) -> DiscoveryResult<()> {
        let uacs = self.staging.uacs();
        let categories: HashMap<UacId, u8> = uacs
            .iter()
            .map(|uac| (uac.id, self.pk_category(uac)))
            .collect();

        for uac in &uacs {
            if categories[&uac.id] >= 1 {
                self.staging.add_primary_key(uac.id);
            }
        }

        let inds = self.staging.inds();
        if inds.is_empty() {
            return Ok(());
        }
        let probabilities: Vec<f64> = inds.iter().map(|ind| self.fk_probability(ind)).collect();
        let threshold = moving_average_plateau(&probabilities);
        debug!(threshold, "reference selection threshold");

        for (ind, probability) in inds.iter().zip(probabilities.iter()) {
            if *probability < threshold {
                continue;
            }
            if categories.get(&ind.uac_id).copied().unwrap_or(0) >= 1 {
                self.staging.add_explicit_reference(ind.uac_id, ind.id);
            } else {
                self.staging.add_implicit_reference(ind.uac_id, ind.id);
            }
        }
        Ok(())
    }

    fn pk_category(&self, uac: &Uac) -> u8 {
        let categories = uac.pk_categories.unwrap_or_default();
        match self.metrics.pk_metric {
            PkMetric::Hopf => categories.hopf,
            PkMetric::Iris => categories.iris,
        }
    }

    fn fk_probability(&self, ind: &Ind) -> f64 {
        let scores = ind.fk_scores.unwrap_or_default();
        match self.metrics.fk_metric {
            FkMetric::Hopf => scores.hopf_probability,
            FkMetric::Iris => scores.iris_probability,
            FkMetric::HybridOnlyName => scores.hybrid_only_name_probability,
            FkMetric::Hybrid => scores.hybrid_probability,
        }
    }
}
