//! Stage 2: inclusion dependency search.
//!
//! Unary candidates come from a set-containment scan; n-ary candidates are
//! synthesized per UAC from the Cartesian product of each member's unary
//! child lists, then filtered by alignment checks, a randomized sampling
//! pre-test and, in exact mode, a full containment verification. The
//! sampling pre-test and the exact test are distinct operations with the
//! same signature; configuration decides whether the second runs.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::debug;

use crate::config::IndConfig;
use crate::error::DiscoveryResult;
use crate::model::{AttributeId, DatabaseId, DatastorageId, MaxInd, ServerId};
use crate::staging::{QueryInterface, StagingResult};

use super::{cartesian_product, combinations, has_duplicates, is_subsequence, CancelToken};

/// Attribute metadata loaded once per run.
#[derive(Debug, Clone)]
struct AttrMeta {
    id: AttributeId,
    server_id: ServerId,
    database_id: DatabaseId,
    datastorage_id: DatastorageId,
    is_array: bool,
    min: Option<String>,
    max: Option<String>,
}

/// Finds inclusion dependencies keyed to UACs and, optionally, maximal INDs
/// across all attributes.
pub struct IndFinder<'a, S: QueryInterface> {
    staging: &'a mut S,
    config: &'a IndConfig,
    cancel: &'a CancelToken,
    rng: StdRng,
}

impl<'a, S: QueryInterface> IndFinder<'a, S> {
    pub fn new(staging: &'a mut S, config: &'a IndConfig, cancel: &'a CancelToken) -> Self {
        IndFinder {
            staging,
            config,
            cancel,
            rng: StdRng::from_entropy(),
        }
    }

    /// Pin the sampling RNG, for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn run(&mut self) -> DiscoveryResult<()> {
        let metas = self.load_attribute_meta()?;
        let index: HashMap<AttributeId, usize> =
            metas.iter().enumerate().map(|(i, m)| (m.id, i)).collect();
        let uacs = self.staging.uacs();

        // In maximal mode every attribute is a potential parent; otherwise
        // only UAC members are.
        let parents: Vec<AttributeId> = if self.config.find_max_ind {
            metas.iter().map(|m| m.id).collect()
        } else {
            let mut seen = HashSet::new();
            let mut members = Vec::new();
            for uac in &uacs {
                for &attribute in &uac.attribute_ids {
                    if seen.insert(attribute) {
                        members.push(attribute);
                    }
                }
            }
            members
        };

        let unary = Self::unary_children(&*self.staging, &parents, &metas, &index)?;

        // Keyed synthesis: INDs aligned to each UAC.
        for uac in &uacs {
            self.cancel.checkpoint()?;
            let members = &uac.attribute_ids;

            if members.len() == 1 {
                let Some(children) = unary.get(&members[0]) else {
                    continue;
                };
                for &child in children {
                    let meta = &metas[index[&child]];
                    self.staging.add_ind(
                        uac.id,
                        meta.server_id,
                        meta.database_id,
                        meta.datastorage_id,
                        vec![child],
                    );
                }
                continue;
            }

            // Gather per-member child lists, arrays excluded. A member
            // without children rules the whole UAC out.
            let mut lists: Vec<Vec<AttributeId>> = Vec::with_capacity(members.len());
            let mut complete = true;
            for member in members {
                let children: Vec<AttributeId> = unary
                    .get(member)
                    .map(|c| {
                        c.iter()
                            .copied()
                            .filter(|child| !metas[index[child]].is_array)
                            .collect()
                    })
                    .unwrap_or_default();
                if children.is_empty() {
                    complete = false;
                    break;
                }
                lists.push(children);
            }
            if !complete {
                continue;
            }

            let mut candidates: Vec<Vec<AttributeId>> = cartesian_product(&lists)
                .into_iter()
                .filter(|candidate| !has_duplicates(candidate))
                .filter(|candidate| Self::same_datastorage(candidate, &metas, &index))
                .collect();
            let mut aligned = Vec::with_capacity(candidates.len());
            for candidate in candidates.drain(..) {
                if self.staging.entries_complete(&candidate)? {
                    aligned.push(candidate);
                }
            }

            for candidate in aligned {
                if !self.sampled_containment(members, &candidate)? {
                    continue;
                }
                if self.config.exact_verification()
                    && !self.staging.nary_contained(members, &candidate)?
                {
                    continue;
                }
                debug!(uac = uac.id, child = ?candidate, "inclusion dependency found");
                let meta = &metas[index[&candidate[0]]];
                self.staging.add_ind(
                    uac.id,
                    meta.server_id,
                    meta.database_id,
                    meta.datastorage_id,
                    candidate,
                );
            }
        }

        if self.config.find_max_ind {
            self.find_max_inds(&metas, &index, unary)?;
        }
        Ok(())
    }

    /// Unary containment scan: for every parent, the child attributes in
    /// other datastorages whose distinct value set it contains. Cheap
    /// min/max guards run before the decisive subset test. Parents probe
    /// independently, so the scan fans out across threads.
    fn unary_children(
        staging: &S,
        parents: &[AttributeId],
        metas: &[AttrMeta],
        index: &HashMap<AttributeId, usize>,
    ) -> DiscoveryResult<HashMap<AttributeId, Vec<AttributeId>>> {
        let pairs: Vec<(AttributeId, Vec<AttributeId>)> = parents
            .par_iter()
            .map(|&parent| -> StagingResult<(AttributeId, Vec<AttributeId>)> {
                let parent_datastorage = metas[index[&parent]].datastorage_id;
                let parent_values = staging.distinct_values(parent)?;
                let mut children = Vec::new();
                for child in metas {
                    if child.datastorage_id == parent_datastorage {
                        continue;
                    }
                    let (Some(child_min), Some(child_max)) = (&child.min, &child.max) else {
                        continue;
                    };
                    if !parent_values.contains(child_min) || !parent_values.contains(child_max) {
                        continue;
                    }
                    let child_values = staging.distinct_values(child.id)?;
                    if child_values.is_subset(&parent_values) {
                        children.push(child.id);
                    }
                }
                Ok((parent, children))
            })
            .collect::<StagingResult<_>>()?;
        Ok(pairs.into_iter().collect())
    }

    /// Heuristic acceptance: for a handful of sampled child entries, some
    /// parent entry must simultaneously carry every child value at matching
    /// positions. A superset filter by construction - it never rejects a
    /// true IND beyond sample coverage, but may accept a false one.
    fn sampled_containment(
        &mut self,
        parents: &[AttributeId],
        children: &[AttributeId],
    ) -> StagingResult<bool> {
        let staging: &S = self.staging;
        let entries = staging.entry_nos(children[0])?;
        let take = self.config.num_samples().min(entries.len());
        let sample: Vec<u64> = entries
            .choose_multiple(&mut self.rng, take)
            .copied()
            .collect();

        for entry_no in sample {
            let mut common: Option<HashSet<u64>> = None;
            for (&parent, &child) in parents.iter().zip(children.iter()) {
                let matched: HashSet<u64> = staging
                    .parent_entries_matching(parent, child, entry_no)?
                    .into_iter()
                    .collect();
                common = Some(match common {
                    None => matched,
                    Some(previous) => previous.intersection(&matched).copied().collect(),
                });
                if common.as_ref().is_some_and(HashSet::is_empty) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Maximal-IND search, independent of UACs. Candidate parent sets are
    /// enumerated by descending size per datastorage; a candidate subsumed
    /// by an already accepted IND (subsequence on both sides) is skipped.
    fn find_max_inds(
        &mut self,
        metas: &[AttrMeta],
        index: &HashMap<AttributeId, usize>,
        mut unary: HashMap<AttributeId, Vec<AttributeId>>,
    ) -> DiscoveryResult<()> {
        // Candidates touching an array on either side degrade to unary
        // maximal INDs and leave the combination pool.
        for meta in metas {
            let Some(children) = unary.get_mut(&meta.id) else {
                continue;
            };
            if meta.is_array {
                for child in std::mem::take(children) {
                    let child_meta = &metas[index[&child]];
                    Self::write_max_ind(self.staging, meta, vec![meta.id], child_meta, vec![child]);
                }
            } else {
                let mut kept = Vec::with_capacity(children.len());
                for child in std::mem::take(children) {
                    let child_meta = &metas[index[&child]];
                    if child_meta.is_array {
                        Self::write_max_ind(
                            self.staging,
                            meta,
                            vec![meta.id],
                            child_meta,
                            vec![child],
                        );
                    } else {
                        kept.push(child);
                    }
                }
                *children = kept;
            }
        }

        // Datastorages in staged enumeration order.
        let mut datastorages: Vec<DatastorageId> = Vec::new();
        for meta in metas {
            if !datastorages.contains(&meta.datastorage_id) {
                datastorages.push(meta.datastorage_id);
            }
        }

        let mut accepted: Vec<(Vec<AttributeId>, Vec<AttributeId>)> = Vec::new();
        for datastorage in datastorages {
            self.cancel.checkpoint()?;
            let parent_attrs: Vec<AttributeId> = metas
                .iter()
                .filter(|m| m.datastorage_id == datastorage)
                .filter(|m| unary.get(&m.id).is_some_and(|c| !c.is_empty()))
                .map(|m| m.id)
                .collect();
            if parent_attrs.is_empty() {
                continue;
            }

            for size in (1..=parent_attrs.len()).rev() {
                for parent_combo in combinations(&parent_attrs, size) {
                    let lists: Vec<Vec<AttributeId>> = parent_combo
                        .iter()
                        .map(|parent| unary[parent].clone())
                        .collect();
                    for child_combo in cartesian_product(&lists) {
                        if has_duplicates(&child_combo) {
                            continue;
                        }
                        if !Self::same_datastorage(&child_combo, metas, index) {
                            continue;
                        }
                        if !self.staging.entries_complete(&child_combo)? {
                            continue;
                        }
                        let subsumed = accepted.iter().any(|(ap, ac)| {
                            is_subsequence(&parent_combo, ap) && is_subsequence(&child_combo, ac)
                        });
                        if subsumed {
                            continue;
                        }
                        if !self.sampled_containment(&parent_combo, &child_combo)? {
                            continue;
                        }
                        if self.config.exact_verification()
                            && !self.staging.nary_contained(&parent_combo, &child_combo)?
                        {
                            continue;
                        }
                        accepted.push((parent_combo.clone(), child_combo));
                    }
                }
            }
        }

        for (parent_ids, child_ids) in accepted {
            let parent_meta = &metas[index[&parent_ids[0]]];
            let child_meta = &metas[index[&child_ids[0]]];
            Self::write_max_ind(self.staging, parent_meta, parent_ids, child_meta, child_ids);
        }
        Ok(())
    }

    fn write_max_ind(
        staging: &mut S,
        parent: &AttrMeta,
        parent_ids: Vec<AttributeId>,
        child: &AttrMeta,
        child_ids: Vec<AttributeId>,
    ) {
        staging.add_max_ind(MaxInd {
            id: 0,
            parent_server_id: parent.server_id,
            parent_database_id: parent.database_id,
            parent_datastorage_id: parent.datastorage_id,
            parent_attribute_ids: parent_ids,
            child_server_id: child.server_id,
            child_database_id: child.database_id,
            child_datastorage_id: child.datastorage_id,
            child_attribute_ids: child_ids,
        });
    }

    fn same_datastorage(
        candidate: &[AttributeId],
        metas: &[AttrMeta],
        index: &HashMap<AttributeId, usize>,
    ) -> bool {
        let first = metas[index[&candidate[0]]].datastorage_id;
        candidate
            .iter()
            .all(|id| metas[index[id]].datastorage_id == first)
    }

    fn load_attribute_meta(&self) -> DiscoveryResult<Vec<AttrMeta>> {
        let mut metas = Vec::new();
        for server in self.staging.servers() {
            for database in self.staging.databases(server) {
                for datastorage in self.staging.datastorages(database) {
                    for attribute in self.staging.attributes(datastorage) {
                        metas.push(AttrMeta {
                            id: attribute,
                            server_id: server,
                            database_id: database,
                            datastorage_id: datastorage,
                            is_array: self.staging.is_array(attribute)?,
                            min: self.staging.attribute_min(attribute)?,
                            max: self.staging.attribute_max(attribute)?,
                        });
                    }
                }
            }
        }
        Ok(metas)
    }
}
