//! Stage 1: enumeration of unique attribute combinations.

use tracing::debug;

use crate::error::DiscoveryResult;
use crate::model::{AttributeId, DatabaseId, DatastorageId, ServerId};
use crate::staging::QueryInterface;

use super::{combinations, CancelToken};

/// Finds, per datastorage, the minimal attribute combinations whose joint
/// projection is unique over all entries.
///
/// Minimality is enforced by elimination: every attribute of an accepted
/// combination is withdrawn before the next combination size, so no strict
/// superset of a found combination is ever enumerated through those
/// attributes.
pub struct UacFinder<'a, S: QueryInterface> {
    staging: &'a mut S,
    max_uac_attributes: usize,
    cancel: &'a CancelToken,
}

impl<'a, S: QueryInterface> UacFinder<'a, S> {
    pub fn new(staging: &'a mut S, max_uac_attributes: usize, cancel: &'a CancelToken) -> Self {
        UacFinder {
            staging,
            max_uac_attributes,
            cancel,
        }
    }

    /// Search every datastorage in the staged snapshot.
    pub fn run(&mut self) -> DiscoveryResult<()> {
        for server in self.staging.servers() {
            for database in self.staging.databases(server) {
                for datastorage in self.staging.datastorages(database) {
                    self.cancel.checkpoint()?;
                    let attributes = self.staging.attributes(datastorage);
                    self.find_uacs(server, database, datastorage, attributes)?;
                }
            }
        }
        Ok(())
    }

    fn find_uacs(
        &mut self,
        server: ServerId,
        database: DatabaseId,
        datastorage: DatastorageId,
        mut attributes: Vec<AttributeId>,
    ) -> DiscoveryResult<()> {
        // Empty population: nothing to enumerate, not an error.
        let Some(number_of_entries) = self.staging.max_entry_no(&attributes)? else {
            return Ok(());
        };

        // Array-valued attributes cannot form unique combinations over
        // entries; drop them first.
        let mut kept = Vec::with_capacity(attributes.len());
        for attribute in attributes.drain(..) {
            if !self.staging.is_array(attribute)? {
                kept.push(attribute);
            }
        }

        // Drop incomplete columns: attributes missing a value on some entry.
        let mut candidates = Vec::with_capacity(kept.len());
        for attribute in kept {
            if self.staging.cell_count(attribute)? == number_of_entries {
                candidates.push(attribute);
            }
        }

        let mut combination_size = 1;
        while !candidates.is_empty() && combination_size <= self.max_uac_attributes {
            let mut covered: Vec<AttributeId> = Vec::new();
            for combination in combinations(&candidates, combination_size) {
                let unique_entries = self.staging.distinct_joint_count(&combination)?;
                if unique_entries == number_of_entries {
                    debug!(
                        datastorage,
                        attributes = ?combination,
                        "unique attribute combination found"
                    );
                    for &attribute in &combination {
                        if !covered.contains(&attribute) {
                            covered.push(attribute);
                        }
                    }
                    self.staging
                        .add_uac(server, database, datastorage, combination);
                }
            }
            candidates.retain(|a| !covered.contains(a));
            combination_size += 1;
        }
        Ok(())
    }
}
