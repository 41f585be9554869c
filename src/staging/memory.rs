//! In-memory staging backend.
//!
//! Column-store layout: one [`AttributeStore`] per attribute holding the raw
//! cells plus three indexes built when the snapshot is frozen - cells grouped
//! by entry number, the sorted value list (positional lookups and `count_le`),
//! and a value-to-entries map (existence and match probes). Ids are allocated
//! monotonically per entity kind, starting at 1.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::model::{
    Attribute, AttributeId, Database, DatabaseId, Datastorage, DatastorageId, FkScores, Ind,
    IndId, MaxInd, MaxIndId, PkCategories, PkScores, Server, ServerId, ServerKind, Uac, UacId,
    ValueCell, ValueType,
};

use super::{QueryInterface, StagingError, StagingResult};

/// Per-attribute cell storage and derived indexes.
#[derive(Debug, Default)]
struct AttributeStore {
    cells: Vec<ValueCell>,
    /// entry_no -> indexes into `cells`
    by_entry: BTreeMap<u64, Vec<usize>>,
    /// all cell values, sorted, duplicates included
    sorted_values: Vec<String>,
    /// value -> entry numbers carrying it
    value_entries: HashMap<String, Vec<u64>>,
}

impl AttributeStore {
    fn push(&mut self, cell: ValueCell) {
        self.cells.push(cell);
    }

    fn rebuild_indexes(&mut self) {
        self.by_entry.clear();
        self.value_entries.clear();
        for (i, cell) in self.cells.iter().enumerate() {
            self.by_entry.entry(cell.entry_no).or_default().push(i);
            let entries = self.value_entries.entry(cell.value.clone()).or_default();
            if entries.last() != Some(&cell.entry_no) {
                entries.push(cell.entry_no);
            }
        }
        self.sorted_values = self.cells.iter().map(|c| c.value.clone()).collect();
        self.sorted_values.sort();
    }

    fn has_array_entry(&self) -> bool {
        self.by_entry.values().any(|cells| cells.len() > 1)
    }

    fn all_numeric(&self) -> bool {
        !self.cells.is_empty() && self.cells.iter().all(|c| c.value_type.is_numeric())
    }
}

/// In-memory staging store implementing [`QueryInterface`].
#[derive(Debug, Default)]
pub struct MemoryStaging {
    servers: Vec<Server>,
    databases: Vec<Database>,
    datastorages: Vec<Datastorage>,
    attributes: Vec<Attribute>,
    stores: HashMap<AttributeId, AttributeStore>,
    pending: Vec<ValueCell>,
    uacs: Vec<Uac>,
    inds: Vec<Ind>,
    max_inds: Vec<MaxInd>,
    primary_keys: Vec<UacId>,
    explicit_refs: Vec<(UacId, IndId)>,
    implicit_refs: Vec<(UacId, IndId)>,
}

impl MemoryStaging {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self, id: AttributeId) -> StagingResult<&AttributeStore> {
        self.attribute(id)?;
        Ok(self
            .stores
            .get(&id)
            .expect("attribute record without store"))
    }

    /// One joint tuple per entry number: sorted distinct values over the
    /// listed attributes. Mirrors the relational
    /// `GROUP_CONCAT(DISTINCT value) ... GROUP BY entry_no` probe.
    fn joint_tuples(&self, ids: &[AttributeId]) -> StagingResult<HashSet<Vec<String>>> {
        let stores: Vec<&AttributeStore> =
            ids.iter().map(|&id| self.store(id)).collect::<StagingResult<_>>()?;
        let mut entry_union: BTreeSet<u64> = BTreeSet::new();
        for store in &stores {
            entry_union.extend(store.by_entry.keys().copied());
        }
        let mut tuples = HashSet::new();
        for entry in entry_union {
            let mut values: Vec<String> = Vec::new();
            for store in &stores {
                if let Some(cell_idx) = store.by_entry.get(&entry) {
                    for &i in cell_idx {
                        values.push(store.cells[i].value.clone());
                    }
                }
            }
            values.sort();
            values.dedup();
            tuples.insert(values);
        }
        Ok(tuples)
    }
}

impl QueryInterface for MemoryStaging {
    fn servers(&self) -> Vec<ServerId> {
        self.servers.iter().map(|s| s.id).collect()
    }

    fn databases(&self, server: ServerId) -> Vec<DatabaseId> {
        self.databases
            .iter()
            .filter(|d| d.server_id == server)
            .map(|d| d.id)
            .collect()
    }

    fn datastorages(&self, database: DatabaseId) -> Vec<DatastorageId> {
        self.datastorages
            .iter()
            .filter(|d| d.database_id == database)
            .map(|d| d.id)
            .collect()
    }

    fn attributes(&self, datastorage: DatastorageId) -> Vec<AttributeId> {
        self.attributes
            .iter()
            .filter(|a| a.datastorage_id == datastorage)
            .map(|a| a.id)
            .collect()
    }

    fn server(&self, id: ServerId) -> StagingResult<Server> {
        self.servers
            .get(id.wrapping_sub(1) as usize)
            .cloned()
            .ok_or(StagingError::UnknownServer(id))
    }

    fn database(&self, id: DatabaseId) -> StagingResult<Database> {
        self.databases
            .get(id.wrapping_sub(1) as usize)
            .cloned()
            .ok_or(StagingError::UnknownDatabase(id))
    }

    fn datastorage(&self, id: DatastorageId) -> StagingResult<Datastorage> {
        self.datastorages
            .get(id.wrapping_sub(1) as usize)
            .cloned()
            .ok_or(StagingError::UnknownDatastorage(id))
    }

    fn attribute(&self, id: AttributeId) -> StagingResult<Attribute> {
        self.attributes
            .get(id.wrapping_sub(1) as usize)
            .cloned()
            .ok_or(StagingError::UnknownAttribute(id))
    }

    fn attribute_types(&self, id: AttributeId) -> StagingResult<Vec<ValueType>> {
        let store = self.store(id)?;
        let types: BTreeSet<ValueType> = store.cells.iter().map(|c| c.value_type).collect();
        Ok(types.into_iter().collect())
    }

    fn attribute_min(&self, id: AttributeId) -> StagingResult<Option<String>> {
        let store = self.store(id)?;
        if store.cells.is_empty() {
            return Ok(None);
        }
        if store.all_numeric() {
            let min = store
                .cells
                .iter()
                .filter_map(|c| c.value.parse::<f64>().ok().map(|n| (n, &c.value)))
                .min_by(|a, b| a.0.total_cmp(&b.0));
            return Ok(min.map(|(_, v)| v.clone()));
        }
        Ok(store.sorted_values.first().cloned())
    }

    fn attribute_max(&self, id: AttributeId) -> StagingResult<Option<String>> {
        let store = self.store(id)?;
        if store.cells.is_empty() {
            return Ok(None);
        }
        if store.all_numeric() {
            let max = store
                .cells
                .iter()
                .filter_map(|c| c.value.parse::<f64>().ok().map(|n| (n, &c.value)))
                .max_by(|a, b| a.0.total_cmp(&b.0));
            return Ok(max.map(|(_, v)| v.clone()));
        }
        Ok(store.sorted_values.last().cloned())
    }

    fn cell_count(&self, id: AttributeId) -> StagingResult<u64> {
        Ok(self.store(id)?.cells.len() as u64)
    }

    fn average_position(&self, id: AttributeId) -> StagingResult<f64> {
        let store = self.store(id)?;
        if store.cells.is_empty() {
            return Err(StagingError::NoValues(id));
        }
        let sum: u64 = store.cells.iter().map(|c| u64::from(c.position)).sum();
        Ok(sum as f64 / store.cells.len() as f64)
    }

    fn max_value_length(&self, id: AttributeId) -> StagingResult<u32> {
        let store = self.store(id)?;
        store
            .cells
            .iter()
            .map(|c| c.length)
            .max()
            .ok_or(StagingError::NoValues(id))
    }

    fn is_array(&self, id: AttributeId) -> StagingResult<bool> {
        Ok(self.attribute(id)?.is_array)
    }

    fn cells(&self, id: AttributeId) -> StagingResult<Vec<ValueCell>> {
        Ok(self.store(id)?.cells.clone())
    }

    fn value_exists(&self, id: AttributeId, value: &str) -> StagingResult<bool> {
        Ok(self.store(id)?.value_entries.contains_key(value))
    }

    fn distinct_values(&self, id: AttributeId) -> StagingResult<BTreeSet<String>> {
        Ok(self.store(id)?.value_entries.keys().cloned().collect())
    }

    fn entry_nos(&self, id: AttributeId) -> StagingResult<Vec<u64>> {
        Ok(self.store(id)?.by_entry.keys().copied().collect())
    }

    fn max_entry_no(&self, ids: &[AttributeId]) -> StagingResult<Option<u64>> {
        let mut max = None;
        for &id in ids {
            if let Some((&entry, _)) = self.store(id)?.by_entry.last_key_value() {
                max = Some(max.map_or(entry, |m: u64| m.max(entry)));
            }
        }
        Ok(max)
    }

    fn distinct_joint_count(&self, ids: &[AttributeId]) -> StagingResult<u64> {
        let stores: Vec<&AttributeStore> =
            ids.iter().map(|&id| self.store(id)).collect::<StagingResult<_>>()?;
        let mut entry_union: BTreeSet<u64> = BTreeSet::new();
        for store in &stores {
            entry_union.extend(store.by_entry.keys().copied());
        }
        let mut joint: HashSet<Vec<(AttributeId, String)>> = HashSet::new();
        for entry in entry_union {
            let mut tuple: Vec<(AttributeId, String)> = Vec::new();
            for (&id, store) in ids.iter().zip(&stores) {
                if let Some(cell_idx) = store.by_entry.get(&entry) {
                    for &i in cell_idx {
                        tuple.push((id, store.cells[i].value.clone()));
                    }
                }
            }
            joint.insert(tuple);
        }
        Ok(joint.len() as u64)
    }

    fn entries_complete(&self, ids: &[AttributeId]) -> StagingResult<bool> {
        let stores: Vec<&AttributeStore> =
            ids.iter().map(|&id| self.store(id)).collect::<StagingResult<_>>()?;
        let mut entry_union: BTreeSet<u64> = BTreeSet::new();
        for store in &stores {
            entry_union.extend(store.by_entry.keys().copied());
        }
        for entry in entry_union {
            if stores.iter().any(|s| !s.by_entry.contains_key(&entry)) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn nary_contained(
        &self,
        parents: &[AttributeId],
        children: &[AttributeId],
    ) -> StagingResult<bool> {
        let parent_tuples = self.joint_tuples(parents)?;
        let child_tuples = self.joint_tuples(children)?;
        Ok(child_tuples.iter().all(|t| parent_tuples.contains(t)))
    }

    fn parent_entries_matching(
        &self,
        parent: AttributeId,
        child: AttributeId,
        child_entry_no: u64,
    ) -> StagingResult<Vec<u64>> {
        let child_store = self.store(child)?;
        let Some(cell_idx) = child_store.by_entry.get(&child_entry_no) else {
            return Ok(Vec::new());
        };
        let child_value = &child_store.cells[cell_idx[0]].value;
        let parent_store = self.store(parent)?;
        Ok(parent_store
            .value_entries
            .get(child_value)
            .cloned()
            .unwrap_or_default())
    }

    fn value_at_sorted_position(&self, id: AttributeId, k: u64) -> StagingResult<Option<String>> {
        Ok(self.store(id)?.sorted_values.get(k as usize).cloned())
    }

    fn count_le(&self, id: AttributeId, value: &str) -> StagingResult<u64> {
        let sorted = &self.store(id)?.sorted_values;
        Ok(sorted.partition_point(|v| v.as_str() <= value) as u64)
    }

    fn add_server(&mut self, kind: ServerKind, host: &str, port: u16) -> ServerId {
        let id = self.servers.len() as ServerId + 1;
        self.servers.push(Server {
            id,
            kind,
            host: host.to_string(),
            port,
        });
        id
    }

    fn add_database(&mut self, name: &str, server: ServerId) -> DatabaseId {
        let id = self.databases.len() as DatabaseId + 1;
        self.databases.push(Database {
            id,
            name: name.to_string(),
            server_id: server,
        });
        id
    }

    fn add_datastorage(
        &mut self,
        name: &str,
        database: DatabaseId,
        parent: Option<DatastorageId>,
    ) -> DatastorageId {
        let id = self.datastorages.len() as DatastorageId + 1;
        self.datastorages.push(Datastorage {
            id,
            name: name.to_string(),
            database_id: database,
            parent_id: parent,
        });
        id
    }

    fn add_attribute(&mut self, name: &str, datastorage: DatastorageId) -> AttributeId {
        let id = self.attributes.len() as AttributeId + 1;
        self.attributes.push(Attribute {
            id,
            name: name.to_string(),
            datastorage_id: datastorage,
            is_array: false,
        });
        self.stores.insert(id, AttributeStore::default());
        id
    }

    fn add_value(&mut self, cell: ValueCell) {
        self.pending.push(cell);
    }

    fn flush_values(&mut self) {
        for cell in self.pending.drain(..) {
            if let Some(store) = self.stores.get_mut(&cell.attribute_id) {
                store.push(cell);
            }
        }
    }

    fn finalize_ingest(&mut self) {
        self.flush_values();
        for attribute in &mut self.attributes {
            if let Some(store) = self.stores.get_mut(&attribute.id) {
                store.rebuild_indexes();
                attribute.is_array = store.has_array_entry();
            }
        }
    }

    fn add_uac(
        &mut self,
        server: ServerId,
        database: DatabaseId,
        datastorage: DatastorageId,
        attribute_ids: Vec<AttributeId>,
    ) -> UacId {
        let id = self.uacs.len() as UacId + 1;
        self.uacs.push(Uac {
            id,
            server_id: server,
            database_id: database,
            datastorage_id: datastorage,
            attribute_ids,
            pk_scores: None,
            pk_categories: None,
        });
        id
    }

    fn uacs(&self) -> Vec<Uac> {
        self.uacs.clone()
    }

    fn set_pk_scores(&mut self, uac: UacId, scores: PkScores) -> StagingResult<()> {
        let entry = self
            .uacs
            .get_mut(uac.wrapping_sub(1) as usize)
            .ok_or(StagingError::UnknownUac(uac))?;
        entry.pk_scores = Some(scores);
        Ok(())
    }

    fn set_pk_categories(&mut self, uac: UacId, categories: PkCategories) -> StagingResult<()> {
        let entry = self
            .uacs
            .get_mut(uac.wrapping_sub(1) as usize)
            .ok_or(StagingError::UnknownUac(uac))?;
        entry.pk_categories = Some(categories);
        Ok(())
    }

    fn add_ind(
        &mut self,
        uac: UacId,
        child_server: ServerId,
        child_database: DatabaseId,
        child_datastorage: DatastorageId,
        child_attribute_ids: Vec<AttributeId>,
    ) -> IndId {
        let id = self.inds.len() as IndId + 1;
        self.inds.push(Ind {
            id,
            uac_id: uac,
            child_server_id: child_server,
            child_database_id: child_database,
            child_datastorage_id: child_datastorage,
            child_attribute_ids,
            fk_scores: None,
        });
        id
    }

    fn inds(&self) -> Vec<Ind> {
        self.inds.clone()
    }

    fn set_fk_scores(&mut self, ind: IndId, scores: FkScores) -> StagingResult<()> {
        let entry = self
            .inds
            .get_mut(ind.wrapping_sub(1) as usize)
            .ok_or(StagingError::UnknownInd(ind))?;
        entry.fk_scores = Some(scores);
        Ok(())
    }

    fn add_max_ind(&mut self, mut max_ind: MaxInd) -> MaxIndId {
        let id = self.max_inds.len() as MaxIndId + 1;
        max_ind.id = id;
        self.max_inds.push(max_ind);
        id
    }

    fn max_inds(&self) -> Vec<MaxInd> {
        self.max_inds.clone()
    }

    fn add_primary_key(&mut self, uac: UacId) {
        self.primary_keys.push(uac);
    }

    fn primary_keys(&self) -> Vec<UacId> {
        self.primary_keys.clone()
    }

    fn add_explicit_reference(&mut self, uac: UacId, ind: IndId) {
        self.explicit_refs.push((uac, ind));
    }

    fn add_implicit_reference(&mut self, uac: UacId, ind: IndId) {
        self.implicit_refs.push((uac, ind));
    }

    fn explicit_references(&self) -> Vec<(UacId, IndId)> {
        self.explicit_refs.clone()
    }

    fn implicit_references(&self) -> Vec<(UacId, IndId)> {
        self.implicit_refs.clone()
    }

    fn purge(&mut self) {
        self.servers.clear();
        self.databases.clear();
        self.datastorages.clear();
        self.attributes.clear();
        self.stores.clear();
        self.pending.clear();
        self.uacs.clear();
        self.inds.clear();
        self.max_inds.clear();
        self.primary_keys.clear();
        self.explicit_refs.clear();
        self.implicit_refs.clear();
    }
}
