//! Staging Store
//!
//! All staged entities and values live behind the [`QueryInterface`] trait;
//! no pipeline stage touches storage directly. The trait is the single
//! capability set the five discovery stages need: stable enumeration, typed
//! per-attribute lookups, value-set containment probes, and result writing.
//!
//! # Backing schema contract
//!
//! A relational backend implements the interface over these tables, with
//! cascading deletes from `servers` downward and a composite index on
//! `(attribute_id, entry_no, value_type, length, value)` in `values` for
//! containment-probe performance:
//!
//! ```text
//! servers(id, server_type, host, port)
//! databases(id, db_name, server_id)
//! datastorages(id, storage_name, db_id, parent_id)
//! attributes(id, attribute_name, datastorage_id)
//! values(attribute_id, entry_no, value, value_type, length, position)
//! unique_attributecombinations(id, ..., attributes, pk scores, pk categories)
//! inclusion_dependencies(id, UAC_id, child ids, attributes, fk scores)
//! max_inclusion_dependencies(id, parent side, child side)
//! primarykeys(id, UAC_id)
//! explicit_references(id, UAC_id, IND_id)
//! implicit_references(id, UAC_id, IND_id)
//! ```
//!
//! The crate ships [`MemoryStaging`], an in-memory column store satisfying
//! the same contract: the sorted per-attribute value index stands in for the
//! composite index, and the run-opening purge stands in for the cascade.
//!
//! All read operations are deterministic given a frozen staged snapshot.

pub mod error;
pub mod memory;

pub use error::{StagingError, StagingResult};
pub use memory::MemoryStaging;

use std::collections::BTreeSet;

use crate::model::{
    Attribute, AttributeId, Database, DatabaseId, Datastorage, DatastorageId, FkScores, Ind,
    IndId, MaxInd, MaxIndId, PkCategories, PkScores, Server, ServerId, ServerKind, Uac, UacId,
    ValueCell, ValueType,
};

/// Abstraction over the staging store.
///
/// Reads take `&self` so stages may fan out order-independent probes across
/// threads; writes take `&mut self`, which serializes them per run and keeps
/// id allocation monotonic and race-free.
pub trait QueryInterface: Send + Sync {
    // ------------------------------------------------------------------
    // Enumeration (stable order)
    // ------------------------------------------------------------------

    fn servers(&self) -> Vec<ServerId>;
    fn databases(&self, server: ServerId) -> Vec<DatabaseId>;
    fn datastorages(&self, database: DatabaseId) -> Vec<DatastorageId>;
    fn attributes(&self, datastorage: DatastorageId) -> Vec<AttributeId>;

    // ------------------------------------------------------------------
    // Entity metadata
    // ------------------------------------------------------------------

    fn server(&self, id: ServerId) -> StagingResult<Server>;
    fn database(&self, id: DatabaseId) -> StagingResult<Database>;
    fn datastorage(&self, id: DatastorageId) -> StagingResult<Datastorage>;
    fn attribute(&self, id: AttributeId) -> StagingResult<Attribute>;

    /// Distinct value types observed on the attribute, in a stable order.
    fn attribute_types(&self, id: AttributeId) -> StagingResult<Vec<ValueType>>;

    /// Smallest staged value: numeric when every cell is numeric,
    /// lexicographic otherwise. `None` when no values are staged.
    fn attribute_min(&self, id: AttributeId) -> StagingResult<Option<String>>;

    /// Largest staged value, same comparison rules as [`Self::attribute_min`].
    fn attribute_max(&self, id: AttributeId) -> StagingResult<Option<String>>;

    /// Number of staged cells.
    fn cell_count(&self, id: AttributeId) -> StagingResult<u64>;

    /// Mean of the `position` field over all cells.
    fn average_position(&self, id: AttributeId) -> StagingResult<f64>;

    /// Largest `length` over all cells.
    fn max_value_length(&self, id: AttributeId) -> StagingResult<u32>;

    /// True iff some entry holds more than one cell for this attribute.
    /// Derived once at ingest finalization and cached on the attribute.
    fn is_array(&self, id: AttributeId) -> StagingResult<bool>;

    // ------------------------------------------------------------------
    // Value probes
    // ------------------------------------------------------------------

    /// All staged cells of the attribute, in ingest order.
    fn cells(&self, id: AttributeId) -> StagingResult<Vec<ValueCell>>;

    /// True iff `value` occurs among the attribute's staged values.
    fn value_exists(&self, id: AttributeId, value: &str) -> StagingResult<bool>;

    /// Distinct value set of the attribute.
    fn distinct_values(&self, id: AttributeId) -> StagingResult<BTreeSet<String>>;

    /// Entry numbers carrying at least one cell, ascending, one per entry.
    fn entry_nos(&self, id: AttributeId) -> StagingResult<Vec<u64>>;

    /// Largest entry number over all listed attributes, `None` when no
    /// values are staged on any of them.
    fn max_entry_no(&self, ids: &[AttributeId]) -> StagingResult<Option<u64>>;

    /// Number of distinct joint tuples over aligned entry numbers.
    fn distinct_joint_count(&self, ids: &[AttributeId]) -> StagingResult<u64>;

    /// True iff every entry number present on any listed attribute is
    /// present on all of them.
    fn entries_complete(&self, ids: &[AttributeId]) -> StagingResult<bool>;

    /// Exact n-ary containment: for every child tuple (sorted distinct
    /// values per entry number over `children`), an equal parent tuple
    /// exists over `parents`.
    fn nary_contained(
        &self,
        parents: &[AttributeId],
        children: &[AttributeId],
    ) -> StagingResult<bool>;

    /// Entry numbers of `parent` whose value equals the child's value at
    /// `child_entry_no`. Empty when the child has no cell there.
    fn parent_entries_matching(
        &self,
        parent: AttributeId,
        child: AttributeId,
        child_entry_no: u64,
    ) -> StagingResult<Vec<u64>>;

    /// The k-th value (0-based) in the attribute's sorted value list,
    /// duplicates included.
    fn value_at_sorted_position(&self, id: AttributeId, k: u64) -> StagingResult<Option<String>>;

    /// Number of cells whose value is lexicographically `<= value`.
    fn count_le(&self, id: AttributeId, value: &str) -> StagingResult<u64>;

    // ------------------------------------------------------------------
    // Ingest writes
    // ------------------------------------------------------------------

    fn add_server(&mut self, kind: ServerKind, host: &str, port: u16) -> ServerId;
    fn add_database(&mut self, name: &str, server: ServerId) -> DatabaseId;
    fn add_datastorage(
        &mut self,
        name: &str,
        database: DatabaseId,
        parent: Option<DatastorageId>,
    ) -> DatastorageId;
    fn add_attribute(&mut self, name: &str, datastorage: DatastorageId) -> AttributeId;

    /// Queue one value cell; cells become visible after [`Self::flush_values`].
    fn add_value(&mut self, cell: ValueCell);

    /// Make queued cells visible. Called by the ingest sink at batch
    /// boundaries and once at end of ingest.
    fn flush_values(&mut self);

    /// Freeze the snapshot: flush pending cells, build value indexes and
    /// the per-attribute `is_array` cache.
    fn finalize_ingest(&mut self);

    // ------------------------------------------------------------------
    // Result writes
    // ------------------------------------------------------------------

    fn add_uac(
        &mut self,
        server: ServerId,
        database: DatabaseId,
        datastorage: DatastorageId,
        attribute_ids: Vec<AttributeId>,
    ) -> UacId;
    fn uacs(&self) -> Vec<Uac>;
    fn set_pk_scores(&mut self, uac: UacId, scores: PkScores) -> StagingResult<()>;
    fn set_pk_categories(&mut self, uac: UacId, categories: PkCategories) -> StagingResult<()>;

    fn add_ind(
        &mut self,
        uac: UacId,
        child_server: ServerId,
        child_database: DatabaseId,
        child_datastorage: DatastorageId,
        child_attribute_ids: Vec<AttributeId>,
    ) -> IndId;
    fn inds(&self) -> Vec<Ind>;
    fn set_fk_scores(&mut self, ind: IndId, scores: FkScores) -> StagingResult<()>;

    fn add_max_ind(&mut self, max_ind: MaxInd) -> MaxIndId;
    fn max_inds(&self) -> Vec<MaxInd>;

    fn add_primary_key(&mut self, uac: UacId);
    fn primary_keys(&self) -> Vec<UacId>;

    fn add_explicit_reference(&mut self, uac: UacId, ind: IndId);
    fn add_implicit_reference(&mut self, uac: UacId, ind: IndId);
    fn explicit_references(&self) -> Vec<(UacId, IndId)>;
    fn implicit_references(&self) -> Vec<(UacId, IndId)>;

    /// Drop every entity. A run begins here; partial state from a cancelled
    /// run is discarded by the next run's purge.
    fn purge(&mut self);
}
