//! Staged entities shared across the discovery pipeline.
//!
//! Every entity carries an opaque integer id assigned by the staging store at
//! ingest time. Entities are created once and never mutated afterwards, with
//! the single exception of score annotation on UACs and INDs.

use serde::{Deserialize, Serialize};

pub type ServerId = u64;
pub type DatabaseId = u64;
pub type DatastorageId = u64;
pub type AttributeId = u64;
pub type UacId = u64;
pub type IndId = u64;
pub type MaxIndId = u64;

/// Values longer than this are replaced by [`LONG_STRING`] at ingest.
pub const MAX_VALUE_CHARS: usize = 200;

/// Placeholder stored instead of an over-long value. Keeps equality
/// comparisons from matching on truncated prefixes.
pub const LONG_STRING: &str = "longString";

/// Kind tag for a source server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerKind {
    Relational,
    Document,
    Graph,
    WideColumn,
}

impl ServerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Relational => "relational",
            ServerKind::Document => "document",
            ServerKind::Graph => "graph",
            ServerKind::WideColumn => "wide-column",
        }
    }
}

impl std::fmt::Display for ServerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type tag of a single staged value cell.
///
/// The string forms follow the source-side type names that appear in the
/// report (`attribute_types`), so `Str` renders as `"str"`, not `"string"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueType {
    Int,
    Float,
    Str,
    Bool,
    ObjectId,
    DbRef,
    ElementId,
    Null,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "str",
            ValueType::Bool => "bool",
            ValueType::ObjectId => "ObjectId",
            ValueType::DbRef => "DBRef",
            ValueType::ElementId => "elementId",
            ValueType::Null => "null",
        }
    }

    /// Identifier-like types whose value-length score component is forced to 1.
    pub fn is_identifier(&self) -> bool {
        matches!(
            self,
            ValueType::ObjectId | ValueType::DbRef | ValueType::ElementId
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float)
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub id: ServerId,
    pub kind: ServerKind,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Database {
    pub id: DatabaseId,
    pub name: String,
    pub server_id: ServerId,
}

/// A table, collection, graph label, keyspace table, or embedded sub-document
/// container. `parent_id` links nested document structures to their container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datastorage {
    pub id: DatastorageId,
    pub name: String,
    pub database_id: DatabaseId,
    pub parent_id: Option<DatastorageId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub id: AttributeId,
    pub name: String,
    pub datastorage_id: DatastorageId,
    /// Derived once at the end of ingest: true iff some entry holds more
    /// than one cell for this attribute.
    pub is_array: bool,
}

/// A single staged value. `entry_no` groups the cells of one logical record;
/// `position` is the ordinal of the field within its record (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueCell {
    pub attribute_id: AttributeId,
    pub entry_no: u64,
    pub value: String,
    pub value_type: ValueType,
    pub length: u32,
    pub position: u32,
}

/// Primary-key score components, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PkScores {
    pub cardinality: f64,
    pub value_length: f64,
    pub position: f64,
    pub name_suffix: f64,
    pub datatype: f64,
}

impl PkScores {
    /// HoPF family: components 1-4.
    pub fn hopf_total(&self) -> f64 {
        self.cardinality + self.value_length + self.position + self.name_suffix
    }

    /// IRIS family: components 1-5.
    pub fn iris_total(&self) -> f64 {
        self.hopf_total() + self.datatype
    }
}

/// Per-family primary-key classification: 2 = best in datastorage,
/// 1 = on the score plateau, 0 = neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PkCategories {
    pub hopf: u8,
    pub iris: u8,
}

/// A minimal attribute combination whose joint projection is unique over all
/// entries of its datastorage.
#[derive(Debug, Clone, PartialEq)]
pub struct Uac {
    pub id: UacId,
    pub server_id: ServerId,
    pub database_id: DatabaseId,
    pub datastorage_id: DatastorageId,
    pub attribute_ids: Vec<AttributeId>,
    pub pk_scores: Option<PkScores>,
    pub pk_categories: Option<PkCategories>,
}

/// Foreign-key scores and composite probabilities, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FkScores {
    pub name_weighted_similarity: f64,
    pub distribution_similarity: f64,
    pub iris_similarity: f64,
    pub hybrid_similarity: f64,
    pub hopf_probability: f64,
    pub iris_probability: f64,
    pub hybrid_only_name_probability: f64,
    pub hybrid_probability: f64,
}

/// Inclusion dependency keyed to a UAC: every child tuple (positionally
/// paired with the UAC attributes) occurs among the parent tuples.
#[derive(Debug, Clone, PartialEq)]
pub struct Ind {
    pub id: IndId,
    pub uac_id: UacId,
    pub child_server_id: ServerId,
    pub child_database_id: DatabaseId,
    pub child_datastorage_id: DatastorageId,
    pub child_attribute_ids: Vec<AttributeId>,
    pub fk_scores: Option<FkScores>,
}

/// Maximal inclusion dependency between arbitrary attribute sets. Retained
/// only for the final report.
#[derive(Debug, Clone, PartialEq)]
pub struct MaxInd {
    pub id: MaxIndId,
    pub parent_server_id: ServerId,
    pub parent_database_id: DatabaseId,
    pub parent_datastorage_id: DatastorageId,
    pub parent_attribute_ids: Vec<AttributeId>,
    pub child_server_id: ServerId,
    pub child_database_id: DatabaseId,
    pub child_datastorage_id: DatastorageId,
    pub child_attribute_ids: Vec<AttributeId>,
}
