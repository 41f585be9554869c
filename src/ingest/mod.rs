//! Source ingestion.
//!
//! A source is a `{uri, user, password}` tuple; the URI scheme selects the
//! connector. Connectors never touch the staging store directly - every
//! write goes through the [`StagingSink`], which owns entity upserts, entry
//! and position numbering, value truncation, and batched cell flushing.
//!
//! Network connectors for live stores plug in through the same [`Connector`]
//! trait; the crate ships file-based connectors for the document
//! (`jsonl://`) and relational (`csvfile://`) shapes, which also back the
//! integration tests.

pub mod csv_file;
pub mod jsonl;

pub use csv_file::CsvFileConnector;
pub use jsonl::JsonlConnector;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::{
    AttributeId, DatabaseId, DatastorageId, ServerId, ServerKind, ValueCell, ValueType,
    LONG_STRING, MAX_VALUE_CHARS,
};
use crate::staging::QueryInterface;

/// Queued value cells are flushed to the staging store in bursts this size.
pub const VALUE_BATCH_SIZE: usize = 10_000;

/// One source to ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub uri: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

/// Connector-level errors. The run coordinator downgrades these to a logged
/// warning and skips the source.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("malformed source URI '{0}'")]
    BadUri(String),

    #[error("unsupported URI scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::Parse(e.to_string())
    }
}

/// A source connector: reads one store and replays its records into the sink.
pub trait Connector {
    fn kind(&self) -> ServerKind;
    fn load(&self, sink: &mut StagingSink<'_>) -> Result<(), IngestError>;
}

/// Resolve a source spec to a connector by URI scheme.
pub fn connector_for(spec: &SourceSpec) -> Result<Box<dyn Connector>, IngestError> {
    let (scheme, rest) = spec
        .uri
        .split_once("://")
        .ok_or_else(|| IngestError::BadUri(spec.uri.clone()))?;
    match scheme {
        "jsonl" => Ok(Box::new(JsonlConnector::new(rest))),
        "csvfile" => Ok(Box::new(CsvFileConnector::new(rest))),
        other => Err(IngestError::UnsupportedScheme(other.to_string())),
    }
}

/// Mediates all staging writes during ingest.
///
/// Entities are upserted by name, entry numbers are assigned per
/// datastorage, and values are truncated and queued for batched flushing.
pub struct StagingSink<'a> {
    staging: &'a mut dyn QueryInterface,
    server_id: ServerId,
    databases: HashMap<String, DatabaseId>,
    datastorages: HashMap<(DatabaseId, String), DatastorageId>,
    attributes: HashMap<(DatastorageId, String), AttributeId>,
    entry_counters: HashMap<DatastorageId, u64>,
    queued: usize,
}

impl<'a> StagingSink<'a> {
    /// Register the source's server and open a sink for it.
    pub fn new(
        staging: &'a mut dyn QueryInterface,
        kind: ServerKind,
        host: &str,
        port: u16,
    ) -> Self {
        let server_id = staging.add_server(kind, host, port);
        StagingSink {
            staging,
            server_id,
            databases: HashMap::new(),
            datastorages: HashMap::new(),
            attributes: HashMap::new(),
            entry_counters: HashMap::new(),
            queued: 0,
        }
    }

    pub fn database(&mut self, name: &str) -> DatabaseId {
        if let Some(&id) = self.databases.get(name) {
            return id;
        }
        let id = self.staging.add_database(name, self.server_id);
        self.databases.insert(name.to_string(), id);
        id
    }

    pub fn datastorage(
        &mut self,
        database: DatabaseId,
        name: &str,
        parent: Option<DatastorageId>,
    ) -> DatastorageId {
        let key = (database, name.to_string());
        if let Some(&id) = self.datastorages.get(&key) {
            return id;
        }
        let id = self.staging.add_datastorage(name, database, parent);
        self.datastorages.insert(key, id);
        id
    }

    pub fn attribute(&mut self, datastorage: DatastorageId, name: &str) -> AttributeId {
        let key = (datastorage, name.to_string());
        if let Some(&id) = self.attributes.get(&key) {
            return id;
        }
        let id = self.staging.add_attribute(name, datastorage);
        self.attributes.insert(key, id);
        id
    }

    /// Allocate the next entry number for a datastorage (1-based).
    pub fn next_entry(&mut self, datastorage: DatastorageId) -> u64 {
        let counter = self.entry_counters.entry(datastorage).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Queue one value cell. Over-long values are replaced by the
    /// `longString` placeholder while keeping their true length.
    pub fn add_value(
        &mut self,
        attribute: AttributeId,
        entry_no: u64,
        position: u32,
        value: &str,
        value_type: ValueType,
    ) {
        let length = value.chars().count();
        let stored = if length > MAX_VALUE_CHARS {
            LONG_STRING.to_string()
        } else {
            value.to_string()
        };
        self.staging.add_value(ValueCell {
            attribute_id: attribute,
            entry_no,
            value: stored,
            value_type,
            length: length as u32,
            position,
        });
        self.queued += 1;
        if self.queued >= VALUE_BATCH_SIZE {
            self.staging.flush_values();
            debug!(batch = self.queued, "flushed staged value batch");
            self.queued = 0;
        }
    }

    /// Flush any queued cells. Called once per source at end of load.
    pub fn finish(&mut self) {
        self.staging.flush_values();
        self.queued = 0;
    }
}
