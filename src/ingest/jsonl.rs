//! Document-store connector over JSON-lines files.
//!
//! The URI path names a directory; the directory name becomes the database,
//! every `*.jsonl` file inside becomes a collection (datastorage), and every
//! line holds one JSON document. Nested objects become child datastorages
//! linked through `parent_id`; arrays fan out into one cell per element;
//! `{"$oid": ...}` and `{"$ref": ..., "$id": ...}` shapes are recognized as
//! ObjectId and DBRef values.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::Value as Json;

use crate::model::{DatabaseId, DatastorageId, ServerKind, ValueType};

use super::{Connector, IngestError, StagingSink};

pub struct JsonlConnector {
    root: PathBuf,
}

impl JsonlConnector {
    pub fn new(path: &str) -> Self {
        JsonlConnector {
            root: PathBuf::from(path),
        }
    }

    fn database_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default".to_string())
    }
}

impl Connector for JsonlConnector {
    fn kind(&self) -> ServerKind {
        ServerKind::Document
    }

    fn load(&self, sink: &mut StagingSink<'_>) -> Result<(), IngestError> {
        if !self.root.is_dir() {
            return Err(IngestError::Unreachable(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        let database = sink.database(&self.database_name());

        let mut files: Vec<PathBuf> = fs::read_dir(&self.root)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();
        files.sort();

        for file in files {
            let collection = file
                .file_stem()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let datastorage = sink.datastorage(database, &collection, None);
            load_collection(sink, database, datastorage, &collection, &file)?;
        }
        sink.finish();
        Ok(())
    }
}

fn load_collection(
    sink: &mut StagingSink<'_>,
    database: DatabaseId,
    datastorage: DatastorageId,
    collection: &str,
    file: &Path,
) -> Result<(), IngestError> {
    let reader = BufReader::new(fs::File::open(file)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let document: Json = serde_json::from_str(&line)?;
        let Json::Object(fields) = document else {
            return Err(IngestError::Parse(format!(
                "expected a JSON object per line in {}",
                file.display()
            )));
        };
        let entry_no = sink.next_entry(datastorage);
        let mut position = 1u32;
        for (field, value) in &fields {
            load_field(
                sink,
                database,
                datastorage,
                collection,
                field,
                value,
                entry_no,
                position,
            );
            position += 1;
        }
    }
    Ok(())
}

/// Stage one document field. Arrays produce one cell per element at the
/// same entry and position; nested objects become entries of a child
/// datastorage named `<collection>.<field>`.
fn load_field(
    sink: &mut StagingSink<'_>,
    database: DatabaseId,
    datastorage: DatastorageId,
    collection: &str,
    field: &str,
    value: &Json,
    entry_no: u64,
    position: u32,
) {
    match value {
        Json::Null => {}
        Json::Array(elements) => {
            for element in elements {
                load_field(
                    sink,
                    database,
                    datastorage,
                    collection,
                    field,
                    element,
                    entry_no,
                    position,
                );
            }
        }
        Json::Object(object) => {
            if let Some((text, value_type)) = reference_shape(object) {
                let attribute = sink.attribute(datastorage, field);
                sink.add_value(attribute, entry_no, position, &text, value_type);
                return;
            }
            // Embedded sub-document: a first-class child datastorage.
            let child_name = format!("{collection}.{field}");
            let child = sink.datastorage(database, &child_name, Some(datastorage));
            let child_entry = sink.next_entry(child);
            let mut child_position = 1u32;
            for (child_field, child_value) in object {
                load_field(
                    sink,
                    database,
                    child,
                    &child_name,
                    child_field,
                    child_value,
                    child_entry,
                    child_position,
                );
                child_position += 1;
            }
        }
        scalar => {
            let (text, value_type) = scalar_value(scalar);
            let attribute = sink.attribute(datastorage, field);
            sink.add_value(attribute, entry_no, position, &text, value_type);
        }
    }
}

/// Recognize MongoDB extended-JSON identifier shapes.
fn reference_shape(object: &serde_json::Map<String, Json>) -> Option<(String, ValueType)> {
    if let Some(Json::String(oid)) = object.get("$oid") {
        return Some((oid.clone(), ValueType::ObjectId));
    }
    if object.contains_key("$ref") {
        if let Some(id) = object.get("$id") {
            let (text, _) = scalar_value(id);
            return Some((text, ValueType::DbRef));
        }
    }
    None
}

fn scalar_value(value: &Json) -> (String, ValueType) {
    match value {
        Json::Bool(b) => (b.to_string(), ValueType::Bool),
        Json::Number(n) => {
            if n.is_i64() || n.is_u64() {
                (n.to_string(), ValueType::Int)
            } else {
                (n.to_string(), ValueType::Float)
            }
        }
        Json::String(s) => (s.clone(), ValueType::Str),
        other => (other.to_string(), ValueType::Str),
    }
}
