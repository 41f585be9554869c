//! JSON report assembly.
//!
//! Field names follow the established export format, including its
//! historical spellings (`implicite_refences`, `explicite_refences`), so
//! downstream consumers keep working.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{AttributeId, DatastorageId, Ind, Uac};
use crate::staging::{QueryInterface, StagingResult};

/// The full discovery report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_metrics: Option<BTreeMap<String, f64>>,
    pub databases: Vec<DatabaseSchema>,
    pub primarykeys: Vec<PrimaryKeyEntry>,
    pub implicite_refences: Vec<ReferenceEntry>,
    pub explicite_refences: Vec<ReferenceEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximal_inclusion_dependencies: Option<Vec<MaxIndEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub database_name: String,
    pub database_type: String,
    pub datastorages: Vec<DatastorageSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastorageSchema {
    pub datastorage_name: String,
    pub datastorage_embedded_in: Option<String>,
    pub attributes: Vec<AttributeSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub attribute_name: String,
    pub attribute_types: Vec<String>,
    pub number_of_entries: u64,
    pub is_array: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryKeyEntry {
    pub database_type: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub datastorage: String,
    pub attributes: String,
    pub datatypes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub primarykey_database_type: String,
    pub primarykey_host: String,
    pub primarykey_port: u16,
    pub primarykey_database: String,
    pub primarykey_datastorage: String,
    pub primarykey_attributes: String,
    pub foreignkey_database_type: String,
    pub foreignkey_host: String,
    pub foreignkey_port: u16,
    pub foreignkey_database: String,
    pub foreignkey_datastorage: String,
    pub foreignkey_attributes: String,
    pub datatypes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxIndEntry {
    pub parent_server_host: String,
    pub parent_server_port: u16,
    pub parent_server_type: String,
    pub parent_db_name: String,
    pub parent_datastorage_name: String,
    pub parent_attribute_names: String,
    pub child_server_host: String,
    pub child_server_port: u16,
    pub child_server_type: String,
    pub child_db_name: String,
    pub child_datastorage_name: String,
    pub child_attribute_names: String,
}

impl Report {
    /// Assemble the report from the staged results.
    pub fn build<S: QueryInterface>(
        staging: &S,
        runtime_metrics: Option<BTreeMap<String, f64>>,
        include_max_inds: bool,
    ) -> StagingResult<Report> {
        let uacs: BTreeMap<u64, Uac> = staging.uacs().into_iter().map(|u| (u.id, u)).collect();
        let inds: BTreeMap<u64, Ind> = staging.inds().into_iter().map(|i| (i.id, i)).collect();

        let mut report = Report {
            runtime_metrics,
            databases: build_schema(staging)?,
            primarykeys: Vec::new(),
            implicite_refences: Vec::new(),
            explicite_refences: Vec::new(),
            maximal_inclusion_dependencies: None,
        };

        for uac_id in staging.primary_keys() {
            let Some(uac) = uacs.get(&uac_id) else { continue };
            let server = staging.server(uac.server_id)?;
            report.primarykeys.push(PrimaryKeyEntry {
                database_type: server.kind.as_str().to_string(),
                host: server.host.clone(),
                port: server.port,
                database: staging.database(uac.database_id)?.name,
                datastorage: staging.datastorage(uac.datastorage_id)?.name,
                attributes: attribute_names(staging, &uac.attribute_ids)?,
                datatypes: attribute_datatypes(staging, &uac.attribute_ids)?,
            });
        }

        for (uac_id, ind_id) in staging.implicit_references() {
            if let Some(entry) = reference_entry(staging, &uacs, &inds, uac_id, ind_id)? {
                report.implicite_refences.push(entry);
            }
        }
        for (uac_id, ind_id) in staging.explicit_references() {
            if let Some(entry) = reference_entry(staging, &uacs, &inds, uac_id, ind_id)? {
                report.explicite_refences.push(entry);
            }
        }

        if include_max_inds {
            let mut entries = Vec::new();
            for max_ind in staging.max_inds() {
                let parent_server = staging.server(max_ind.parent_server_id)?;
                let child_server = staging.server(max_ind.child_server_id)?;
                entries.push(MaxIndEntry {
                    parent_server_host: parent_server.host.clone(),
                    parent_server_port: parent_server.port,
                    parent_server_type: parent_server.kind.as_str().to_string(),
                    parent_db_name: staging.database(max_ind.parent_database_id)?.name,
                    parent_datastorage_name: staging
                        .datastorage(max_ind.parent_datastorage_id)?
                        .name,
                    parent_attribute_names: attribute_names(
                        staging,
                        &max_ind.parent_attribute_ids,
                    )?,
                    child_server_host: child_server.host.clone(),
                    child_server_port: child_server.port,
                    child_server_type: child_server.kind.as_str().to_string(),
                    child_db_name: staging.database(max_ind.child_database_id)?.name,
                    child_datastorage_name: staging
                        .datastorage(max_ind.child_datastorage_id)?
                        .name,
                    child_attribute_names: attribute_names(staging, &max_ind.child_attribute_ids)?,
                });
            }
            report.maximal_inclusion_dependencies = Some(entries);
        }

        Ok(report)
    }

    /// Serialize to pretty JSON and write to `path`, creating parent
    /// directories as needed.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }
}

fn build_schema<S: QueryInterface>(staging: &S) -> StagingResult<Vec<DatabaseSchema>> {
    let mut databases = Vec::new();
    for server_id in staging.servers() {
        let server = staging.server(server_id)?;
        for database_id in staging.databases(server_id) {
            let database = staging.database(database_id)?;
            let mut datastorages = Vec::new();
            for datastorage_id in staging.datastorages(database_id) {
                let datastorage = staging.datastorage(datastorage_id)?;
                let embedded_in = embedded_in_name(staging, datastorage.parent_id)?;
                let mut attributes = Vec::new();
                for attribute_id in staging.attributes(datastorage_id) {
                    let attribute = staging.attribute(attribute_id)?;
                    attributes.push(AttributeSchema {
                        attribute_name: attribute.name.clone(),
                        attribute_types: staging
                            .attribute_types(attribute_id)?
                            .iter()
                            .map(|t| t.as_str().to_string())
                            .collect(),
                        number_of_entries: staging.cell_count(attribute_id)?,
                        is_array: staging.is_array(attribute_id)?,
                    });
                }
                datastorages.push(DatastorageSchema {
                    datastorage_name: datastorage.name.clone(),
                    datastorage_embedded_in: embedded_in,
                    attributes,
                });
            }
            databases.push(DatabaseSchema {
                database_name: database.name.clone(),
                database_type: server.kind.as_str().to_string(),
                datastorages,
            });
        }
    }
    Ok(databases)
}

fn embedded_in_name<S: QueryInterface>(
    staging: &S,
    parent: Option<DatastorageId>,
) -> StagingResult<Option<String>> {
    match parent {
        None => Ok(None),
        Some(id) => Ok(Some(staging.datastorage(id)?.name)),
    }
}

fn reference_entry<S: QueryInterface>(
    staging: &S,
    uacs: &BTreeMap<u64, Uac>,
    inds: &BTreeMap<u64, Ind>,
    uac_id: u64,
    ind_id: u64,
) -> StagingResult<Option<ReferenceEntry>> {
    let (Some(uac), Some(ind)) = (uacs.get(&uac_id), inds.get(&ind_id)) else {
        return Ok(None);
    };
    let parent_server = staging.server(uac.server_id)?;
    let child_server = staging.server(ind.child_server_id)?;
    Ok(Some(ReferenceEntry {
        primarykey_database_type: parent_server.kind.as_str().to_string(),
        primarykey_host: parent_server.host.clone(),
        primarykey_port: parent_server.port,
        primarykey_database: staging.database(uac.database_id)?.name,
        primarykey_datastorage: staging.datastorage(uac.datastorage_id)?.name,
        primarykey_attributes: attribute_names(staging, &uac.attribute_ids)?,
        foreignkey_database_type: child_server.kind.as_str().to_string(),
        foreignkey_host: child_server.host.clone(),
        foreignkey_port: child_server.port,
        foreignkey_database: staging.database(ind.child_database_id)?.name,
        foreignkey_datastorage: staging.datastorage(ind.child_datastorage_id)?.name,
        foreignkey_attributes: attribute_names(staging, &ind.child_attribute_ids)?,
        datatypes: attribute_datatypes(staging, &uac.attribute_ids)?,
    }))
}

/// Comma-joined attribute names, in sequence order.
fn attribute_names<S: QueryInterface>(
    staging: &S,
    ids: &[AttributeId],
) -> StagingResult<String> {
    let mut names = Vec::with_capacity(ids.len());
    for &id in ids {
        names.push(staging.attribute(id)?.name);
    }
    Ok(names.join(", "))
}

/// Comma-joined per-attribute type tags; an attribute with several observed
/// types renders them slash-separated.
fn attribute_datatypes<S: QueryInterface>(
    staging: &S,
    ids: &[AttributeId],
) -> StagingResult<String> {
    let mut rendered = Vec::with_capacity(ids.len());
    for &id in ids {
        let types: Vec<&str> = staging
            .attribute_types(id)?
            .iter()
            .map(|t| t.as_str())
            .collect();
        rendered.push(types.join("/"));
    }
    Ok(rendered.join(", "))
}
