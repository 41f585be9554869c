//! Relational connector over CSV files.
//!
//! The URI path names a directory; the directory name becomes the database
//! and every `*.csv` file inside becomes a table. The first row carries the
//! column names. Types are inferred per field: integers, floats, booleans,
//! everything else as string. Empty fields stage no cell, modelling SQL
//! NULLs as missing values.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use crate::model::{ServerKind, ValueType};

use super::{Connector, IngestError, StagingSink};

pub struct CsvFileConnector {
    root: PathBuf,
}

impl CsvFileConnector {
    pub fn new(path: &str) -> Self {
        CsvFileConnector {
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

impl Connector for CsvFileConnector {
    fn kind(&self) -> ServerKind {
        ServerKind::Relational
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
            .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        files.sort();

        for file in files {
            let table = file
                .file_stem()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let datastorage = sink.datastorage(database, &table, None);

            let reader = BufReader::new(fs::File::open(&file)?);
            let mut lines = reader.lines();
            let header = match lines.next() {
                Some(line) => line?,
                None => continue,
            };
            let columns: Vec<String> = parse_csv_line(&header)
                .into_iter()
                .map(|f| f.trim().to_string())
                .collect();

            for (row_no, line) in lines.enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let fields = parse_csv_line(&line);
                if fields.len() != columns.len() {
                    return Err(IngestError::Parse(format!(
                        "{}: row {} has {} fields, expected {}",
                        file.display(),
                        row_no + 2,
                        fields.len(),
                        columns.len()
                    )));
                }
                let entry_no = sink.next_entry(datastorage);
                for (i, (column, field)) in columns.iter().zip(fields.iter()).enumerate() {
                    let field = field.trim();
                    if field.is_empty() {
                        continue;
                    }
                    let attribute = sink.attribute(datastorage, column);
                    let value_type = infer_type(field);
                    sink.add_value(attribute, entry_no, i as u32 + 1, field, value_type);
                }
            }
        }
        sink.finish();
        Ok(())
    }
}

/// Split one CSV line on commas, honoring double-quoted fields.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn infer_type(field: &str) -> ValueType {
    if field.parse::<i64>().is_ok() {
        ValueType::Int
    } else if field.parse::<f64>().is_ok() {
        ValueType::Float
    } else if field.eq_ignore_ascii_case("true") || field.eq_ignore_ascii_case("false") {
        ValueType::Bool
    } else {
        ValueType::Str
    }
}
