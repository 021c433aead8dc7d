//! Flat JSON record tables, one file per dataset.
//!
//! A table file holds a JSON array of flat objects. Every load projects the
//! rows onto the dataset's declared columns: missing columns become `""`,
//! unknown ones are dropped. Saves rewrite the whole file through a temp file
//! in the same directory followed by a rename.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// One row: column name to scalar cell.
pub type Row = Map<String, Value>;

/// A typed row stored in its own table file.
pub trait Record: Serialize + DeserializeOwned {
    /// Declared columns, in file order.
    const COLUMNS: &'static [&'static str];
    /// File name inside the data directory.
    const FILE_NAME: &'static str;
}

/// Errors from reading or writing a table file.
#[derive(Debug)]
pub enum StoreError {
    /// The file exists but could not be read.
    Read { path: PathBuf, source: std::io::Error },
    /// The file content is neither a record list nor a column map.
    Parse { path: PathBuf, reason: String },
    /// A typed record could not be turned into a row.
    Encode(serde_json::Error),
    /// A row could not be turned into a typed record.
    Decode { row: usize, source: serde_json::Error },
    /// Writing or renaming the file failed.
    Write { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read '{}': {}", path.display(), source)
            }
            Self::Parse { path, reason } => {
                write!(f, "failed to parse '{}': {}", path.display(), reason)
            }
            Self::Encode(source) => write!(f, "failed to encode record: {}", source),
            Self::Decode { row, source } => write!(f, "failed to decode row {}: {}", row, source),
            Self::Write { path, source } => {
                write!(f, "failed to write '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } | Self::Write { source, .. } => Some(source),
            Self::Encode(source) | Self::Decode { source, .. } => Some(source),
            Self::Parse { .. } => None,
        }
    }
}

/// An ordered sequence of rows sharing a fixed column set.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row, projected onto this table's columns.
    pub fn push(&mut self, mut row: Row) {
        let projected = self
            .columns
            .iter()
            .map(|column| (column.clone(), scalar(row.remove(column))))
            .collect();
        self.rows.push(projected);
    }

    pub fn from_records<R: Record>(records: &[R]) -> Result<Self, StoreError> {
        let mut table = Self::new(R::COLUMNS);
        for record in records {
            match serde_json::to_value(record).map_err(StoreError::Encode)? {
                Value::Object(row) => table.push(row),
                _ => {
                    return Err(StoreError::Encode(serde::ser::Error::custom(
                        "record did not serialize to an object",
                    )));
                }
            }
        }
        Ok(table)
    }

    pub fn to_records<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                serde_json::from_value(Value::Object(cells.clone()))
                    .map_err(|source| StoreError::Decode { row, source })
            })
            .collect()
    }
}

/// Cells are scalars; nested values are flattened to their JSON text.
fn scalar(value: Option<Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::String(String::new()),
        Some(v @ (Value::Array(_) | Value::Object(_))) => Value::String(v.to_string()),
        Some(v) => v,
    }
}

/// Load a table, returning an empty one when the file does not exist.
///
/// A JSON array of objects is the normal layout. A column-oriented object
/// (`{"Name": {"0": .., "1": ..}}` or `{"Name": [..]}`) is accepted as a
/// fallback. Anything else is a [`StoreError::Parse`]; the caller decides what
/// to do with the file.
pub fn load(path: &Path, columns: &[&str]) -> Result<Table, StoreError> {
    let mut table = Table::new(columns);

    if !path.exists() {
        debug!("No table file at {}, starting empty", path.display());
        return Ok(table);
    }

    let text = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    // A zero-length file carries no rows to lose.
    if text.trim().is_empty() {
        return Ok(table);
    }

    let rows = match serde_json::from_str::<Vec<Row>>(&text) {
        Ok(rows) => rows,
        Err(e) => {
            debug!("{} is not a record list ({e}), trying column layout", path.display());
            parse_raw(&text).map_err(|reason| StoreError::Parse {
                path: path.to_path_buf(),
                reason,
            })?
        }
    };

    for row in rows {
        table.push(row);
    }
    debug!("Loaded {} rows from {}", table.len(), path.display());
    Ok(table)
}

fn parse_raw(text: &str) -> Result<Vec<Row>, String> {
    match serde_json::from_str::<Value>(text).map_err(|e| e.to_string())? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => {
            let total = items.len();
            let rows: Vec<Row> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(row) => Some(row),
                    _ => None,
                })
                .collect();
            if rows.len() < total {
                info!("Skipped {} non-object entries", total - rows.len());
            }
            Ok(rows)
        }
        Value::Object(columns) => rows_from_columns(columns),
        other => Err(format!("expected an array or object, found {}", kind(&other))),
    }
}

fn rows_from_columns(columns: Map<String, Value>) -> Result<Vec<Row>, String> {
    let mut rows: BTreeMap<usize, Row> = BTreeMap::new();

    for (column, cells) in columns {
        match cells {
            Value::Object(cells) => {
                for (index, cell) in cells {
                    let index: usize = index
                        .parse()
                        .map_err(|_| format!("column '{column}' has non-numeric index '{index}'"))?;
                    rows.entry(index).or_default().insert(column.clone(), cell);
                }
            }
            Value::Array(cells) => {
                for (index, cell) in cells.into_iter().enumerate() {
                    rows.entry(index).or_default().insert(column.clone(), cell);
                }
            }
            other => {
                return Err(format!("column '{column}' holds {} instead of cells", kind(&other)));
            }
        }
    }

    Ok(rows.into_values().collect())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Overwrite `path` with the full table.
///
/// Non-ASCII text is written as-is. The new content lands in a sibling temp
/// file first and is renamed over the target, so readers see either the old
/// or the new table.
pub fn save(table: &Table, path: &Path) -> Result<(), StoreError> {
    let json = match serde_json::to_string_pretty(table.rows()) {
        Ok(json) => json,
        Err(e) => {
            debug!("Pretty encoding failed for {} ({e}), writing compact", path.display());
            serde_json::to_string(table.rows()).map_err(StoreError::Encode)?
        }
    };

    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(json.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    debug!("Saved {} rows to {}", table.len(), path.display());
    Ok(())
}

/// A typed table bound to its file.
#[derive(Debug, Clone)]
pub struct Dataset<R: Record> {
    records: Vec<R>,
    path: PathBuf,
}

impl<R: Record> Dataset<R> {
    pub fn empty(data_dir: &Path) -> Self {
        Self {
            records: Vec::new(),
            path: data_dir.join(R::FILE_NAME),
        }
    }

    pub fn load(data_dir: &Path) -> Result<Self, StoreError> {
        let path = data_dir.join(R::FILE_NAME);
        let records = load(&path, R::COLUMNS)?.to_records()?;
        Ok(Self { records, path })
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        save(&Table::from_records(&self.records)?, &self.path)
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<R> {
        &mut self.records
    }

    pub fn push(&mut self, record: R) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const COLUMNS: &[&str] = &["Name", "Role", "Language"];

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_missing_file_gives_empty_table() {
        let dir = TempDir::new().unwrap();
        let table = load(&dir.path().join("absent.json"), COLUMNS).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns(), &["Name", "Role", "Language"]);
    }

    #[test]
    fn test_backfills_and_drops_columns() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "t.json", r#"[{"Language": "Luo", "Extra": 1, "Name": "Akinyi"}]"#);
        let table = load(&path, COLUMNS).unwrap();

        let keys: Vec<&String> = table.rows()[0].keys().collect();
        assert_eq!(keys, ["Name", "Role", "Language"]);
        assert_eq!(table.rows()[0]["Role"], json!(""));
        assert_eq!(table.rows()[0]["Name"], json!("Akinyi"));
    }

    #[test]
    fn test_column_layout_fallback() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "t.json",
            r#"{"Name": {"1": "Otieno", "0": "Akinyi"}, "Role": {"0": "Volunteer", "1": "Influencer"}}"#,
        );
        let table = load(&path, COLUMNS).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0]["Name"], json!("Akinyi"));
        assert_eq!(table.rows()[1]["Role"], json!("Influencer"));
        assert_eq!(table.rows()[1]["Language"], json!(""));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "t.json", "{ not json");
        assert!(matches!(load(&path, COLUMNS), Err(StoreError::Parse { .. })));

        let path = write(&dir, "n.json", "42");
        assert!(matches!(load(&path, COLUMNS), Err(StoreError::Parse { .. })));
    }

    #[test]
    fn test_empty_file_is_empty_table() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "t.json", "");
        assert!(load(&path, COLUMNS).unwrap().is_empty());
    }

    #[test]
    fn test_nested_cells_flattened() {
        let mut table = Table::new(COLUMNS);
        table.push(row(json!({"Name": ["a", "b"], "Role": null})));
        assert_eq!(table.rows()[0]["Name"], json!(r#"["a","b"]"#));
        assert_eq!(table.rows()[0]["Role"], json!(""));
    }

    #[test]
    fn test_save_then_load_is_stable() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "t.json",
            r#"[{"Name": "Wekesa", "Language": "Luhya", "Attempts": 2}, {"Role": 7}]"#,
        );

        let first = load(&path, COLUMNS).unwrap();
        save(&first, &path).unwrap();
        let second = load(&path, COLUMNS).unwrap();
        save(&second, &path).unwrap();
        let third = load(&path, COLUMNS).unwrap();

        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(third.rows()[1]["Role"], json!(7));
    }

    #[test]
    fn test_save_keeps_non_ascii_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.json");
        let mut table = Table::new(COLUMNS);
        table.push(row(json!({"Name": "Nyar Kisumu – ŋ", "Language": "Luo"})));
        save(&table, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Nyar Kisumu – ŋ"));
        assert!(!raw.contains("\\u"));
    }

    #[test]
    fn test_save_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("t.json");
        save(&Table::new(COLUMNS), &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "[]");
    }
}
