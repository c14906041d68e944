//! Record file I/O.
//!
//! Datasets are delimited text (`.csv`, `.tsv`) or JSON (`.json`). JSON
//! input may be an array of objects or an object whose values are objects.
//! Output always has the shape of the format chosen by the file extension:
//! a header plus one row per record, or a pretty-printed array.
//!
//! CSV cells are read as strings and written back verbatim, so a file that
//! round-trips through the pipeline without new enrichment is unchanged.

mod identifier;

pub use identifier::IdentifierColumn;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::enrichment::Record;

/// Supported record file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Csv,
    Tsv,
    Json,
}

impl DatasetFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());
        match ext.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("tsv") => Ok(Self::Tsv),
            Some("json") => Ok(Self::Json),
            _ => Err(DatasetError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    fn delimiter(self) -> u8 {
        match self {
            Self::Tsv => b'\t',
            _ => b',',
        }
    }
}

/// A loaded record file.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub format: DatasetFormat,
    /// Header order for delimited files, first-seen key order for JSON
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

/// Read a record file, detecting the format from its extension.
pub fn read(path: &Path) -> Result<Dataset, DatasetError> {
    let format = DatasetFormat::from_path(path)?;
    let records = match format {
        DatasetFormat::Csv | DatasetFormat::Tsv => read_delimited(path, format)?,
        DatasetFormat::Json => read_json(path)?,
    };
    let columns = columns(&records);
    Ok(Dataset {
        format,
        columns,
        records,
    })
}

/// Write records, detecting the format from the path's extension.
pub fn write(path: &Path, records: &[Record]) -> Result<(), DatasetError> {
    write_as(path, DatasetFormat::from_path(path)?, records)
}

/// Write records in an explicit format (used for temporary files whose
/// extension does not name the format).
pub fn write_as(path: &Path, format: DatasetFormat, records: &[Record]) -> Result<(), DatasetError> {
    match format {
        DatasetFormat::Csv | DatasetFormat::Tsv => write_delimited(path, format, records),
        DatasetFormat::Json => write_json(path, records),
    }
}

/// Ordered union of all record fields, in first-seen order.
pub fn columns(records: &[Record]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut columns = Vec::new();
    for key in records.iter().flat_map(|r| r.keys()) {
        if seen.insert(key.as_str()) {
            columns.push(key.clone());
        }
    }
    columns
}

/// Render a value as a delimited-file cell.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn read_delimited(path: &Path, format: DatasetFormat) -> Result<Vec<Record>, DatasetError> {
    let csv_err = |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(format.delimiter())
        .from_path(path)
        .map_err(csv_err)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(String::from)
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(csv_err)?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(h, v)| (h.clone(), Value::String(v.to_string())))
            .collect();
        records.push(record);
    }
    Ok(records)
}

fn write_delimited(path: &Path, format: DatasetFormat, records: &[Record]) -> Result<(), DatasetError> {
    let csv_err = |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let columns = columns(records);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(format.delimiter())
        .from_path(path)
        .map_err(csv_err)?;

    if !columns.is_empty() {
        writer.write_record(&columns).map_err(csv_err)?;
    }
    for record in records {
        let row = columns
            .iter()
            .map(|c| record.get(c).map(cell_text).unwrap_or_default());
        writer.write_record(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| DatasetError::io(path, e))
}

fn read_json(path: &Path) -> Result<Vec<Record>, DatasetError> {
    let file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
    let value: Value =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| DatasetError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let items: Vec<Value> = match value {
        Value::Array(items) => items,
        // Keyed input: {"<key>": {record}, ...}
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        _ => return Err(DatasetError::NotAList(path.to_path_buf())),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            _ => Err(DatasetError::NotARecord {
                path: path.to_path_buf(),
                index,
            }),
        })
        .collect()
}

fn write_json(path: &Path, records: &[Record]) -> Result<(), DatasetError> {
    let file = File::create(path).map_err(|e| DatasetError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records).map_err(|source| DatasetError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|e| DatasetError::io(path, e))
}

/// Input/output format errors. Fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Unsupported file format: {0} (expected .csv, .tsv or .json)")]
    UnsupportedFormat(PathBuf),

    #[error("No identifier column found (looked for: {})", candidates.join(", "))]
    MissingIdentifierColumn { candidates: Vec<String> },

    #[error("{0} must contain a list of records")]
    NotAList(PathBuf),

    #[error("Entry {index} in {path} is not a record")]
    NotARecord { path: PathBuf, index: usize },

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid delimited file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid JSON file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl DatasetError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(DatasetFormat::from_path(Path::new("a.csv")).unwrap(), DatasetFormat::Csv);
        assert_eq!(DatasetFormat::from_path(Path::new("a.TSV")).unwrap(), DatasetFormat::Tsv);
        assert_eq!(DatasetFormat::from_path(Path::new("a.json")).unwrap(), DatasetFormat::Json);
        assert!(matches!(
            DatasetFormat::from_path(Path::new("a.xlsx")),
            Err(DatasetError::UnsupportedFormat(_))
        ));
        assert!(DatasetFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_read_csv_preserves_column_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracks.csv");
        std::fs::write(&path, "track,artist,uri\nShape of You,Ed Sheeran,spotify:track:x\n").unwrap();

        let dataset = read(&path).unwrap();
        assert_eq!(dataset.format, DatasetFormat::Csv);
        assert_eq!(dataset.columns, vec!["track", "artist", "uri"]);
        assert_eq!(dataset.records.len(), 1);
        assert_eq!(dataset.records[0]["artist"], json!("Ed Sheeran"));
    }

    #[test]
    fn test_csv_roundtrip_is_byte_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.csv");
        let contents = "id,name,score\nabc,\"Hello, World\",0.5\ndef,,\n";
        std::fs::write(&path, contents).unwrap();

        let dataset = read(&path).unwrap();
        let out = dir.path().join("out.csv");
        write(&out, &dataset.records).unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), contents);
    }

    #[test]
    fn test_write_csv_fills_missing_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let records = vec![
            record(&[("id", json!("a"))]),
            record(&[("id", json!("b")), ("energy", json!(0.5)), ("mode", Value::Null)]),
        ];
        write(&path, &records).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "id,energy,mode\na,,\nb,0.5,\n"
        );
    }

    #[test]
    fn test_read_tsv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.tsv");
        std::fs::write(&path, "id\tname\nabc\tx, y\n").unwrap();

        let dataset = read(&path).unwrap();
        assert_eq!(dataset.records[0]["name"], json!("x, y"));
    }

    #[test]
    fn test_read_json_array_and_keyed_object() {
        let dir = tempdir().unwrap();

        let array = dir.path().join("array.json");
        std::fs::write(&array, r#"[{"id": "a", "n": 1}, {"id": "b", "extra": true}]"#).unwrap();
        let dataset = read(&array).unwrap();
        assert_eq!(dataset.records.len(), 2);
        assert_eq!(dataset.columns, vec!["id", "n", "extra"]);

        let keyed = dir.path().join("keyed.json");
        std::fs::write(&keyed, r#"{"x": {"id": "a"}, "y": {"id": "b"}}"#).unwrap();
        let dataset = read(&keyed).unwrap();
        assert_eq!(dataset.records[1]["id"], json!("b"));
    }

    #[test]
    fn test_read_json_rejects_non_records() {
        let dir = tempdir().unwrap();

        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"[{"id": "a"}, 5]"#).unwrap();
        assert!(matches!(read(&path), Err(DatasetError::NotARecord { index: 1, .. })));

        std::fs::write(&path, r#""just a string""#).unwrap();
        assert!(matches!(read(&path), Err(DatasetError::NotAList(_))));

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(read(&path), Err(DatasetError::Json { .. })));
    }

    #[test]
    fn test_json_roundtrip_keeps_types_and_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        let records = vec![record(&[
            ("z", json!("first")),
            ("a", json!(1.5)),
            ("m", Value::Null),
        ])];
        write(&path, &records).unwrap();

        let dataset = read(&path).unwrap();
        assert_eq!(dataset.records, records);
        assert_eq!(dataset.columns, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_write_as_ignores_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json.tmp");
        write_as(&path, DatasetFormat::Json, &[record(&[("id", json!("a"))])]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.trim_start().starts_with('['));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(read(&dir.path().join("missing.csv")).is_err());
        assert!(read(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Value::Null), "");
        assert_eq!(cell_text(&json!("x")), "x");
        assert_eq!(cell_text(&json!(0.25)), "0.25");
        assert_eq!(cell_text(&json!(4)), "4");
        assert_eq!(cell_text(&json!(true)), "true");
    }
}
