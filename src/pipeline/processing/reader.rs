//! Format reader: turns one encoding into a [`RecordSet`].
//!
//! Dispatch is an exhaustive match on [`EncodingKind`]; the path suffix is
//! only consulted when an [`Encoding`] is built.

use super::record_set::{CellValue, RecordSet};
use crate::error::{MalformedFile, PipelineError, Result};
use crate::types::{Encoding, EncodingKind};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Read a whole encoding. Pure apart from the file read.
pub fn read(encoding: &Encoding) -> Result<RecordSet> {
    let records = read_kind(encoding.kind, &encoding.path)?;
    debug!(
        path = %encoding.path.display(),
        rows = records.len(),
        columns = records.columns().len(),
        "Read encoding"
    );
    Ok(records)
}

/// Read any supported file, classifying it by suffix.
pub fn read_path(path: &Path) -> Result<RecordSet> {
    let kind = EncodingKind::from_path(path)?;
    read_kind(kind, path)
}

fn read_kind(kind: EncodingKind, path: &Path) -> Result<RecordSet> {
    let parsed = match kind {
        EncodingKind::Csv => read_csv(path),
        EncodingKind::Json => read_json(path),
        EncodingKind::Yaml => read_yaml(path),
    };
    parsed.map_err(|reason| malformed(path, reason))
}

/// Cheap structural check used before any stateful work.
///
/// csv: header plus at least one row; json: a list of objects; yaml: a
/// non-empty list.
pub fn probe(kind: EncodingKind, path: &Path) -> std::result::Result<(), String> {
    match kind {
        EncodingKind::Csv => {
            let mut reader = csv_reader(path)?;
            let headers = reader.headers().map_err(|e| e.to_string())?;
            if headers.iter().all(|h| h.trim().is_empty()) {
                return Err("missing header row".to_string());
            }
            match reader.records().next() {
                Some(Ok(_)) => Ok(()),
                Some(Err(e)) => Err(e.to_string()),
                None => Err("no data rows".to_string()),
            }
        }
        EncodingKind::Json => {
            let file = open(path)?;
            serde_json::from_reader::<_, Vec<serde_json::Map<String, serde_json::Value>>>(
                BufReader::new(file),
            )
            .map(|_| ())
            .map_err(|e| format!("expected a list of objects: {e}"))
        }
        EncodingKind::Yaml => {
            let file = open(path)?;
            let value: serde_yaml::Value =
                serde_yaml::from_reader(BufReader::new(file)).map_err(|e| e.to_string())?;
            match value {
                serde_yaml::Value::Sequence(items) if !items.is_empty() => Ok(()),
                serde_yaml::Value::Sequence(_) => Err("empty list".to_string()),
                _ => Err("expected a list".to_string()),
            }
        }
    }
}

pub(crate) fn malformed(path: &Path, reason: String) -> PipelineError {
    PipelineError::MalformedInput {
        files: vec![MalformedFile {
            path: path.to_path_buf(),
            reason,
        }],
    }
}

fn open(path: &Path) -> std::result::Result<File, String> {
    File::open(path).map_err(|e| format!("unreadable: {e}"))
}

fn csv_reader(path: &Path) -> std::result::Result<csv::Reader<File>, String> {
    let file = open(path)?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(file))
}

// ---------------------------------------------------------------------------
// csv
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Boolean,
    Text,
}

fn parse_bool(v: &str) -> Option<bool> {
    match v {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

fn parse_real(v: &str) -> Option<f64> {
    v.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Pick the narrowest type every non-empty value of a column satisfies.
fn infer_column<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let (mut int, mut real, mut boolean, mut seen) = (true, true, true, false);
    for v in values.map(str::trim).filter(|v| !v.is_empty()) {
        seen = true;
        int &= v.parse::<i64>().is_ok();
        real &= parse_real(v).is_some();
        boolean &= parse_bool(v).is_some();
        if !(int || real || boolean) {
            break;
        }
    }
    match (seen, int, real, boolean) {
        (false, ..) => ColumnType::Text,
        (true, true, ..) => ColumnType::Integer,
        (true, false, true, _) => ColumnType::Real,
        (true, false, false, true) => ColumnType::Boolean,
        _ => ColumnType::Text,
    }
}

fn csv_cell(raw: &str, ty: ColumnType) -> CellValue {
    let v = raw.trim();
    if v.is_empty() {
        return CellValue::Null;
    }
    let typed = match ty {
        ColumnType::Integer => v.parse().ok().map(CellValue::Integer),
        ColumnType::Real => parse_real(v).map(CellValue::Real),
        ColumnType::Boolean => parse_bool(v).map(CellValue::Bool),
        ColumnType::Text => None,
    };
    typed.unwrap_or_else(|| CellValue::Text(raw.to_string()))
}

fn read_csv(path: &Path) -> std::result::Result<RecordSet, String> {
    let mut reader = csv_reader(path)?;
    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(str::to_string)
        .collect();
    if columns.iter().all(|c| c.is_empty()) {
        return Err("missing header row".to_string());
    }
    for (i, c) in columns.iter().enumerate() {
        if columns[..i].contains(c) {
            return Err(format!("duplicate column '{c}'"));
        }
    }

    let raw = reader
        .records()
        .collect::<std::result::Result<Vec<csv::StringRecord>, _>>()
        .map_err(|e| e.to_string())?;

    let types: Vec<ColumnType> = (0..columns.len())
        .map(|i| infer_column(raw.iter().map(|r| r.get(i).unwrap_or(""))))
        .collect();

    let mut records = RecordSet::new(columns);
    for record in &raw {
        let row = record
            .iter()
            .zip(&types)
            .map(|(value, ty)| csv_cell(value, *ty))
            .collect();
        records.push_row(row)?;
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// json
// ---------------------------------------------------------------------------

fn json_cell(value: serde_json::Value) -> CellValue {
    use serde_json::Value;
    match value {
        Value::Null => CellValue::Null,
        Value::Bool(b) => CellValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => CellValue::Integer(i),
            None => n.as_f64().map(CellValue::Real).unwrap_or(CellValue::Text(n.to_string())),
        },
        Value::String(s) => CellValue::Text(s),
        nested @ (Value::Array(_) | Value::Object(_)) => CellValue::Text(nested.to_string()),
    }
}

fn read_json(path: &Path) -> std::result::Result<RecordSet, String> {
    let file = open(path)?;
    let value: serde_json::Value =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| e.to_string())?;
    let serde_json::Value::Array(items) = value else {
        return Err("expected a list of objects".to_string());
    };

    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let serde_json::Value::Object(map) = item else {
            return Err(format!("item {i} is not an object"));
        };
        records.push(map.into_iter().map(|(k, v)| (k, json_cell(v))).collect());
    }
    Ok(RecordSet::from_records(records))
}

// ---------------------------------------------------------------------------
// yaml
// ---------------------------------------------------------------------------

fn yaml_key(key: serde_yaml::Value) -> std::result::Result<String, String> {
    use serde_yaml::Value;
    match key {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("unsupported mapping key {other:?}")),
    }
}

fn yaml_cell(value: serde_yaml::Value) -> std::result::Result<CellValue, String> {
    use serde_yaml::Value;
    Ok(match value {
        Value::Null => CellValue::Null,
        Value::Bool(b) => CellValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => CellValue::Integer(i),
            None => n.as_f64().map(CellValue::Real).unwrap_or(CellValue::Text(n.to_string())),
        },
        Value::String(s) => CellValue::Text(s),
        Value::Tagged(tagged) => return yaml_cell(tagged.value),
        nested @ (Value::Sequence(_) | Value::Mapping(_)) => {
            CellValue::Text(serde_json::to_string(&nested).map_err(|e| e.to_string())?)
        }
    })
}

fn read_yaml(path: &Path) -> std::result::Result<RecordSet, String> {
    let file = open(path)?;
    let value: serde_yaml::Value =
        serde_yaml::from_reader(BufReader::new(file)).map_err(|e| e.to_string())?;
    let serde_yaml::Value::Sequence(items) = value else {
        return Err("expected a list of mappings".to_string());
    };

    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let serde_yaml::Value::Mapping(map) = item else {
            return Err(format!("item {i} is not a mapping"));
        };
        let mut record = Vec::with_capacity(map.len());
        for (k, v) in map {
            record.push((yaml_key(k)?, yaml_cell(v)?));
        }
        records.push(record);
    }
    Ok(RecordSet::from_records(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dataset;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_csv_infers_column_types() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("customers.csv");
        fs::write(
            &path,
            "customer_id,first_name,score,vip,phone\n1,Ann,1.5,true,555-0100\n2,Bo,,false,0123\n",
        )
        .unwrap();
        let set = read(&Encoding::new(Dataset::Customers, EncodingKind::Csv, &path)).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0, "customer_id"), Some(&CellValue::Integer(1)));
        assert_eq!(set.get(0, "first_name"), Some(&CellValue::Text("Ann".into())));
        assert_eq!(set.get(0, "score"), Some(&CellValue::Real(1.5)));
        assert_eq!(set.get(1, "score"), Some(&CellValue::Null));
        assert_eq!(set.get(1, "vip"), Some(&CellValue::Bool(false)));
        assert_eq!(set.get(1, "phone"), Some(&CellValue::Text("0123".into())));
    }

    #[test]
    fn test_csv_ragged_row_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.csv");
        fs::write(&path, "a,b\n1,2\n3\n").unwrap();
        let err = read_path(&path).unwrap_err();
        assert_eq!(err.code(), "MalformedInputError");
        assert!(err.to_string().contains("orders.csv"));
    }

    #[test]
    fn test_json_union_of_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("products.json");
        fs::write(
            &path,
            r#"[{"product_id": 1, "name": "pen", "tags": ["a"]},
                {"product_id": 2, "price": 2.5}]"#,
        )
        .unwrap();
        let set = read_path(&path).unwrap();
        assert_eq!(set.columns(), &["product_id", "name", "tags", "price"]);
        assert_eq!(set.get(0, "tags"), Some(&CellValue::Text("[\"a\"]".into())));
        assert_eq!(set.get(0, "price"), Some(&CellValue::Null));
        assert_eq!(set.get(1, "price"), Some(&CellValue::Real(2.5)));
    }

    #[test]
    fn test_json_rejects_non_objects() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("products.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert!(read_path(&path).is_err());
        assert!(probe(EncodingKind::Json, &path).is_err());
    }

    #[test]
    fn test_yaml_list_of_mappings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.yml");
        fs::write(
            &path,
            "- order_id: 1\n  customer_id: 7\n  order_date: 2024-03-01\n- order_id: 2\n  customer_id: 8\n  note: rush\n",
        )
        .unwrap();
        let set = read_path(&path).unwrap();
        assert_eq!(set.columns(), &["order_id", "customer_id", "order_date", "note"]);
        assert_eq!(set.get(0, "order_date"), Some(&CellValue::Text("2024-03-01".into())));
        assert_eq!(set.get(0, "note"), Some(&CellValue::Null));
        assert_eq!(set.get(1, "customer_id"), Some(&CellValue::Integer(8)));
    }

    #[test]
    fn test_unsupported_suffix() {
        let err = read_path(Path::new("customers.xlsx")).unwrap_err();
        assert_eq!(err.code(), "UnsupportedFormatError");
    }

    #[test]
    fn test_probe_rules() {
        let dir = tempdir().unwrap();
        let header_only = dir.path().join("a.csv");
        fs::write(&header_only, "id,name\n").unwrap();
        assert_eq!(probe(EncodingKind::Csv, &header_only), Err("no data rows".to_string()));

        let empty_list = dir.path().join("a.yaml");
        fs::write(&empty_list, "[]\n").unwrap();
        assert!(probe(EncodingKind::Yaml, &empty_list).is_err());

        let scalar = dir.path().join("b.yaml");
        fs::write(&scalar, "just text\n").unwrap();
        assert!(probe(EncodingKind::Yaml, &scalar).is_err());

        let ok = dir.path().join("a.json");
        fs::write(&ok, r#"[{"id": 1}]"#).unwrap();
        assert!(probe(EncodingKind::Json, &ok).is_ok());
    }
}
