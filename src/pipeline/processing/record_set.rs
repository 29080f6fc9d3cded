use serde::Serialize;
use std::collections::HashMap;

/// A single cell after format-specific parsing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

/// Uniform tabular form of one encoding: every row has one cell per column.
///
/// For record-oriented inputs the column set is the union of keys over all
/// records, in first-seen order; a record without a key gets `Null` there.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordSet {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl RecordSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row; fails if its width does not match the column set.
    pub fn push_row(&mut self, row: Vec<CellValue>) -> Result<(), String> {
        if row.len() != self.columns.len() {
            return Err(format!(
                "row {} has {} values, expected {}",
                self.rows.len(),
                row.len(),
                self.columns.len()
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Build from keyed records using the union-of-keys policy.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Vec<(String, CellValue)>>,
    {
        let records: Vec<_> = records.into_iter().collect();

        let mut columns: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for record in &records {
            for (key, _) in record {
                if !index.contains_key(key) {
                    index.insert(key.clone(), columns.len());
                    columns.push(key.clone());
                }
            }
        }

        let width = columns.len();
        let rows = records
            .into_iter()
            .map(|record| {
                let mut row = vec![CellValue::Null; width];
                for (key, value) in record {
                    if let Some(&i) = index.get(&key) {
                        row[i] = value;
                    }
                }
                row
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&CellValue> {
        let i = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, CellValue)]) -> Vec<(String, CellValue)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_union_of_keys_fills_nulls() {
        let set = RecordSet::from_records(vec![
            rec(&[("id", CellValue::Integer(1)), ("name", CellValue::Text("a".into()))]),
            rec(&[("id", CellValue::Integer(2)), ("email", CellValue::Text("b@x".into()))]),
        ]);
        assert_eq!(set.columns(), &["id", "name", "email"]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0, "email"), Some(&CellValue::Null));
        assert_eq!(set.get(1, "name"), Some(&CellValue::Null));
        assert_eq!(set.get(1, "email"), Some(&CellValue::Text("b@x".into())));
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut set = RecordSet::new(vec!["a".into(), "b".into()]);
        assert!(set.push_row(vec![CellValue::Null]).is_err());
        assert!(set.push_row(vec![CellValue::Null, CellValue::Bool(true)]).is_ok());
        assert_eq!(set.len(), 1);
    }
}
