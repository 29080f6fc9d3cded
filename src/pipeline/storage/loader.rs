use super::settle;
use crate::constants::MAX_BIND_PARAMS;
use crate::db::quote_ident;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::processing::record_set::{CellValue, RecordSet};
use crate::types::{Dataset, EncodingKind};
use libsql::params::Params;
use libsql::{Connection, TransactionBehavior, Value};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// What a load task reports downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub dataset: Dataset,
    pub source: EncodingKind,
    pub rows: u64,
}

/// Inserts a record set into its table in fixed-size batches inside a single
/// transaction. Either every row lands or none do.
#[derive(Debug, Clone)]
pub struct BulkLoader {
    batch_size: usize,
}

impl BulkLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Rows packed into one INSERT, capped so the bind count stays legal.
    pub fn rows_per_statement(&self, columns: usize) -> usize {
        if columns == 0 {
            return self.batch_size;
        }
        self.batch_size.min(MAX_BIND_PARAMS / columns).max(1)
    }

    pub async fn load(&self, conn: &Connection, dataset: Dataset, records: &RecordSet) -> Result<u64> {
        if records.is_empty() {
            info!("No rows to load into {}", dataset.table());
            return Ok(0);
        }
        if records.columns().is_empty() {
            return Err(load_error(dataset, "record set has no columns"));
        }

        let started = Instant::now();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| load_error(dataset, format!("cannot begin transaction: {e}")))?;
        let outcome = self.insert_batches(&tx, dataset, records).await;
        let rows = settle(tx, outcome, |m| load_error(dataset, m)).await?;

        metrics::load::rows_loaded(dataset, rows);
        info!(
            "Loaded {} rows into {} in {:.2}s",
            rows,
            dataset.table(),
            started.elapsed().as_secs_f64()
        );
        Ok(rows)
    }

    async fn insert_batches(&self, conn: &Connection, dataset: Dataset, records: &RecordSet) -> Result<u64> {
        let columns = records.columns();
        let per_statement = self.rows_per_statement(columns.len());
        let full_sql = insert_sql(dataset.table(), columns, per_statement);

        let mut inserted = 0u64;
        for (batch, chunk) in records.rows().chunks(per_statement).enumerate() {
            let sql = if chunk.len() == per_statement {
                full_sql.clone()
            } else {
                insert_sql(dataset.table(), columns, chunk.len())
            };
            let values: Vec<Value> = chunk.iter().flatten().map(to_sql_value).collect();
            conn.execute(&sql, Params::Positional(values))
                .await
                .map_err(|e| load_error(dataset, format!("batch {} failed: {e}", batch + 1)))?;
            inserted += chunk.len() as u64;
            debug!("{}: batch {} wrote {} rows", dataset.table(), batch + 1, chunk.len());
        }
        Ok(inserted)
    }
}

fn load_error(dataset: Dataset, message: impl Into<String>) -> PipelineError {
    PipelineError::Load {
        dataset,
        message: message.into(),
    }
}

/// `INSERT INTO "t" ("a","b") VALUES (?,?),(?,?)` for `rows` rows.
pub fn insert_sql(table: &str, columns: &[String], rows: usize) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
    let tuples = vec![tuple.as_str(); rows].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table),
        column_list,
        tuples
    )
}

pub fn to_sql_value(cell: &CellValue) -> Value {
    match cell {
        CellValue::Null => Value::Null,
        CellValue::Bool(b) => Value::Integer(i64::from(*b)),
        CellValue::Integer(i) => Value::Integer(*i),
        CellValue::Real(f) => Value::Real(*f),
        CellValue::Text(s) => Value::Text(s.clone()),
    }
}
