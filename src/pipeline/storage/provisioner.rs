use super::settle;
use crate::db::{query_count, quote_ident};
use crate::error::{PipelineError, Result};
use crate::types::Dataset;
use libsql::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub statements: usize,
    /// Tables emptied, in the order they were emptied.
    pub truncated: Vec<Dataset>,
}

/// Applies the external DDL script and empties the destination tables, all in
/// one transaction.
pub struct SchemaProvisioner {
    schema_path: PathBuf,
}

fn provisioning(message: impl Into<String>) -> PipelineError {
    PipelineError::Provisioning {
        message: message.into(),
    }
}

/// Split a DDL script on `;`, dropping `--` comment lines and blank statements.
pub fn split_statements(ddl: &str) -> Vec<String> {
    let without_comments: String = ddl
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    without_comments
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Referencing tables before referenced ones, so emptying never strands a
/// dependent row.
pub fn truncation_order() -> Vec<Dataset> {
    let mut remaining = Dataset::ALL.to_vec();
    let mut order = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let next = remaining
            .iter()
            .position(|d| {
                !remaining
                    .iter()
                    .any(|other| other.foreign_keys().iter().any(|fk| fk.references == *d))
            })
            .unwrap_or(0);
        order.push(remaining.remove(next));
    }
    order
}

impl SchemaProvisioner {
    pub fn new(schema_path: impl Into<PathBuf>) -> Self {
        Self {
            schema_path: schema_path.into(),
        }
    }

    pub async fn provision(&self, conn: &Connection) -> Result<ProvisionReport> {
        let ddl = tokio::fs::read_to_string(&self.schema_path).await.map_err(|e| {
            provisioning(format!(
                "cannot read schema script {}: {e}",
                self.schema_path.display()
            ))
        })?;
        let statements = split_statements(&ddl);
        info!(
            "Applying {} DDL statement(s) from {}",
            statements.len(),
            self.schema_path.display()
        );

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| provisioning(format!("cannot begin transaction: {e}")))?;
        let outcome = apply(&tx, &statements).await;
        let truncated = settle(tx, outcome, provisioning).await?;

        info!("Destination tables ready: {:?}", truncated);
        Ok(ProvisionReport {
            statements: statements.len(),
            truncated,
        })
    }
}

async fn apply(conn: &Connection, statements: &[String]) -> Result<Vec<Dataset>> {
    for (i, statement) in statements.iter().enumerate() {
        debug!("DDL {}: {}", i + 1, statement);
        conn.execute(statement, libsql::params![])
            .await
            .map_err(|e| provisioning(format!("statement {} failed: {e}", i + 1)))?;
    }

    let order = truncation_order();
    for dataset in &order {
        conn.execute(
            &format!("DELETE FROM {}", quote_ident(dataset.table())),
            libsql::params![],
        )
        .await
        .map_err(|e| provisioning(format!("cannot empty {dataset}: {e}")))?;
    }

    // Identity counters only exist once some table uses AUTOINCREMENT.
    let has_sequences = query_count(
        conn,
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
    )
    .await?
        > 0;
    if has_sequences {
        let names = order
            .iter()
            .map(|d| format!("'{}'", d.table()))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(
            &format!("DELETE FROM sqlite_sequence WHERE name IN ({names})"),
            libsql::params![],
        )
        .await
        .map_err(|e| provisioning(format!("cannot reset identity counters: {e}")))?;
    }
    Ok(order)
}
