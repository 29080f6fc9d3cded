use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::PipelineConfig;
use crate::db::{query_count, quote_ident};
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::types::Dataset;
use libsql::Connection;
use tracing::{info, warn};

/// Result of one foreign-key orphan count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanCheck {
    /// The referencing dataset
    pub dataset: Dataset,
    /// Referencing column
    pub column: String,
    /// The dataset whose primary key the column must match
    pub references: Dataset,
    /// Rows whose value has no match
    pub orphans: u64,
}

/// Everything measured by the post-load gate, whether or not it passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Row count per destination table
    pub row_counts: BTreeMap<Dataset, u64>,
    /// One entry per declared foreign key
    pub orphan_checks: Vec<OrphanCheck>,
}

impl Verdict {
    /// Total orphaned rows across every foreign key.
    pub fn orphans(&self) -> u64 {
        self.orphan_checks.iter().map(|c| c.orphans).sum()
    }
}

/// Post-load checkpoint: referential integrity, then row-count thresholds.
///
/// Both checks are always measured and logged so an operator sees the full
/// picture; the integrity failure is the one raised when both fail.
#[derive(Debug, Clone)]
pub struct PostLoadValidator {
    /// Minimum rows per dataset
    thresholds: BTreeMap<Dataset, u64>,
}

impl PostLoadValidator {
    /// Same threshold for every dataset.
    pub fn new(min_row_count: u64) -> Self {
        Self {
            thresholds: Dataset::ALL.into_iter().map(|d| (d, min_row_count)).collect(),
        }
    }

    /// Thresholds from the run configuration, honoring per-dataset overrides.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            thresholds: Dataset::ALL
                .into_iter()
                .map(|d| (d, config.min_rows_for(d)))
                .collect(),
        }
    }

    pub fn with_threshold(mut self, dataset: Dataset, min_rows: u64) -> Self {
        self.thresholds.insert(dataset, min_rows);
        self
    }

    pub fn threshold(&self, dataset: Dataset) -> u64 {
        self.thresholds.get(&dataset).copied().unwrap_or(0)
    }

    /// Count orphans and rows. Never fails on data, only on database errors.
    pub async fn measure(&self, conn: &Connection) -> Result<Verdict> {
        let mut orphan_checks = Vec::new();
        for dataset in Dataset::ALL {
            for fk in dataset.foreign_keys() {
                let orphans = query_count(conn, &orphan_sql(dataset, fk.column, fk.references)).await?;
                metrics::validation::orphaned_rows(dataset, fk.column, orphans);
                if orphans > 0 {
                    warn!(
                        "{} {} rows reference a {} missing from {}",
                        orphans,
                        dataset.table(),
                        fk.column,
                        fk.references.table()
                    );
                }
                orphan_checks.push(OrphanCheck {
                    dataset,
                    column: fk.column.to_string(),
                    references: fk.references,
                    orphans,
                });
            }
        }

        let mut row_counts = BTreeMap::new();
        for dataset in Dataset::ALL {
            let count = query_count(
                conn,
                &format!("SELECT COUNT(*) FROM {}", quote_ident(dataset.table())),
            )
            .await?;
            metrics::validation::row_count(dataset, count);
            info!(
                "{}: {} rows (minimum {})",
                dataset.table(),
                count,
                self.threshold(dataset)
            );
            row_counts.insert(dataset, count);
        }

        Ok(Verdict {
            row_counts,
            orphan_checks,
        })
    }

    /// Turn a measurement into pass/fail. Integrity is checked first; among
    /// short tables the emptiest one is named.
    pub fn enforce(&self, verdict: &Verdict) -> Result<()> {
        if let Some(check) = verdict.orphan_checks.iter().find(|c| c.orphans > 0) {
            return Err(PipelineError::ReferentialIntegrity {
                dataset: check.dataset,
                column: check.column.clone(),
                references: check.references,
                orphans: check.orphans,
            });
        }

        let shortest = verdict
            .row_counts
            .iter()
            .filter(|(dataset, count)| **count < self.threshold(**dataset))
            .min_by_key(|(_, count)| **count);
        if let Some((dataset, count)) = shortest {
            return Err(PipelineError::RowCount {
                dataset: *dataset,
                count: *count,
                threshold: self.threshold(*dataset),
            });
        }
        Ok(())
    }

    pub async fn validate(&self, conn: &Connection) -> Result<Verdict> {
        let verdict = self.measure(conn).await?;
        self.enforce(&verdict)?;
        info!("Post-load validation passed");
        Ok(verdict)
    }
}

/// Rows of `dataset` whose `column` has no matching primary key in `references`.
pub fn orphan_sql(dataset: Dataset, column: &str, references: Dataset) -> String {
    let pk = quote_ident(references.primary_key());
    format!(
        "SELECT COUNT(*) FROM {child} c LEFT JOIN {parent} p ON p.{pk} = c.{col} WHERE p.{pk} IS NULL",
        child = quote_ident(dataset.table()),
        parent = quote_ident(references.table()),
        pk = pk,
        col = quote_ident(column),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(counts: [(Dataset, u64); 3], orphans: u64) -> Verdict {
        Verdict {
            row_counts: counts.into_iter().collect(),
            orphan_checks: vec![OrphanCheck {
                dataset: Dataset::Orders,
                column: "customer_id".to_string(),
                references: Dataset::Customers,
                orphans,
            }],
        }
    }

    #[test]
    fn test_integrity_is_raised_before_row_count() {
        let v = verdict(
            [(Dataset::Customers, 3), (Dataset::Products, 3), (Dataset::Orders, 3)],
            2,
        );
        let err = PostLoadValidator::new(1000).enforce(&v).unwrap_err();
        assert_eq!(err.code(), "ReferentialIntegrityError");
        assert_eq!(v.orphans(), 2);
    }

    #[test]
    fn test_row_count_names_emptiest_short_table() {
        let v = verdict(
            [(Dataset::Customers, 1500), (Dataset::Products, 40), (Dataset::Orders, 900)],
            0,
        );
        match PostLoadValidator::new(1000).enforce(&v).unwrap_err() {
            PipelineError::RowCount {
                dataset,
                count,
                threshold,
            } => {
                assert_eq!(dataset, Dataset::Products);
                assert_eq!(count, 40);
                assert_eq!(threshold, 1000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overrides_relax_one_dataset() {
        let v = verdict(
            [(Dataset::Customers, 1500), (Dataset::Products, 40), (Dataset::Orders, 1200)],
            0,
        );
        let validator = PostLoadValidator::new(1000).with_threshold(Dataset::Products, 10);
        assert!(validator.enforce(&v).is_ok());
    }

    #[test]
    fn test_orphan_sql() {
        assert_eq!(
            orphan_sql(Dataset::Orders, "customer_id", Dataset::Customers),
            "SELECT COUNT(*) FROM \"orders\" c LEFT JOIN \"customers\" p ON p.\"customer_id\" = c.\"customer_id\" WHERE p.\"customer_id\" IS NULL"
        );
    }
}
