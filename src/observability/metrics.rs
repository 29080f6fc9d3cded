//! Metrics for the intake pipeline
//!
//! Recording goes through the `metrics` facade using Prometheus naming
//! conventions. Without an installed recorder every call is a no-op, so
//! library users and tests pay nothing.

use crate::pipeline::graph::{RunOutcome, TaskId};
use crate::types::Dataset;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt;
use std::sync::OnceLock;
use tracing::info;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Task metrics
    TaskRuns,
    TaskDuration,

    // Load metrics
    RowsLoaded,

    // Validation metrics
    OrphanedRows,
    TableRows,

    // Archive metrics
    FilesArchived,

    // Run metrics
    Runs,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::TaskRuns => "etl_task_runs_total",
            MetricName::TaskDuration => "etl_task_duration_seconds",
            MetricName::RowsLoaded => "etl_rows_loaded_total",
            MetricName::OrphanedRows => "etl_orphaned_rows",
            MetricName::TableRows => "etl_table_rows",
            MetricName::FilesArchived => "etl_files_archived_total",
            MetricName::Runs => "etl_runs_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            TaskRuns,
            TaskDuration,
            RowsLoaded,
            OrphanedRows,
            TableRows,
            FilesArchived,
            Runs,
        ]
        .into_iter()
    }

    /// (phase, description, unit)
    pub fn metadata(&self) -> (&'static str, &'static str, Option<&'static str>) {
        match self {
            MetricName::TaskRuns => ("tasks", "Graph node executions by outcome", None),
            MetricName::TaskDuration => ("tasks", "Graph node wall time", Some("s")),
            MetricName::RowsLoaded => ("load", "Rows committed per dataset", None),
            MetricName::OrphanedRows => ("validation", "Rows failing a foreign-key check", None),
            MetricName::TableRows => ("validation", "Rows per destination table after loading", None),
            MetricName::FilesArchived => ("archive", "Intake files moved to the archive", None),
            MetricName::Runs => ("run", "Finished runs by outcome", None),
        }
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE.set(handle).ok();
    for metric in MetricName::all_metrics() {
        let (phase, description, _) = metric.metadata();
        let text = format!("[{phase}] {description}");
        match metric {
            MetricName::TaskDuration => ::metrics::describe_histogram!(metric.as_str(), text),
            MetricName::OrphanedRows | MetricName::TableRows => {
                ::metrics::describe_gauge!(metric.as_str(), text)
            }
            _ => ::metrics::describe_counter!(metric.as_str(), text),
        }
    }
    info!("Metrics system initialized");
    Ok(())
}

/// Prometheus exposition text, when a recorder is installed.
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

// ============================================================================
// Task Metrics
// ============================================================================

pub mod tasks {
    use super::{MetricName, TaskId};

    /// Record a finished node
    pub fn finished(task: TaskId, outcome: &'static str, secs: f64) {
        ::metrics::counter!(MetricName::TaskRuns.as_str(),
            "task" => task.name(),
            "outcome" => outcome
        )
        .increment(1);
        ::metrics::histogram!(MetricName::TaskDuration.as_str(), "task" => task.name()).record(secs);
    }
}

// ============================================================================
// Load Metrics
// ============================================================================

pub mod load {
    use super::{Dataset, MetricName};

    pub fn rows_loaded(dataset: Dataset, rows: u64) {
        ::metrics::counter!(MetricName::RowsLoaded.as_str(), "dataset" => dataset.name()).increment(rows);
    }
}

// ============================================================================
// Validation Metrics
// ============================================================================

pub mod validation {
    use super::{Dataset, MetricName};

    pub fn orphaned_rows(dataset: Dataset, column: &'static str, orphans: u64) {
        ::metrics::gauge!(MetricName::OrphanedRows.as_str(),
            "dataset" => dataset.name(),
            "column" => column
        )
        .set(orphans as f64);
    }

    pub fn row_count(dataset: Dataset, rows: u64) {
        ::metrics::gauge!(MetricName::TableRows.as_str(), "dataset" => dataset.name()).set(rows as f64);
    }
}

// ============================================================================
// Archive Metrics
// ============================================================================

pub mod archive {
    use super::MetricName;

    pub fn file_archived() {
        ::metrics::counter!(MetricName::FilesArchived.as_str()).increment(1);
    }
}

// ============================================================================
// Run Metrics
// ============================================================================

pub mod run {
    use super::{MetricName, RunOutcome};

    pub fn finished(outcome: RunOutcome) {
        let outcome = match outcome {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed => "failed",
        };
        ::metrics::counter!(MetricName::Runs.as_str(), "outcome" => outcome).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed_and_unique() {
        let names: Vec<_> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        assert!(names.iter().all(|n| n.starts_with("etl_")));
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        load::rows_loaded(Dataset::Customers, 10);
        archive::file_archived();
        run::finished(RunOutcome::Failed);
    }
}
