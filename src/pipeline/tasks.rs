use crate::config::PipelineConfig;
use crate::db::DatabaseManager;
use crate::error::{PipelineError, Result};
use crate::pipeline::archive::{ArchiveReport, Archiver};
use crate::pipeline::graph::TaskId;
use crate::pipeline::ingestion::{discover, DiscoveredSources, InputReport, PreconditionValidator, SourceResolver};
use crate::pipeline::processing::{reader, PostLoadValidator, Verdict};
use crate::pipeline::storage::{BulkLoader, LoadSummary, ProvisionReport, SchemaProvisioner};
use crate::types::{Dataset, EncodingKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Shared, read-only state handed to every task of a run.
pub struct RunContext {
    pub config: PipelineConfig,
    pub db: DatabaseManager,
}

/// Completion's message: the archive plus a one-line summary of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub summary: String,
    pub archive: ArchiveReport,
}

/// The typed message a node passes along its outgoing edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TaskOutput {
    InputsValidated(InputReport),
    DatabaseReady(ProvisionReport),
    Discovered(DiscoveredSources),
    Loaded(LoadSummary),
    Validated(Verdict),
    Completed(CompletionReport),
}

/// Upstream messages, keyed by the node that produced them.
pub type TaskInputs = BTreeMap<TaskId, TaskOutput>;

/// Common trait for all graph nodes
#[async_trait]
pub trait PipelineTask: Send + Sync {
    fn id(&self) -> TaskId;

    /// Execute this node given its upstream messages.
    async fn execute(&self, ctx: &RunContext, inputs: &TaskInputs) -> Result<TaskOutput>;
}

/// Create the task behind a node
pub fn create_task(id: TaskId) -> Box<dyn PipelineTask> {
    match id {
        TaskId::FileValidation => Box::new(FileValidationTask),
        TaskId::DbSetup => Box::new(DbSetupTask),
        TaskId::ExtractCsv => Box::new(ExtractTask::new(EncodingKind::Csv)),
        TaskId::ExtractJson => Box::new(ExtractTask::new(EncodingKind::Json)),
        TaskId::ExtractYaml => Box::new(ExtractTask::new(EncodingKind::Yaml)),
        TaskId::LoadCustomers => Box::new(LoadTask::new(Dataset::Customers)),
        TaskId::LoadProducts => Box::new(LoadTask::new(Dataset::Products)),
        TaskId::LoadOrders => Box::new(LoadTask::new(Dataset::Orders)),
        TaskId::Validate => Box::new(ValidateTask),
        TaskId::Completion => Box::new(CompletionTask),
    }
}

/// Run blocking filesystem work off the async workers.
async fn blocking<T, F>(task: TaskId, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PipelineError::TaskAborted {
            task,
            message: e.to_string(),
        })?
}

pub struct FileValidationTask;

#[async_trait]
impl PipelineTask for FileValidationTask {
    fn id(&self) -> TaskId {
        TaskId::FileValidation
    }

    async fn execute(&self, ctx: &RunContext, _inputs: &TaskInputs) -> Result<TaskOutput> {
        let validator = PreconditionValidator::new(&ctx.config.data_dir, ctx.config.input_policy);
        let report = blocking(self.id(), move || validator.validate()).await?;
        Ok(TaskOutput::InputsValidated(report))
    }
}

pub struct DbSetupTask;

#[async_trait]
impl PipelineTask for DbSetupTask {
    fn id(&self) -> TaskId {
        TaskId::DbSetup
    }

    async fn execute(&self, ctx: &RunContext, _inputs: &TaskInputs) -> Result<TaskOutput> {
        let conn = ctx.db.get_connection().await?;
        let report = SchemaProvisioner::new(&ctx.config.schema_path)
            .provision(&conn)
            .await?;
        Ok(TaskOutput::DatabaseReady(report))
    }
}

pub struct ExtractTask {
    kind: EncodingKind,
}

impl ExtractTask {
    pub fn new(kind: EncodingKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl PipelineTask for ExtractTask {
    fn id(&self) -> TaskId {
        match self.kind {
            EncodingKind::Csv => TaskId::ExtractCsv,
            EncodingKind::Json => TaskId::ExtractJson,
            EncodingKind::Yaml => TaskId::ExtractYaml,
        }
    }

    async fn execute(&self, ctx: &RunContext, _inputs: &TaskInputs) -> Result<TaskOutput> {
        let data_dir = ctx.config.data_dir.clone();
        let kind = self.kind;
        let found = blocking(self.id(), move || discover(&data_dir, kind)).await?;
        Ok(TaskOutput::Discovered(found))
    }
}

pub struct LoadTask {
    dataset: Dataset,
}

impl LoadTask {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }
}

#[async_trait]
impl PipelineTask for LoadTask {
    fn id(&self) -> TaskId {
        match self.dataset {
            Dataset::Customers => TaskId::LoadCustomers,
            Dataset::Products => TaskId::LoadProducts,
            Dataset::Orders => TaskId::LoadOrders,
        }
    }

    async fn execute(&self, ctx: &RunContext, inputs: &TaskInputs) -> Result<TaskOutput> {
        let discovered: Vec<DiscoveredSources> = inputs
            .values()
            .filter_map(|output| match output {
                TaskOutput::Discovered(found) => Some(found.clone()),
                _ => None,
            })
            .collect();
        let encoding = SourceResolver::new(ctx.config.encoding_precedence.clone())
            .resolve(self.dataset, &discovered)?;
        info!("Loading {} from {}", self.dataset, encoding);

        let source = encoding.kind;
        let records = blocking(self.id(), move || reader::read(&encoding)).await?;

        let conn = ctx.db.get_connection().await?;
        let rows = BulkLoader::new(ctx.config.batch_size)
            .load(&conn, self.dataset, &records)
            .await?;
        Ok(TaskOutput::Loaded(LoadSummary {
            dataset: self.dataset,
            source,
            rows,
        }))
    }
}

pub struct ValidateTask;

#[async_trait]
impl PipelineTask for ValidateTask {
    fn id(&self) -> TaskId {
        TaskId::Validate
    }

    async fn execute(&self, ctx: &RunContext, _inputs: &TaskInputs) -> Result<TaskOutput> {
        let conn = ctx.db.get_connection().await?;
        let verdict = PostLoadValidator::from_config(&ctx.config)
            .validate(&conn)
            .await?;
        Ok(TaskOutput::Validated(verdict))
    }
}

pub struct CompletionTask;

/// `success: customers=1500, products=1500, orders=1500`
pub fn completion_summary(verdict: &Verdict) -> String {
    let counts = verdict
        .row_counts
        .iter()
        .map(|(dataset, count)| format!("{dataset}={count}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("success: {counts}")
}

#[async_trait]
impl PipelineTask for CompletionTask {
    fn id(&self) -> TaskId {
        TaskId::Completion
    }

    async fn execute(&self, ctx: &RunContext, inputs: &TaskInputs) -> Result<TaskOutput> {
        let verdict = match inputs.get(&TaskId::Validate) {
            Some(TaskOutput::Validated(verdict)) => verdict,
            _ => {
                return Err(PipelineError::Upstream {
                    task: self.id(),
                    message: "no validation verdict; refusing to archive".to_string(),
                })
            }
        };

        let archiver = Archiver::new(
            &ctx.config.data_dir,
            &ctx.config.archive_dir,
            ctx.config.archive_collision,
        );
        let archive = blocking(self.id(), move || archiver.archive()).await?;
        let summary = completion_summary(verdict);
        info!("{}", summary);
        Ok(TaskOutput::Completed(CompletionReport { summary, archive }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_node_has_a_task() {
        for id in TaskId::ALL {
            assert_eq!(create_task(id).id(), id);
        }
    }

    #[test]
    fn test_completion_summary() {
        let verdict = Verdict {
            row_counts: Dataset::ALL.into_iter().map(|d| (d, 1500)).collect(),
            orphan_checks: Vec::new(),
        };
        assert_eq!(
            completion_summary(&verdict),
            "success: customers=1500, products=1500, orders=1500"
        );
    }

    #[test]
    fn test_output_serializes_tagged() {
        let output = TaskOutput::Loaded(LoadSummary {
            dataset: Dataset::Orders,
            source: EncodingKind::Yaml,
            rows: 3,
        });
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["kind"], "loaded");
        assert_eq!(json["value"]["dataset"], "orders");
        assert_eq!(json["value"]["rows"], 3);
    }
}
