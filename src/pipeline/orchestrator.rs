use crate::config::PipelineConfig;
use crate::db::DatabaseManager;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::graph::{NodeState, RunOutcome, TaskGraph, TaskId};
use crate::pipeline::processing::Verdict;
use crate::pipeline::storage::{LoadSummary, ProvisionReport};
use crate::pipeline::tasks::{
    create_task, CompletionReport, RunContext, TaskInputs, TaskOutput,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A node that ended in failure, with its stable error kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task: TaskId,
    pub code: String,
    pub message: String,
}

/// Everything the scheduler needs to audit one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub states: BTreeMap<TaskId, NodeState>,
    pub failures: Vec<TaskFailure>,
    pub provision: Option<ProvisionReport>,
    pub loads: Vec<LoadSummary>,
    pub verdict: Option<Verdict>,
    pub completion: Option<CompletionReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    pub fn state(&self, task: TaskId) -> NodeState {
        self.states.get(&task).copied().unwrap_or(NodeState::Pending)
    }

    pub fn failure(&self, task: TaskId) -> Option<&TaskFailure> {
        self.failures.iter().find(|f| f.task == task)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

type Finished = (TaskId, Duration, Result<TaskOutput>);

/// Drives one run of the task graph, admitting every node as soon as its
/// upstream nodes have succeeded.
pub struct PipelineOrchestrator {
    ctx: Arc<RunContext>,
}

impl PipelineOrchestrator {
    /// Validate the configuration and open the destination database.
    pub async fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let db = DatabaseManager::new(&config.database).await?;
        Ok(Self::with_context(RunContext { config, db }))
    }

    pub fn with_context(ctx: RunContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.ctx.config
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.ctx.db
    }

    /// Run the whole graph. Node failures are captured in the report rather
    /// than returned.
    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        self.run_graph(run_id).instrument(span).await
    }

    async fn run_graph(&self, run_id: Uuid) -> RunReport {
        let started_at = Utc::now();
        info!("🚀 Starting intake run from {}", self.ctx.config.data_dir.display());

        let mut graph = TaskGraph::new();
        let mut outputs: BTreeMap<TaskId, TaskOutput> = BTreeMap::new();
        let mut failures: Vec<TaskFailure> = Vec::new();
        let mut running: JoinSet<Finished> = JoinSet::new();

        loop {
            for task in graph.admissible() {
                if let Err(e) = graph.start(task) {
                    error!("{}", e);
                    continue;
                }
                let inputs: TaskInputs = task
                    .upstream()
                    .into_iter()
                    .filter_map(|u| outputs.get(&u).map(|o| (u, o.clone())))
                    .collect();
                info!("🔄 Starting {}", task);
                running.spawn(self.spawn_task(task, inputs));
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (task, elapsed, result) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    // The wrapper itself died; its node is swept up below.
                    error!("Task wrapper aborted: {}", e);
                    continue;
                }
            };

            match result {
                Ok(output) => {
                    info!("✅ {} succeeded in {:.2}s", task, elapsed.as_secs_f64());
                    metrics::tasks::finished(task, "succeeded", elapsed.as_secs_f64());
                    if let Err(e) = graph.succeed(task) {
                        error!("{}", e);
                    }
                    outputs.insert(task, output);
                }
                Err(err) => {
                    error!("❌ {} failed [{}]: {}", task, err.code(), err);
                    metrics::tasks::finished(task, "failed", elapsed.as_secs_f64());
                    failures.push(TaskFailure {
                        task,
                        code: err.code().to_string(),
                        message: err.to_string(),
                    });
                    match graph.fail(task) {
                        Ok(skipped) if !skipped.is_empty() => {
                            warn!("⏭️ Skipping {:?} after {} failed", skipped, task);
                        }
                        Ok(_) => {}
                        Err(e) => error!("{}", e),
                    }
                }
            }
        }

        // Anything still marked running lost its wrapper.
        let orphaned: Vec<TaskId> = if graph.is_settled() {
            Vec::new()
        } else {
            graph
                .states()
                .iter()
                .filter(|(_, s)| **s == NodeState::Running)
                .map(|(t, _)| *t)
                .collect()
        };
        for task in orphaned {
            failures.push(TaskFailure {
                task,
                code: "TaskAbortedError".to_string(),
                message: format!("Task '{task}' aborted before reporting"),
            });
            if let Err(e) = graph.fail(task) {
                error!("{}", e);
            }
        }

        let outcome = graph.outcome();
        metrics::run::finished(outcome);
        let report = build_report(run_id, started_at, outcome, &graph, failures, outputs);
        match outcome {
            RunOutcome::Succeeded => info!(
                "🎉 Run succeeded in {:.2}s",
                report.duration().num_milliseconds() as f64 / 1000.0
            ),
            RunOutcome::Failed => error!(
                "💥 Run failed: {}",
                report
                    .failures
                    .iter()
                    .map(|f| format!("{} ({})", f.task, f.code))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
        report
    }

    /// Execute one node on its own task so a panic is attributed to it.
    fn spawn_task(&self, task: TaskId, inputs: TaskInputs) -> impl std::future::Future<Output = Finished> + Send + 'static {
        let ctx = Arc::clone(&self.ctx);
        let span = info_span!("task", task = %task);
        async move {
            let started = Instant::now();
            let handle = tokio::spawn(
                async move {
                    let runner = create_task(task);
                    runner.execute(&ctx, &inputs).await
                }
                .instrument(span),
            );
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(PipelineError::TaskAborted {
                    task,
                    message: e.to_string(),
                }),
            };
            (task, started.elapsed(), result)
        }
    }

    /// Run a single node the way an external scheduler would.
    ///
    /// Read-only upstream nodes are recomputed to rebuild their messages;
    /// mutating ones (schema setup, loads) are assumed to have run already.
    pub async fn run_task(&self, task: TaskId) -> Result<TaskOutput> {
        let mut inputs = TaskInputs::new();
        for upstream in task.upstream().into_iter().filter(|t| t.is_read_only()) {
            info!("Rebuilding {} for {}", upstream, task);
            let output = create_task(upstream)
                .execute(&self.ctx, &TaskInputs::new())
                .await?;
            inputs.insert(upstream, output);
        }

        let started = Instant::now();
        let result = create_task(task)
            .execute(&self.ctx, &inputs)
            .instrument(info_span!("task", task = %task))
            .await;
        let outcome = if result.is_ok() { "succeeded" } else { "failed" };
        metrics::tasks::finished(task, outcome, started.elapsed().as_secs_f64());
        result
    }
}

fn build_report(
    run_id: Uuid,
    started_at: DateTime<Utc>,
    outcome: RunOutcome,
    graph: &TaskGraph,
    failures: Vec<TaskFailure>,
    outputs: BTreeMap<TaskId, TaskOutput>,
) -> RunReport {
    let mut report = RunReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        outcome,
        states: graph.states().clone(),
        failures,
        provision: None,
        loads: Vec::new(),
        verdict: None,
        completion: None,
    };
    for output in outputs.into_values() {
        match output {
            TaskOutput::DatabaseReady(provision) => report.provision = Some(provision),
            TaskOutput::Loaded(summary) => report.loads.push(summary),
            TaskOutput::Validated(verdict) => report.verdict = Some(verdict),
            TaskOutput::Completed(completion) => report.completion = Some(completion),
            TaskOutput::InputsValidated(_) | TaskOutput::Discovered(_) => {}
        }
    }
    report.loads.sort_by_key(|l| l.dataset);
    report
}
