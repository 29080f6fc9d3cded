// Intake pipeline: ingestion, processing, storage, and the graph that binds them

pub mod archive;
pub mod graph;
pub mod ingestion;
pub mod orchestrator;
pub mod processing;
pub mod storage;
pub mod tasks;

pub use graph::{NodeState, RunOutcome, TaskGraph, TaskId};
pub use orchestrator::{PipelineOrchestrator, RunReport, TaskFailure};
pub use tasks::{RunContext, TaskOutput};
