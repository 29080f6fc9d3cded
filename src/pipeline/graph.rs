//! The run's task graph: node identities, edges and admission.
//!
//! A node is admitted only once every upstream node has succeeded. A failed
//! or skipped node skips all of its still-pending descendants.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskId {
    FileValidation,
    DbSetup,
    ExtractCsv,
    ExtractJson,
    ExtractYaml,
    LoadCustomers,
    LoadProducts,
    LoadOrders,
    Validate,
    Completion,
}

use TaskId::*;

const EXTRACTS: [TaskId; 3] = [ExtractCsv, ExtractJson, ExtractYaml];

impl TaskId {
    pub const ALL: [TaskId; 10] = [
        FileValidation,
        DbSetup,
        ExtractCsv,
        ExtractJson,
        ExtractYaml,
        LoadCustomers,
        LoadProducts,
        LoadOrders,
        Validate,
        Completion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FileValidation => "file_validation",
            DbSetup => "db_setup",
            ExtractCsv => "extract_csv",
            ExtractJson => "extract_json",
            ExtractYaml => "extract_yaml",
            LoadCustomers => "load_customers",
            LoadProducts => "load_products",
            LoadOrders => "load_orders",
            Validate => "validate",
            Completion => "completion",
        }
    }

    /// Direct upstream nodes.
    pub fn upstream(self) -> Vec<TaskId> {
        match self {
            FileValidation | ExtractCsv | ExtractJson | ExtractYaml => vec![],
            // Destination mutation waits for the intake check.
            DbSetup => vec![FileValidation],
            LoadCustomers | LoadProducts => {
                let mut up = vec![FileValidation, DbSetup];
                up.extend(EXTRACTS);
                up
            }
            LoadOrders => {
                let mut up = vec![FileValidation, DbSetup];
                up.extend(EXTRACTS);
                up.push(LoadCustomers);
                up
            }
            Validate => vec![LoadCustomers, LoadProducts, LoadOrders],
            Completion => vec![Validate],
        }
    }

    /// Nodes that only read the filesystem or the database. These can be
    /// recomputed to rebuild an upstream message when one node runs alone.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            FileValidation | ExtractCsv | ExtractJson | ExtractYaml | Validate
        )
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_ascii_lowercase();
        TaskId::ALL
            .into_iter()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| PipelineError::Config(format!("unknown task '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl NodeState {
    fn blocks_downstream(self) -> bool {
        matches!(self, NodeState::Failed | NodeState::Skipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("task '{0}' is not admissible")]
    NotAdmissible(TaskId),
    #[error("task '{0}' is not running")]
    NotRunning(TaskId),
}

/// Mutable state of one run's graph.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    states: BTreeMap<TaskId, NodeState>,
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGraph {
    pub fn new() -> Self {
        Self {
            states: TaskId::ALL.into_iter().map(|t| (t, NodeState::Pending)).collect(),
        }
    }

    pub fn state(&self, task: TaskId) -> NodeState {
        self.states.get(&task).copied().unwrap_or(NodeState::Pending)
    }

    pub fn states(&self) -> &BTreeMap<TaskId, NodeState> {
        &self.states
    }

    /// Pending nodes whose upstream nodes have all succeeded.
    pub fn admissible(&self) -> Vec<TaskId> {
        TaskId::ALL
            .into_iter()
            .filter(|t| self.state(*t) == NodeState::Pending)
            .filter(|t| t.upstream().iter().all(|u| self.state(*u) == NodeState::Succeeded))
            .collect()
    }

    pub fn start(&mut self, task: TaskId) -> Result<(), GraphError> {
        if !self.admissible().contains(&task) {
            return Err(GraphError::NotAdmissible(task));
        }
        self.states.insert(task, NodeState::Running);
        Ok(())
    }

    pub fn succeed(&mut self, task: TaskId) -> Result<(), GraphError> {
        self.finish(task, NodeState::Succeeded)?;
        Ok(())
    }

    /// Mark a running node failed and skip everything it blocks. Returns the
    /// nodes that were newly skipped.
    pub fn fail(&mut self, task: TaskId) -> Result<Vec<TaskId>, GraphError> {
        self.finish(task, NodeState::Failed)?;
        Ok(self.propagate_skips())
    }

    fn finish(&mut self, task: TaskId, state: NodeState) -> Result<(), GraphError> {
        if self.state(task) != NodeState::Running {
            return Err(GraphError::NotRunning(task));
        }
        self.states.insert(task, state);
        Ok(())
    }

    fn propagate_skips(&mut self) -> Vec<TaskId> {
        let mut skipped = Vec::new();
        // Topological order lets one pass carry skips transitively.
        for task in Self::topological_order() {
            if self.state(task) != NodeState::Pending {
                continue;
            }
            if task.upstream().iter().any(|u| self.state(*u).blocks_downstream()) {
                self.states.insert(task, NodeState::Skipped);
                skipped.push(task);
            }
        }
        skipped
    }

    /// True once nothing is running and nothing more can be admitted.
    pub fn is_settled(&self) -> bool {
        !self.states.values().any(|s| *s == NodeState::Running) && self.admissible().is_empty()
    }

    /// A run succeeds only if every node succeeded.
    pub fn outcome(&self) -> RunOutcome {
        if self.states.values().all(|s| *s == NodeState::Succeeded) {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Failed
        }
    }

    /// Kahn's algorithm over the static edges; ties broken by declaration order.
    pub fn topological_order() -> Vec<TaskId> {
        let mut indegree: BTreeMap<TaskId, usize> =
            TaskId::ALL.into_iter().map(|t| (t, t.upstream().len())).collect();
        let mut ready: VecDeque<TaskId> = TaskId::ALL
            .into_iter()
            .filter(|t| indegree[t] == 0)
            .collect();
        let mut order = Vec::with_capacity(TaskId::ALL.len());
        while let Some(task) = ready.pop_front() {
            order.push(task);
            for next in Self::downstream(task) {
                if let Some(d) = indegree.get_mut(&next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(next);
                    }
                }
            }
        }
        order
    }

    /// Direct downstream nodes.
    pub fn downstream(task: TaskId) -> Vec<TaskId> {
        TaskId::ALL
            .into_iter()
            .filter(|t| t.upstream().contains(&task))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_ok(graph: &mut TaskGraph, task: TaskId) {
        graph.start(task).unwrap();
        graph.succeed(task).unwrap();
    }

    #[test]
    fn test_initial_admission() {
        let graph = TaskGraph::new();
        assert_eq!(
            graph.admissible(),
            vec![FileValidation, ExtractCsv, ExtractJson, ExtractYaml]
        );
    }

    #[test]
    fn test_orders_wait_for_customers() {
        let mut graph = TaskGraph::new();
        for t in [FileValidation, DbSetup, ExtractCsv, ExtractJson, ExtractYaml] {
            run_ok(&mut graph, t);
        }
        assert_eq!(graph.admissible(), vec![LoadCustomers, LoadProducts]);
        assert_eq!(graph.start(LoadOrders), Err(GraphError::NotAdmissible(LoadOrders)));

        run_ok(&mut graph, LoadCustomers);
        assert_eq!(graph.admissible(), vec![LoadProducts, LoadOrders]);
    }

    #[test]
    fn test_failure_skips_transitively() {
        let mut graph = TaskGraph::new();
        graph.start(FileValidation).unwrap();
        let skipped = graph.fail(FileValidation).unwrap();
        assert_eq!(
            skipped,
            vec![DbSetup, LoadCustomers, LoadProducts, LoadOrders, Validate, Completion]
        );
        // Extracts do not depend on the intake check.
        assert_eq!(graph.admissible(), vec![ExtractCsv, ExtractJson, ExtractYaml]);
        for t in EXTRACTS {
            run_ok(&mut graph, t);
        }
        assert!(graph.is_settled());
        assert_eq!(graph.outcome(), RunOutcome::Failed);
    }

    #[test]
    fn test_validate_failure_skips_completion_only() {
        let mut graph = TaskGraph::new();
        for t in TaskGraph::topological_order() {
            if t == Validate {
                break;
            }
            run_ok(&mut graph, t);
        }
        graph.start(Validate).unwrap();
        assert_eq!(graph.fail(Validate).unwrap(), vec![Completion]);
        assert_eq!(graph.state(LoadOrders), NodeState::Succeeded);
    }

    #[test]
    fn test_full_success() {
        let mut graph = TaskGraph::new();
        for t in TaskGraph::topological_order() {
            run_ok(&mut graph, t);
        }
        assert!(graph.is_settled());
        assert_eq!(graph.outcome(), RunOutcome::Succeeded);
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let order = TaskGraph::topological_order();
        assert_eq!(order.len(), TaskId::ALL.len());
        let pos = |t: TaskId| order.iter().position(|x| *x == t).unwrap();
        for t in TaskId::ALL {
            for u in t.upstream() {
                assert!(pos(u) < pos(t), "{u} must precede {t}");
            }
        }
        assert_eq!(order.last(), Some(&Completion));
    }

    #[test]
    fn test_cannot_finish_unstarted_node() {
        let mut graph = TaskGraph::new();
        assert_eq!(graph.succeed(Validate), Err(GraphError::NotRunning(Validate)));
    }

    #[test]
    fn test_parse_task_names() {
        assert_eq!("load-orders".parse::<TaskId>().unwrap(), LoadOrders);
        assert_eq!("db_setup".parse::<TaskId>().unwrap(), DbSetup);
        assert!("nope".parse::<TaskId>().is_err());
    }
}
