use crate::pipeline::graph::TaskId;
use crate::types::Dataset;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A file that exists but failed its structural probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedFile {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for MalformedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_malformed(files: &[MalformedFile]) -> String {
    files
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Missing/empty input files: {}", join_paths(.paths))]
    MissingInput { paths: Vec<PathBuf> },

    #[error("Malformed input files: {}", join_malformed(.files))]
    MalformedInput { files: Vec<MalformedFile> },

    #[error("Schema provisioning failed: {message}")]
    Provisioning { message: String },

    #[error("No source file discovered for dataset '{dataset}'")]
    NoSource { dataset: Dataset },

    #[error("Unsupported file type: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("Loading '{dataset}' failed: {message}")]
    Load { dataset: Dataset, message: String },

    #[error("FK check failed: {orphans} {dataset} rows reference a {column} missing from {references}")]
    ReferentialIntegrity {
        dataset: Dataset,
        column: String,
        references: Dataset,
        orphans: u64,
    },

    #[error("Row count check failed: '{dataset}' has {count} rows, expected at least {threshold}")]
    RowCount {
        dataset: Dataset,
        count: u64,
        threshold: u64,
    },

    #[error("Archiving {} failed: {message}", .path.display())]
    Archive { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Task '{task}' is missing upstream output: {message}")]
    Upstream { task: TaskId, message: String },

    #[error("Task '{task}' aborted: {message}")]
    TaskAborted { task: TaskId, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable error kind, reported to the scheduler alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::MissingInput { .. } => "MissingInputError",
            PipelineError::MalformedInput { .. } => "MalformedInputError",
            PipelineError::Provisioning { .. } => "ProvisioningError",
            PipelineError::NoSource { .. } => "NoSourceError",
            PipelineError::UnsupportedFormat { .. } => "UnsupportedFormatError",
            PipelineError::Load { .. } => "LoadError",
            PipelineError::ReferentialIntegrity { .. } => "ReferentialIntegrityError",
            PipelineError::RowCount { .. } => "RowCountError",
            PipelineError::Archive { .. } => "ArchiveError",
            PipelineError::Config(_) => "ConfigError",
            PipelineError::Database { .. } => "DatabaseError",
            PipelineError::Upstream { .. } => "UpstreamError",
            PipelineError::TaskAborted { .. } => "TaskAbortedError",
            PipelineError::Io(_) => "IoError",
        }
    }

    pub fn database(message: impl fmt::Display) -> Self {
        PipelineError::Database {
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
