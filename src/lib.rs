pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineOrchestrator, RunReport};
