// Pipeline ingestion: intake preconditions, per-encoding discovery, and source resolution

pub mod discovery;
pub mod preconditions;
pub mod resolver;

pub use discovery::{discover, DiscoveredSources};
pub use preconditions::{InputReport, PreconditionValidator};
pub use resolver::SourceResolver;
