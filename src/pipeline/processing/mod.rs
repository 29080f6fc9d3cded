// Pipeline processing: format reading, tabular records, and the post-load gate

pub mod quality_gate;
pub mod reader;
pub mod record_set;

pub use quality_gate::{OrphanCheck, PostLoadValidator, Verdict};
pub use record_set::{CellValue, RecordSet};
