use super::discovery::DiscoveredSources;
use crate::error::{PipelineError, Result};
use crate::types::{Dataset, Encoding, EncodingKind};
use tracing::debug;

/// Picks exactly one encoding per dataset by a fixed precedence. Encodings
/// are never merged.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    precedence: Vec<EncodingKind>,
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::new(EncodingKind::ALL.to_vec())
    }
}

impl SourceResolver {
    pub fn new(precedence: Vec<EncodingKind>) -> Self {
        Self { precedence }
    }

    pub fn resolve(&self, dataset: Dataset, discovered: &[DiscoveredSources]) -> Result<Encoding> {
        for kind in &self.precedence {
            let hit = discovered
                .iter()
                .filter(|d| d.kind == *kind)
                .find_map(|d| d.files.get(&dataset));
            if let Some(path) = hit {
                debug!("Resolved {} to {}", dataset, path.display());
                return Ok(Encoding::new(dataset, *kind, path.clone()));
            }
        }
        Err(PipelineError::NoSource { dataset })
    }
}
