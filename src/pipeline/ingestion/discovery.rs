use crate::error::{PipelineError, Result};
use crate::types::{Dataset, EncodingKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Files of one encoding kind found in the intake directory, keyed by dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredSources {
    pub kind: EncodingKind,
    pub files: BTreeMap<Dataset, PathBuf>,
}

impl DiscoveredSources {
    pub fn empty(kind: EncodingKind) -> Self {
        Self {
            kind,
            files: BTreeMap::new(),
        }
    }
}

/// Scan `data_dir` for non-empty `<dataset>.<ext>` files of the given kind.
///
/// When both `.yaml` and `.yml` exist for a dataset the canonical suffix wins.
pub fn discover(data_dir: &Path, kind: EncodingKind) -> Result<DiscoveredSources> {
    let entries = fs::read_dir(data_dir).map_err(|e| {
        debug!("Cannot read {}: {}", data_dir.display(), e);
        PipelineError::MissingInput {
            paths: vec![data_dir.to_path_buf()],
        }
    })?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        if meta.len() == 0 {
            debug!("Skipping empty file {}", entry.path().display());
            continue;
        }
        candidates.push(entry.path());
    }

    let mut found = DiscoveredSources::empty(kind);
    for ext in kind.extensions() {
        for path in &candidates {
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext));
            if !matches_ext {
                continue;
            }
            let Some(dataset) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<Dataset>().ok())
            else {
                continue;
            };
            found.files.entry(dataset).or_insert_with(|| path.clone());
        }
    }

    debug!(
        "Discovered {} {} file(s) in {}",
        found.files.len(),
        kind,
        data_dir.display()
    );
    Ok(found)
}
