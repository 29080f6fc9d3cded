use crate::config::CollisionPolicy;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedFile {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReport {
    pub archive_dir: PathBuf,
    pub files: Vec<ArchivedFile>,
}

/// Moves every regular file out of the intake directory once a run has
/// validated. Names are preserved unless the collision policy says otherwise.
pub struct Archiver {
    intake_dir: PathBuf,
    archive_dir: PathBuf,
    policy: CollisionPolicy,
}

fn archive_error(path: &Path, message: impl Into<String>) -> PipelineError {
    PipelineError::Archive {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

impl Archiver {
    pub fn new(intake_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>, policy: CollisionPolicy) -> Self {
        Self {
            intake_dir: intake_dir.into(),
            archive_dir: archive_dir.into(),
            policy,
        }
    }

    /// Move the intake files. A failed move stops the archive; files moved
    /// before it stay where they landed.
    pub fn archive(&self) -> Result<ArchiveReport> {
        fs::create_dir_all(&self.archive_dir)
            .map_err(|e| archive_error(&self.archive_dir, format!("cannot create archive directory: {e}")))?;

        let pending = self.intake_files()?;
        if self.policy == CollisionPolicy::Reject {
            let taken: Vec<String> = pending
                .iter()
                .filter_map(|p| p.file_name())
                .filter(|name| self.archive_dir.join(name).exists())
                .map(|name| name.to_string_lossy().into_owned())
                .collect();
            if !taken.is_empty() {
                return Err(archive_error(
                    &self.archive_dir,
                    format!("already archived: {}", taken.join(", ")),
                ));
            }
        }

        let stamp = Utc::now();
        let mut files = Vec::with_capacity(pending.len());
        for from in pending {
            let to = self.destination(&from, stamp)?;
            move_file(&from, &to)?;
            debug!("Archived {} -> {}", from.display(), to.display());
            metrics::archive::file_archived();
            files.push(ArchivedFile { from, to });
        }

        info!(
            "Archived {} file(s) to {}",
            files.len(),
            self.archive_dir.display()
        );
        Ok(ArchiveReport {
            archive_dir: self.archive_dir.clone(),
            files,
        })
    }

    fn intake_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.intake_dir)
            .map_err(|e| archive_error(&self.intake_dir, format!("cannot list intake directory: {e}")))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| archive_error(&self.intake_dir, e.to_string()))?;
            let is_file = entry
                .file_type()
                .map_err(|e| archive_error(&entry.path(), e.to_string()))?
                .is_file();
            if is_file {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn destination(&self, from: &Path, stamp: DateTime<Utc>) -> Result<PathBuf> {
        let name = from
            .file_name()
            .ok_or_else(|| archive_error(from, "path has no file name"))?;
        let plain = self.archive_dir.join(name);
        if !plain.exists() {
            return Ok(plain);
        }
        match self.policy {
            CollisionPolicy::Reject => Err(archive_error(&plain, "destination already exists")),
            CollisionPolicy::Overwrite => {
                warn!("Overwriting archived {}", plain.display());
                Ok(plain)
            }
            CollisionPolicy::TimestampSuffix => {
                let stem = from
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let ext = from
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default();
                let ts = stamp.format("%Y%m%dT%H%M%SZ");
                let mut candidate = self.archive_dir.join(format!("{stem}.{ts}{ext}"));
                let mut n = 1;
                while candidate.exists() {
                    candidate = self.archive_dir.join(format!("{stem}.{ts}-{n}{ext}"));
                    n += 1;
                }
                Ok(candidate)
            }
        }
    }
}

/// Rename, falling back to copy-and-remove across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|e| archive_error(from, format!("copy to {} failed: {e}", to.display())))?;
    fs::remove_file(from).map_err(|e| archive_error(from, format!("remove after copy failed: {e}")))?;
    Ok(())
}
