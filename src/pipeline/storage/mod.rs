// Destination storage: schema provisioning and bulk loading

pub mod loader;
pub mod provisioner;

use crate::error::{PipelineError, Result};
use libsql::Transaction;
use tracing::warn;

pub use loader::{BulkLoader, LoadSummary};
pub use provisioner::{ProvisionReport, SchemaProvisioner};

/// Commit on success, roll back on failure. The original error always wins
/// over a rollback error, which is only logged.
pub(crate) async fn settle<T, F>(tx: Transaction, outcome: Result<T>, on_commit_error: F) -> Result<T>
where
    F: FnOnce(String) -> PipelineError,
{
    match outcome {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| on_commit_error(format!("commit failed: {e}")))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rb) = tx.rollback().await {
                warn!("Rollback failed after '{}': {}", err, rb);
            }
            Err(err)
        }
    }
}
