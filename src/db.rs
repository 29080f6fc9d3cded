use crate::config::DatabaseConfig;
use crate::error::{PipelineError, Result};
use libsql::{Builder, Connection, Database};
use tracing::{debug, info};

/// Owns the libSQL database handle and hands out one connection per stage.
pub struct DatabaseManager {
    db: Database,
    local: bool,
    busy_timeout_ms: u64,
}

impl DatabaseManager {
    /// Open a local file database or connect to a remote libSQL/Turso one.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let built = if config.is_remote() {
            let token = config.auth_token.clone().ok_or_else(|| {
                PipelineError::Config(
                    "LIBSQL_AUTH_TOKEN must be set for a remote database".to_string(),
                )
            })?;
            info!("Connecting to remote database at {}", config.url);
            Builder::new_remote(config.url.clone(), token).build().await
        } else {
            info!("Opening local database at {}", config.url);
            Builder::new_local(&config.url).build().await
        };
        let db = built
            .map_err(|e| PipelineError::database(format!("Failed to open database: {e}")))?;

        let manager = Self {
            db,
            local: !config.is_remote(),
            busy_timeout_ms: config.busy_timeout_ms,
        };
        if manager.local {
            let conn = manager.get_connection().await?;
            pragma(&conn, "PRAGMA journal_mode=WAL").await?;
        }
        Ok(manager)
    }

    /// Get a fresh connection. Callers drop it when their stage ends.
    pub async fn get_connection(&self) -> Result<Connection> {
        let conn = self
            .db
            .connect()
            .map_err(|e| PipelineError::database(format!("Failed to get database connection: {e}")))?;
        if self.local {
            pragma(&conn, &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms)).await?;
            // Integrity is checked after loading, not row by row.
            pragma(&conn, "PRAGMA foreign_keys = OFF").await?;
        }
        Ok(conn)
    }
}

/// Run a PRAGMA that may answer with a row. The row is discarded.
async fn pragma(conn: &Connection, sql: &str) -> Result<()> {
    debug!("{}", sql);
    let mut rows = conn
        .query(sql, libsql::params![])
        .await
        .map_err(|e| PipelineError::database(format!("{sql} failed: {e}")))?;
    while rows
        .next()
        .await
        .map_err(|e| PipelineError::database(format!("{sql} failed: {e}")))?
        .is_some()
    {}
    Ok(())
}

/// Read a single integer from the first column of the first row.
pub async fn query_count(conn: &Connection, sql: &str) -> Result<u64> {
    let mut rows = conn
        .query(sql, libsql::params![])
        .await
        .map_err(|e| PipelineError::database(format!("Failed to run '{sql}': {e}")))?;
    let row = rows
        .next()
        .await
        .map_err(|e| PipelineError::database(format!("Failed to read row: {e}")))?
        .ok_or_else(|| PipelineError::database(format!("'{sql}' returned no rows")))?;
    let count: i64 = row
        .get(0)
        .map_err(|e| PipelineError::database(format!("Failed to read count: {e}")))?;
    Ok(count.max(0) as u64)
}

/// Quote an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
