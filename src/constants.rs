//! Defaults and environment variable names shared across the crate
use crate::types::{Dataset, EncodingKind};

// Default locations (relative to the working directory)
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_ARCHIVE_DIR: &str = "data_archive";
pub const DEFAULT_SCHEMA_PATH: &str = "sql/schema.sql";
pub const DEFAULT_DATABASE_URL: &str = "intake.db";
pub const DEFAULT_LOG_DIR: &str = "logs";

// Load and validation tunables
pub const DEFAULT_MIN_ROW_COUNT: u64 = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Upper bound on bind parameters in one statement (SQLite's compiled default).
pub const MAX_BIND_PARAMS: usize = 32_766;

// Environment overrides
pub const ENV_DATA_DIR: &str = "DATA_DIR";
pub const ENV_ARCHIVE_DIR: &str = "ARCHIVE_DIR";
pub const ENV_SCHEMA_PATH: &str = "SCHEMA_PATH";
pub const ENV_DATABASE_URL: &str = "LIBSQL_URL";
pub const ENV_DATABASE_AUTH_TOKEN: &str = "LIBSQL_AUTH_TOKEN";
pub const ENV_MIN_ROW_COUNT: &str = "MIN_ROW_COUNT";
pub const ENV_BATCH_SIZE: &str = "LOAD_BATCH_SIZE";
pub const ENV_ENCODING_PRECEDENCE: &str = "ENCODING_PRECEDENCE";
pub const ENV_INPUT_POLICY: &str = "INPUT_POLICY";
pub const ENV_ARCHIVE_COLLISION: &str = "ARCHIVE_COLLISION";

/// The nine file names an intake directory is expected to hold, dataset-major.
pub fn expected_file_names() -> Vec<String> {
    Dataset::ALL
        .into_iter()
        .flat_map(|d| EncodingKind::ALL.into_iter().map(move |k| d.file_name(k)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_file_names() {
        let names = expected_file_names();
        assert_eq!(names.len(), 9);
        assert_eq!(names[0], "customers.csv");
        assert_eq!(names[8], "orders.yaml");
    }
}
