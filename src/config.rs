use crate::constants::*;
use crate::error::{PipelineError, Result};
use crate::types::{Dataset, EncodingKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// How strictly the intake directory is checked before anything is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputPolicy {
    /// All nine `<dataset>.<encoding>` files must be present and non-empty.
    #[default]
    AllEncodings,
    /// Each dataset needs at least one non-empty encoding. Empty files still fail.
    AnyEncoding,
}

impl FromStr for InputPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all_encodings" | "all" => Ok(InputPolicy::AllEncodings),
            "any_encoding" | "any" => Ok(InputPolicy::AnyEncoding),
            other => Err(PipelineError::Config(format!("unknown input policy '{other}'"))),
        }
    }
}

/// What the archiver does when the destination name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Fail before moving anything.
    Reject,
    /// Replace the archived file.
    Overwrite,
    /// Keep both: the incoming file gets a UTC timestamp before its extension.
    #[default]
    TimestampSuffix,
}

impl FromStr for CollisionPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(CollisionPolicy::Reject),
            "overwrite" => Ok(CollisionPolicy::Overwrite),
            "timestamp_suffix" | "timestamp" => Ok(CollisionPolicy::TimestampSuffix),
            other => Err(PipelineError::Config(format!(
                "unknown archive collision policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Local file path, or a `libsql://` / `https://` URL for a remote database.
    pub url: String,
    pub auth_token: Option<String>,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            auth_token: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl DatabaseConfig {
    pub fn is_remote(&self) -> bool {
        ["libsql://", "http://", "https://", "wss://", "ws://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
    }
}

/// Everything a run needs, passed explicitly into the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub schema_path: PathBuf,
    pub database: DatabaseConfig,
    pub min_row_count: u64,
    pub min_row_count_overrides: BTreeMap<Dataset, u64>,
    pub batch_size: usize,
    pub encoding_precedence: Vec<EncodingKind>,
    pub input_policy: InputPolicy,
    pub archive_collision: CollisionPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            schema_path: PathBuf::from(DEFAULT_SCHEMA_PATH),
            database: DatabaseConfig::default(),
            min_row_count: DEFAULT_MIN_ROW_COUNT,
            min_row_count_overrides: BTreeMap::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            encoding_precedence: EncodingKind::ALL.to_vec(),
            input_policy: InputPolicy::default(),
            archive_collision: CollisionPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file, then apply environment overrides.
    ///
    /// An explicit `path` must exist. Without one, `config.toml` in the working
    /// directory is used when present and defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PipelineError::Config(format!("Invalid config: {e}")))
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_ARCHIVE_DIR) {
            self.archive_dir = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_SCHEMA_PATH) {
            self.schema_path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_DATABASE_URL) {
            self.database.url = v;
        }
        if let Some(v) = get(ENV_DATABASE_AUTH_TOKEN) {
            self.database.auth_token = Some(v);
        }
        if let Some(v) = get(ENV_MIN_ROW_COUNT) {
            self.min_row_count = parse_number(ENV_MIN_ROW_COUNT, &v)?;
        }
        if let Some(v) = get(ENV_BATCH_SIZE) {
            self.batch_size = parse_number(ENV_BATCH_SIZE, &v)?;
        }
        if let Some(v) = get(ENV_ENCODING_PRECEDENCE) {
            self.encoding_precedence = v
                .split(',')
                .map(str::parse::<EncodingKind>)
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(v) = get(ENV_INPUT_POLICY) {
            self.input_policy = v.parse()?;
        }
        if let Some(v) = get(ENV_ARCHIVE_COLLISION) {
            self.archive_collision = v.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch_size must be at least 1".into()));
        }
        if self.encoding_precedence.is_empty() {
            return Err(PipelineError::Config(
                "encoding_precedence must name at least one encoding".into(),
            ));
        }
        let mut seen = HashSet::new();
        for kind in &self.encoding_precedence {
            if !seen.insert(kind) {
                return Err(PipelineError::Config(format!(
                    "encoding '{kind}' appears twice in encoding_precedence"
                )));
            }
        }
        for (name, path) in [
            ("data_dir", &self.data_dir),
            ("archive_dir", &self.archive_dir),
            ("schema_path", &self.schema_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(PipelineError::Config(format!("{name} must not be empty")));
            }
        }
        if self.data_dir == self.archive_dir {
            return Err(PipelineError::Config(
                "archive_dir must differ from data_dir".into(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(PipelineError::Config("database.url must not be empty".into()));
        }
        Ok(())
    }

    /// Minimum rows the given table must hold after loading.
    pub fn min_rows_for(&self, dataset: Dataset) -> u64 {
        self.min_row_count_overrides
            .get(&dataset)
            .copied()
            .unwrap_or(self.min_row_count)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PipelineError::Config(format!("{key} must be a non-negative integer, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.min_row_count, 1000);
        assert_eq!(
            config.encoding_precedence,
            vec![EncodingKind::Csv, EncodingKind::Json, EncodingKind::Yaml]
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            data_dir = "/srv/intake"
            batch_size = 250
            encoding_precedence = ["yaml", "csv"]

            [database]
            url = "libsql://example.turso.io"

            [min_row_count_overrides]
            products = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/intake"));
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.archive_dir, PathBuf::from(DEFAULT_ARCHIVE_DIR));
        assert_eq!(config.encoding_precedence, vec![EncodingKind::Yaml, EncodingKind::Csv]);
        assert!(config.database.is_remote());
        assert_eq!(config.min_rows_for(Dataset::Products), 10);
        assert_eq!(config.min_rows_for(Dataset::Orders), 1000);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DATA_DIR, "/tmp/in"),
            (ENV_MIN_ROW_COUNT, "5"),
            (ENV_ENCODING_PRECEDENCE, "json, csv,yml"),
            (ENV_INPUT_POLICY, "any_encoding"),
            (ENV_ARCHIVE_COLLISION, "reject"),
        ]);
        let mut config = PipelineConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/in"));
        assert_eq!(config.min_row_count, 5);
        assert_eq!(
            config.encoding_precedence,
            vec![EncodingKind::Json, EncodingKind::Csv, EncodingKind::Yaml]
        );
        assert_eq!(config.input_policy, InputPolicy::AnyEncoding);
        assert_eq!(config.archive_collision, CollisionPolicy::Reject);
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let mut config = PipelineConfig::default();
        let err = config
            .apply_overrides(|k| (k == ENV_BATCH_SIZE).then(|| "lots".to_string()))
            .unwrap_err();
        assert_eq!(err.code(), "ConfigError");
    }

    #[test]
    fn test_validate_rejects_duplicate_precedence() {
        let config = PipelineConfig {
            encoding_precedence: vec![EncodingKind::Csv, EncodingKind::Csv],
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
