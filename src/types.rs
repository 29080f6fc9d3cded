use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// One of the three logical datasets tracked by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Customers,
    Products,
    Orders,
}

/// A column of one dataset that must match the primary key of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: Dataset,
}

const ORDERS_FOREIGN_KEYS: &[ForeignKey] = &[ForeignKey {
    column: "customer_id",
    references: Dataset::Customers,
}];

impl Dataset {
    pub const ALL: [Dataset; 3] = [Dataset::Customers, Dataset::Products, Dataset::Orders];

    pub fn name(self) -> &'static str {
        match self {
            Dataset::Customers => "customers",
            Dataset::Products => "products",
            Dataset::Orders => "orders",
        }
    }

    /// Destination table. Kept separate from `name` so the file stem and the
    /// table can diverge without touching callers.
    pub fn table(self) -> &'static str {
        self.name()
    }

    pub fn primary_key(self) -> &'static str {
        match self {
            Dataset::Customers => "customer_id",
            Dataset::Products => "product_id",
            Dataset::Orders => "order_id",
        }
    }

    pub fn foreign_keys(self) -> &'static [ForeignKey] {
        match self {
            Dataset::Orders => ORDERS_FOREIGN_KEYS,
            Dataset::Customers | Dataset::Products => &[],
        }
    }

    /// Datasets that must finish loading before this one may start.
    pub fn load_after(self) -> Vec<Dataset> {
        self.foreign_keys().iter().map(|fk| fk.references).collect()
    }

    /// The file name this dataset takes in the given encoding.
    pub fn file_name(self, kind: EncodingKind) -> String {
        format!("{}.{}", self.name(), kind.extension())
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Dataset::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PipelineError::Config(format!("unknown dataset '{s}'")))
    }
}

/// Physical file format of an encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingKind {
    /// Tabular, delimited, header row first.
    Csv,
    /// Record-oriented: a JSON array of objects.
    Json,
    /// Indented: a YAML sequence of mappings.
    Yaml,
}

impl EncodingKind {
    pub const ALL: [EncodingKind; 3] = [EncodingKind::Csv, EncodingKind::Json, EncodingKind::Yaml];

    /// Canonical extension, used for the expected file names.
    pub fn extension(self) -> &'static str {
        match self {
            EncodingKind::Csv => "csv",
            EncodingKind::Json => "json",
            EncodingKind::Yaml => "yaml",
        }
    }

    /// Every extension accepted for this kind, canonical one first.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            EncodingKind::Csv => &["csv"],
            EncodingKind::Json => &["json"],
            EncodingKind::Yaml => &["yaml", "yml"],
        }
    }

    /// Classify a path by suffix.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        EncodingKind::ALL
            .into_iter()
            .find(|kind| kind.extensions().contains(&ext.as_str()))
            .ok_or_else(|| PipelineError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
    }
}

impl fmt::Display for EncodingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for EncodingKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        EncodingKind::ALL
            .into_iter()
            .find(|kind| kind.extensions().contains(&wanted.as_str()))
            .ok_or_else(|| PipelineError::Config(format!("unknown encoding '{s}'")))
    }
}

/// One physical file standing in for a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    pub dataset: Dataset,
    pub kind: EncodingKind,
    pub path: PathBuf,
}

impl Encoding {
    pub fn new(dataset: Dataset, kind: EncodingKind, path: impl Into<PathBuf>) -> Self {
        Self {
            dataset,
            kind,
            path: path.into(),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.kind)
    }
}
