use crate::config::InputPolicy;
use crate::error::{MalformedFile, PipelineError, Result};
use crate::pipeline::processing::reader;
use crate::types::{Dataset, Encoding, EncodingKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What the precondition check saw in the intake directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputReport {
    pub data_dir: PathBuf,
    /// Every non-empty expected file that passed its structural probe.
    pub files: Vec<PathBuf>,
}

/// Read-only gate run before any destination table is touched.
///
/// Every expected file is inspected before the verdict is returned, so a
/// failure lists all offending paths rather than the first one found.
pub struct PreconditionValidator {
    data_dir: PathBuf,
    policy: InputPolicy,
}

enum Slot {
    Present,
    Empty,
    Absent,
}

fn inspect(path: &Path) -> Slot {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Slot::Present,
        Ok(meta) if meta.is_file() => Slot::Empty,
        _ => Slot::Absent,
    }
}

impl PreconditionValidator {
    pub fn new(data_dir: impl Into<PathBuf>, policy: InputPolicy) -> Self {
        Self {
            data_dir: data_dir.into(),
            policy,
        }
    }

    pub fn validate(&self) -> Result<InputReport> {
        let mut missing = Vec::new();
        let mut present = Vec::new();

        for dataset in Dataset::ALL {
            let mut absent = Vec::new();
            let mut usable = false;
            for kind in EncodingKind::ALL {
                // Any accepted suffix fills the slot; the canonical one wins.
                let mut found = None;
                let mut empty = false;
                for ext in kind.extensions() {
                    let path = self.data_dir.join(format!("{}.{ext}", dataset.name()));
                    match inspect(&path) {
                        Slot::Present if found.is_none() => found = Some(path),
                        Slot::Present | Slot::Absent => {}
                        Slot::Empty => {
                            empty = true;
                            missing.push(path);
                        }
                    }
                }
                match found {
                    Some(path) => {
                        usable = true;
                        present.push(Encoding::new(dataset, kind, path));
                    }
                    None if !empty => absent.push(self.data_dir.join(dataset.file_name(kind))),
                    None => {}
                }
            }
            let required = match self.policy {
                InputPolicy::AllEncodings => true,
                InputPolicy::AnyEncoding => !usable,
            };
            if required {
                missing.extend(absent);
            }
        }

        if !missing.is_empty() {
            for path in &missing {
                warn!("Missing or empty input: {}", path.display());
            }
            return Err(PipelineError::MissingInput { paths: missing });
        }

        let malformed: Vec<MalformedFile> = present
            .iter()
            .filter_map(|enc| {
                reader::probe(enc.kind, &enc.path)
                    .err()
                    .map(|reason| MalformedFile {
                        path: enc.path.clone(),
                        reason,
                    })
            })
            .collect();
        if !malformed.is_empty() {
            for file in &malformed {
                warn!("Malformed input: {}", file);
            }
            return Err(PipelineError::MalformedInput { files: malformed });
        }

        info!(
            "Validated {} input files in {}",
            present.len(),
            self.data_dir.display()
        );
        Ok(InputReport {
            data_dir: self.data_dir.clone(),
            files: present.into_iter().map(|enc| enc.path).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_valid(dir: &Path, dataset: Dataset, kind: EncodingKind) {
        let body = match kind {
            EncodingKind::Csv => "id,name\n1,a\n",
            EncodingKind::Json => r#"[{"id": 1, "name": "a"}]"#,
            EncodingKind::Yaml => "- id: 1\n  name: a\n",
        };
        fs::write(dir.join(dataset.file_name(kind)), body).unwrap();
    }

    fn write_all(dir: &Path) {
        for d in Dataset::ALL {
            for k in EncodingKind::ALL {
                write_valid(dir, d, k);
            }
        }
    }

    #[test]
    fn test_all_nine_present_passes() {
        let dir = tempdir().unwrap();
        write_all(dir.path());
        let report = PreconditionValidator::new(dir.path(), InputPolicy::AllEncodings)
            .validate()
            .unwrap();
        assert_eq!(report.files.len(), 9);
    }

    #[test]
    fn test_empty_directory_names_all_nine() {
        let dir = tempdir().unwrap();
        let err = PreconditionValidator::new(dir.path(), InputPolicy::AllEncodings)
            .validate()
            .unwrap_err();
        match err {
            PipelineError::MissingInput { paths } => assert_eq!(paths.len(), 9),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_absent_and_empty_files_are_all_reported() {
        let dir = tempdir().unwrap();
        write_all(dir.path());
        fs::remove_file(dir.path().join("orders.json")).unwrap();
        fs::write(dir.path().join("customers.csv"), "").unwrap();
        fs::write(dir.path().join("products.yaml"), "").unwrap();

        let err = PreconditionValidator::new(dir.path(), InputPolicy::AllEncodings)
            .validate()
            .unwrap_err();
        let PipelineError::MissingInput { paths } = err else {
            panic!("expected MissingInput");
        };
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["customers.csv", "products.yaml", "orders.json"]);
    }

    #[test]
    fn test_malformed_files_are_all_reported() {
        let dir = tempdir().unwrap();
        write_all(dir.path());
        fs::write(dir.path().join("products.json"), r#"{"not": "a list"}"#).unwrap();
        fs::write(dir.path().join("orders.yaml"), "[]\n").unwrap();

        let err = PreconditionValidator::new(dir.path(), InputPolicy::AllEncodings)
            .validate()
            .unwrap_err();
        let PipelineError::MalformedInput { files } = err else {
            panic!("expected MalformedInput");
        };
        assert_eq!(files.len(), 2);
        assert!(files[0].path.ends_with("products.json"));
        assert!(files[1].path.ends_with("orders.yaml"));
    }

    #[test]
    fn test_yml_suffix_fills_the_yaml_slot() {
        let dir = tempdir().unwrap();
        write_valid(dir.path(), Dataset::Customers, EncodingKind::Csv);
        write_valid(dir.path(), Dataset::Products, EncodingKind::Csv);
        fs::write(dir.path().join("orders.yml"), "- id: 1\n  name: a\n").unwrap();

        let report = PreconditionValidator::new(dir.path(), InputPolicy::AnyEncoding)
            .validate()
            .unwrap();
        assert_eq!(report.files.len(), 3);
        assert!(report.files.iter().any(|p| p.ends_with("orders.yml")));
    }

    #[test]
    fn test_yml_counts_under_all_encodings() {
        let dir = tempdir().unwrap();
        write_all(dir.path());
        fs::rename(dir.path().join("orders.yaml"), dir.path().join("orders.yml")).unwrap();

        let report = PreconditionValidator::new(dir.path(), InputPolicy::AllEncodings)
            .validate()
            .unwrap();
        assert_eq!(report.files.len(), 9);
    }

    #[test]
    fn test_any_encoding_policy() {
        let dir = tempdir().unwrap();
        write_valid(dir.path(), Dataset::Customers, EncodingKind::Csv);
        write_valid(dir.path(), Dataset::Products, EncodingKind::Json);

        let err = PreconditionValidator::new(dir.path(), InputPolicy::AnyEncoding)
            .validate()
            .unwrap_err();
        let PipelineError::MissingInput { paths } = err else {
            panic!("expected MissingInput");
        };
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("orders.")));

        write_valid(dir.path(), Dataset::Orders, EncodingKind::Yaml);
        let report = PreconditionValidator::new(dir.path(), InputPolicy::AnyEncoding)
            .validate()
            .unwrap();
        assert_eq!(report.files.len(), 3);
    }
}
