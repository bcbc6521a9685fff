//! Top-level import error
//!
//! Every failed import surfaces as exactly one [`ImportError`]. The variant
//! names the stage that failed and wraps the originating cause.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::loader::ComponentError;
use crate::paths::PathError;
use crate::report::ValidationReport;
use crate::resolver::DependencyError;

/// Progress of one import, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImportStage {
    Unparsed,
    StructurallyValid,
    SecurityValidated,
    DependenciesResolved,
    Complete,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportStage::Unparsed => "unparsed",
            ImportStage::StructurallyValid => "structurally-valid",
            ImportStage::SecurityValidated => "security-validated",
            ImportStage::DependenciesResolved => "dependencies-resolved",
            ImportStage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Coarse classification of an import failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    PathRejected,
    Structural,
    Component,
    Security,
    Dependency,
    Internal,
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Template path rejected: {0}")]
    Path(#[from] PathError),

    #[error("Failed to read template '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template '{}' is {size} bytes, exceeding the maximum of {max} bytes", .path.display())]
    TooLarge { path: PathBuf, size: u64, max: usize },

    #[error("Layers 1-3 structural validation failed: {}", .errors.join("; "))]
    Structural { errors: Vec<String> },

    #[error("Component resolution failed: {0}")]
    Component(#[from] ComponentError),

    #[error("Security validation failed: {}", .errors.join("; "))]
    Security {
        errors: Vec<String>,
        report: Box<ValidationReport>,
    },

    #[error("Dependency '{name}' failed: {source}")]
    Dependency {
        name: String,
        #[source]
        source: DependencyError,
    },

    /// Unexpected fault; the message stays generic and the cause is kept as source
    #[error("Internal error during import")]
    Internal {
        stage: ImportStage,
        #[source]
        source: anyhow::Error,
    },
}

impl ImportError {
    pub fn internal(stage: ImportStage, source: impl Into<anyhow::Error>) -> Self {
        ImportError::Internal {
            stage,
            source: source.into(),
        }
    }

    /// The last stage the import reached before failing
    pub fn stage(&self) -> ImportStage {
        match self {
            ImportError::Path(_)
            | ImportError::Read { .. }
            | ImportError::TooLarge { .. }
            | ImportError::Structural { .. } => ImportStage::Unparsed,
            ImportError::Component(_) | ImportError::Security { .. } => {
                ImportStage::StructurallyValid
            }
            ImportError::Dependency { .. } => ImportStage::SecurityValidated,
            ImportError::Internal { stage, .. } => *stage,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ImportError::Path(_) | ImportError::Read { .. } => FailureKind::PathRejected,
            ImportError::TooLarge { .. } | ImportError::Structural { .. } => {
                FailureKind::Structural
            }
            ImportError::Component(_) => FailureKind::Component,
            ImportError::Security { .. } => FailureKind::Security,
            ImportError::Dependency { .. } => FailureKind::Dependency,
            ImportError::Internal { .. } => FailureKind::Internal,
        }
    }

    /// The validation report, when the failure came from security validation
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            ImportError::Security { report, .. } => Some(report.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_structural_error_names_layers() {
        let err = ImportError::Structural {
            errors: vec!["spec is required.".into(), "kind is required.".into()],
        };
        assert_eq!(
            err.to_string(),
            "Layers 1-3 structural validation failed: spec is required.; kind is required."
        );
        assert_eq!(err.stage(), ImportStage::Unparsed);
        assert_eq!(err.kind(), FailureKind::Structural);
    }

    #[test]
    fn test_dependency_error_names_dependency() {
        let err = ImportError::Dependency {
            name: "shared-persona".into(),
            source: DependencyError::ChecksumMismatch {
                expected: "sha256:00".into(),
                actual: "sha256:11".into(),
            },
        };
        assert!(err.to_string().starts_with("Dependency 'shared-persona' failed"));
        assert!(err.source().is_some());
        assert_eq!(err.stage(), ImportStage::SecurityValidated);
    }

    #[test]
    fn test_internal_error_is_generic_but_keeps_cause() {
        let err = ImportError::internal(
            ImportStage::Unparsed,
            anyhow::anyhow!("tempdir exhausted at /secret/location"),
        );
        assert_eq!(err.to_string(), "Internal error during import");
        assert!(err
            .source()
            .map_or(false, |s| s.to_string().contains("/secret/location")));
        assert_eq!(err.kind(), FailureKind::Internal);
    }

    #[test]
    fn test_stages_are_ordered() {
        assert!(ImportStage::Unparsed < ImportStage::StructurallyValid);
        assert!(ImportStage::DependenciesResolved < ImportStage::Complete);
    }
}
