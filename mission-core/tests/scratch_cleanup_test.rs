//! import_from_string leaves nothing behind in its scratch directory

mod common;

use common::*;
use mission_core::{FailureKind, ImportError, ImportOptions, ImportStage, Importer, TrustLevel};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SPEC: &str = "  objective: Rotate expiring credentials\n";

fn importer() -> Importer {
    Importer::new(store_with_key(TrustLevel::SignedKnown), local_rules())
}

fn leftovers(scratch: &Path) -> Vec<String> {
    fs::read_dir(scratch)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_scratch_removed_after_success() {
    init_test_logging();
    let scratch = TempDir::new().unwrap();
    let options = ImportOptions::default().with_scratch_dir(scratch.path());

    let result = importer()
        .import_from_string(&flat_template("rotate", SPEC, &[]), &options)
        .await
        .unwrap();

    assert!(result.validation_report.valid);
    assert!(leftovers(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_scratch_removed_after_structural_failure() {
    let scratch = TempDir::new().unwrap();
    let options = ImportOptions::default().with_scratch_dir(scratch.path());

    let err = importer()
        .import_from_string("apiVersion: mission-template.v1\n", &options)
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::Structural { .. }));
    assert!(leftovers(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_scratch_removed_after_security_failure() {
    let scratch = TempDir::new().unwrap();
    let options = ImportOptions::default().with_scratch_dir(scratch.path());
    let untrusted = flat_template("rotate", SPEC, &[]).replace(KEY_ID, "stranger");

    let err = importer()
        .import_from_string(&untrusted, &options)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Security);
    assert!(leftovers(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_scratch_removed_after_component_failure() {
    let scratch = TempDir::new().unwrap();
    let options = ImportOptions::default().with_scratch_dir(scratch.path());
    let xml = hybrid_template(
        "<Tag>ops</Tag>",
        r#"<AgentPersona src="persona.md" />"#,
        DRAFT07_SCHEMA,
    );

    let err = importer()
        .import_from_string(&xml, &options)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Component);
    assert!(leftovers(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_missing_scratch_parent_is_internal_error() {
    let scratch = TempDir::new().unwrap();
    let options = ImportOptions::default().with_scratch_dir(scratch.path().join("absent"));

    let err = importer()
        .import_from_string(&flat_template("rotate", SPEC, &[]), &options)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Internal);
    assert_eq!(err.stage(), ImportStage::Unparsed);
}
