//! PathGuard adversarial tests: traversal, symlink escapes, sandbox containment

mod common;

use mission_core::paths::{PathError, PathGuard, SanitizeOptions, MAX_PATH_LENGTH};
use std::fs;
use tempfile::TempDir;

const TRAVERSALS: &[&str] = &[
    "..",
    "../etc/passwd",
    "templates/../../secret.yaml",
    "templates/./../x.yaml",
    "/srv/missions/../../etc/shadow",
    "..\\windows\\system.ini",
    "a/b/c/../../../../d.yaml",
    "./..",
];

#[test]
fn test_traversal_rejected_without_base() {
    common::init_test_logging();

    let options = SanitizeOptions {
        allow_relative: true,
        ..SanitizeOptions::default()
    };
    for raw in TRAVERSALS {
        let err = PathGuard::sanitize(raw, &options).unwrap_err();
        assert!(
            matches!(err, PathError::Traversal { .. }),
            "{raw:?} gave {err:?}"
        );
    }
}

#[test]
fn test_traversal_rejected_with_base() {
    let base = TempDir::new().unwrap();
    fs::create_dir_all(base.path().join("templates")).unwrap();

    for raw in TRAVERSALS {
        let err = PathGuard::sanitize(raw, &SanitizeOptions::within(base.path())).unwrap_err();
        assert!(
            matches!(err, PathError::Traversal { .. }),
            "{raw:?} gave {err:?}"
        );
    }
}

#[test]
fn test_input_shape_checks() {
    let options = SanitizeOptions::absolute_only();

    assert!(matches!(
        PathGuard::sanitize("", &options),
        Err(PathError::Empty)
    ));
    assert!(matches!(
        PathGuard::sanitize("/tmp/a\0b.yaml", &options),
        Err(PathError::NullByte)
    ));
    let long = format!("/{}", "a".repeat(MAX_PATH_LENGTH));
    assert!(matches!(
        PathGuard::sanitize(&long, &options),
        Err(PathError::TooLong { .. })
    ));
    assert!(matches!(
        PathGuard::sanitize("relative/template.yaml", &options),
        Err(PathError::NotAbsolute { .. })
    ));
}

#[test]
fn test_absolute_path_outside_base_rejected() {
    let base = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    let outside = other.path().join("template.yaml");
    fs::write(&outside, "kind: x").unwrap();

    let err = PathGuard::sanitize(
        outside.to_str().unwrap(),
        &SanitizeOptions::within(base.path()),
    )
    .unwrap_err();
    assert!(matches!(err, PathError::EscapesBase { .. }));
}

#[test]
fn test_nonexistent_target_inside_base_accepted() {
    let base = TempDir::new().unwrap();
    let real_base = fs::canonicalize(base.path()).unwrap();

    let safe = PathGuard::sanitize(
        "drafts/new.yaml",
        &SanitizeOptions::within(base.path()).with_extensions(["yaml"]),
    )
    .unwrap();
    assert!(safe.starts_with(&real_base));
    assert!(safe.ends_with("drafts/new.yaml"));
}

#[test]
fn test_extension_allowlist() {
    let base = TempDir::new().unwrap();
    fs::write(base.path().join("run.sh"), "#!/bin/sh").unwrap();

    let err = PathGuard::sanitize(
        "run.sh",
        &SanitizeOptions::within(base.path()).with_extensions(["yaml", "xml"]),
    )
    .unwrap_err();
    assert!(matches!(err, PathError::ExtensionNotAllowed { .. }));
}

#[cfg(unix)]
mod symlinks {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_direct_symlink_escape() {
        let base = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.yaml"), "secret").unwrap();
        symlink(
            outside.path().join("secret.yaml"),
            base.path().join("innocent.yaml"),
        )
        .unwrap();

        let err = PathGuard::sanitize("innocent.yaml", &SanitizeOptions::within(base.path()))
            .unwrap_err();
        assert!(matches!(err, PathError::SymlinkEscape { .. }), "{err:?}");
        assert!(err.is_escape());
    }

    #[test]
    fn test_ancestor_symlink_escape() {
        let base = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::create_dir_all(outside.path().join("nested")).unwrap();
        fs::write(outside.path().join("nested/template.yaml"), "x").unwrap();
        symlink(outside.path(), base.path().join("components")).unwrap();

        for raw in ["components/nested/template.yaml", "components/nested/missing.yaml"] {
            let err = PathGuard::sanitize(raw, &SanitizeOptions::within(base.path())).unwrap_err();
            assert!(matches!(err, PathError::SymlinkEscape { .. }), "{raw}: {err:?}");
        }
    }

    #[test]
    fn test_symlink_inside_base_needs_opt_in() {
        let base = TempDir::new().unwrap();
        fs::write(base.path().join("real.yaml"), "x").unwrap();
        symlink(base.path().join("real.yaml"), base.path().join("alias.yaml")).unwrap();

        let err = PathGuard::sanitize("alias.yaml", &SanitizeOptions::within(base.path()))
            .unwrap_err();
        assert!(matches!(err, PathError::SymlinkNotAllowed { .. }));

        let safe = PathGuard::sanitize(
            "alias.yaml",
            &SanitizeOptions::within(base.path()).allowing_symlinks(),
        )
        .unwrap();
        assert_eq!(safe, fs::canonicalize(base.path().join("real.yaml")).unwrap());
    }

    #[test]
    fn test_symlinked_base_directory_is_followed() {
        let real = TempDir::new().unwrap();
        let links = TempDir::new().unwrap();
        fs::write(real.path().join("template.yaml"), "x").unwrap();
        let linked_base = links.path().join("base");
        symlink(real.path(), &linked_base).unwrap();

        let safe = PathGuard::sanitize("template.yaml", &SanitizeOptions::within(&linked_base))
            .unwrap();
        assert_eq!(
            safe,
            fs::canonicalize(real.path().join("template.yaml")).unwrap()
        );
    }
}
