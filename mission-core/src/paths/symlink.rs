//! Symlink detection and real-path resolution
//!
//! Used by the guard to compare where a path really lands with where the
//! base directory really is. Works for targets that do not exist yet by
//! resolving the nearest existing ancestor and re-appending the rest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Symlink resolver for detecting and resolving symbolic links
pub struct SymlinkResolver;

impl SymlinkResolver {
    /// Check if a path is a symbolic link
    ///
    /// Uses `symlink_metadata()` which doesn't follow the link, so dangling
    /// links are detected too. Missing paths are not links.
    pub fn is_symlink(path: &Path) -> bool {
        match fs::symlink_metadata(path) {
            Ok(metadata) => {
                let is_link = metadata.is_symlink();
                if is_link {
                    debug!("Detected symlink: {:?}", path);
                }
                is_link
            }
            Err(e) => {
                debug!("Could not check if path is symlink {:?}: {}", path, e);
                false
            }
        }
    }

    /// True if anything (file, directory, link, dangling link) exists at `path`
    pub fn exists_no_follow(path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    /// Resolve the real path of `path`, following every symlink.
    ///
    /// If `path` does not exist, the nearest existing ancestor is
    /// canonicalized and the missing tail is appended unchanged. A dangling
    /// symlink is an error: its target cannot be proven to stay in place.
    pub fn real_path(path: &Path) -> io::Result<PathBuf> {
        if Self::exists_no_follow(path) {
            return fs::canonicalize(path);
        }

        let mut missing = Vec::new();
        let mut current = path.to_path_buf();
        loop {
            if Self::exists_no_follow(&current) {
                let mut real = fs::canonicalize(&current)?;
                for part in missing.iter().rev() {
                    real.push(part);
                }
                debug!(
                    "Resolved non-existent path {:?} via ancestor {:?} -> {:?}",
                    path, current, real
                );
                return Ok(real);
            }

            match (current.file_name(), current.parent()) {
                (Some(name), Some(parent)) => {
                    missing.push(name.to_os_string());
                    current = parent.to_path_buf();
                }
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no existing ancestor for {}", path.display()),
                    ));
                }
            }
        }
    }
}
