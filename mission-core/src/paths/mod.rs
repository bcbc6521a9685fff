//! PathGuard - sanitization of caller-supplied paths
//!
//! Every component that touches the filesystem routes paths through
//! [`PathGuard::sanitize`]. The checks run in a fixed order and none is
//! skipped when a base directory is supplied:
//!
//! 1. empty / null byte / over-length input
//! 2. `..` segments, before and after normalization
//! 3. absolute-path requirement (unless relative paths are allowed)
//! 4. lexical containment in the base directory
//! 5. real-path containment in the real base directory (symlink escapes,
//!    including escapes through an ancestor directory)
//! 6. the candidate itself being a symlink
//! 7. extension allowlist

mod error;
mod symlink;

pub use error::PathError;
pub use symlink::SymlinkResolver;

use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

/// Longest raw path accepted, in bytes
pub const MAX_PATH_LENGTH: usize = 4096;

/// Options controlling how strictly a path is sanitized
#[derive(Debug, Clone, Default)]
pub struct SanitizeOptions {
    /// Directory the path must stay inside (lexically and after symlinks)
    pub base_dir: Option<PathBuf>,
    /// Accept relative input (resolved against `base_dir` when present)
    pub allow_relative: bool,
    /// Permitted extensions, without the leading dot. `None` allows any.
    pub allowed_extensions: Option<Vec<String>>,
    /// Accept a candidate that is itself a symbolic link
    pub allow_symlinks: bool,
}

impl SanitizeOptions {
    /// Relative paths resolved inside `base_dir`, no symlinks
    pub fn within(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            allow_relative: true,
            ..Self::default()
        }
    }

    /// Absolute paths only, no base directory
    pub fn absolute_only() -> Self {
        Self::default()
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_extensions = Some(
            extensions
                .into_iter()
                .map(|e| normalize_extension(e.as_ref()))
                .collect(),
        );
        self
    }

    pub fn allowing_symlinks(mut self) -> Self {
        self.allow_symlinks = true;
        self
    }
}

/// Path sanitizer
pub struct PathGuard;

impl PathGuard {
    /// Sanitize `raw` and return the path that is safe to open.
    ///
    /// With a base directory the returned path is the canonical real path of
    /// the candidate; without one it is the lexically normalized input.
    pub fn sanitize(raw: &str, options: &SanitizeOptions) -> Result<PathBuf, PathError> {
        let result = Self::sanitize_inner(raw, options);
        if let Err(e) = &result {
            e.log_if_security_critical();
        }
        result
    }

    fn sanitize_inner(raw: &str, options: &SanitizeOptions) -> Result<PathBuf, PathError> {
        trace!("Sanitizing path: {:?}", raw);

        if raw.trim().is_empty() {
            return Err(PathError::Empty);
        }
        if raw.contains('\0') {
            return Err(PathError::NullByte);
        }
        if raw.len() > MAX_PATH_LENGTH {
            return Err(PathError::TooLong {
                length: raw.len(),
                max: MAX_PATH_LENGTH,
            });
        }
        if has_parent_segment(raw) {
            return Err(PathError::Traversal {
                path: raw.to_string(),
            });
        }

        let normalized = normalize_lexically(Path::new(raw)).ok_or_else(|| PathError::Traversal {
            path: raw.to_string(),
        })?;

        if !options.allow_relative && !normalized.is_absolute() {
            return Err(PathError::NotAbsolute {
                path: raw.to_string(),
            });
        }

        let safe = match &options.base_dir {
            Some(base_dir) => Self::contain(&normalized, base_dir, options)?,
            None => {
                if !options.allow_symlinks && SymlinkResolver::is_symlink(&normalized) {
                    return Err(PathError::SymlinkNotAllowed { path: normalized });
                }
                normalized.clone()
            }
        };

        if let Some(allowed) = &options.allowed_extensions {
            check_extension(&normalized, allowed)?;
        }

        debug!("Path accepted: {:?} -> {:?}", raw, safe);
        Ok(safe)
    }

    /// Lexical and real-path containment inside `base_dir`
    fn contain(
        normalized: &Path,
        base_dir: &Path,
        options: &SanitizeOptions,
    ) -> Result<PathBuf, PathError> {
        let base = absolutize(base_dir)?;

        let candidate = if normalized.is_absolute() {
            normalized.to_path_buf()
        } else {
            base.join(normalized)
        };
        let candidate = normalize_lexically(&candidate).ok_or_else(|| PathError::Traversal {
            path: candidate.display().to_string(),
        })?;

        // Path::starts_with compares whole components, so "/base-evil" is not
        // inside "/base".
        if !candidate.starts_with(&base) {
            return Err(PathError::EscapesBase {
                path: candidate,
                base,
            });
        }

        let real_base = std::fs::canonicalize(&base).map_err(|source| PathError::Inspect {
            path: base.clone(),
            source,
        })?;

        let is_link = SymlinkResolver::is_symlink(&candidate);
        let real = match SymlinkResolver::real_path(&candidate) {
            Ok(real) => real,
            Err(_) if is_link && !options.allow_symlinks => {
                return Err(PathError::SymlinkNotAllowed { path: candidate });
            }
            Err(source) => {
                return Err(PathError::Inspect {
                    path: candidate,
                    source,
                });
            }
        };

        if !real.starts_with(&real_base) {
            return Err(PathError::SymlinkEscape {
                path: candidate,
                base,
                real,
            });
        }

        if is_link && !options.allow_symlinks {
            return Err(PathError::SymlinkNotAllowed { path: candidate });
        }

        Ok(real)
    }
}

/// True if any `/`- or `\`-separated segment of `raw` is exactly `..`
fn has_parent_segment(raw: &str) -> bool {
    raw.split(['/', '\\']).any(|segment| segment == "..")
}

/// Drop `.` components. Returns `None` if a `..` component survives.
fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => return None,
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    Some(out)
}

/// Make a trusted base directory absolute, folding `..` lexically
fn absolutize(base_dir: &Path) -> Result<PathBuf, PathError> {
    let joined = if base_dir.is_absolute() {
        base_dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| PathError::Inspect {
                path: base_dir.to_path_buf(),
                source,
            })?
            .join(base_dir)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

fn check_extension(path: &Path, allowed: &[String]) -> Result<(), PathError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(normalize_extension);

    match ext {
        Some(ext) if allowed.iter().any(|a| normalize_extension(a) == ext) => Ok(()),
        _ => Err(PathError::ExtensionNotAllowed {
            path: path.to_path_buf(),
            allowed: allowed.join(", "),
        }),
    }
}
