//! DependencyResolver - checksum-pinned, recursive dependency import
//!
//! Dependencies resolve one at a time, in declaration order, so the first
//! failing dependency is the one reported. Each is fetched, its SHA-256 is
//! compared with the declared checksum, and only then is it run through the
//! full import pipeline via [`NestedImporter`].
//!
//! The chain of canonical template paths from the root import down to the
//! current template travels with each recursive call. Re-entering a path on
//! that chain is a cycle; reaching the same path along two separate branches
//! is not.

use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ImportOptions;
use crate::error::ImportError;
use crate::paths::{PathError, PathGuard, SanitizeOptions};
use crate::report::ImportResult;
use crate::template::{Dependency, Template};
use crate::trust::hasher::hash_bytes;

const FILE_SCHEME: &str = "file://";

#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("Unsupported protocol in sourceUrl '{url}': only file:// is supported")]
    UnsupportedProtocol { url: String },

    #[error("Invalid file URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Dependency path rejected: {0}")]
    Path(#[from] PathError),

    #[error("Failed to fetch '{}': {source}", .path.display())]
    Fetch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{}' is {size} bytes, exceeding the maximum of {max} bytes", .path.display())]
    TooLarge { path: PathBuf, size: u64, max: usize },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Circular dependency detected: {}", format_chain(.chain, .path))]
    Circular { path: PathBuf, chain: Vec<PathBuf> },

    #[error("Nested import failed: {0}")]
    Nested(#[source] Box<ImportError>),
}

fn format_chain(chain: &[PathBuf], path: &Path) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .chain(std::iter::once(path.display().to_string()))
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl DependencyError {
    pub fn log_if_security_critical(&self, dependency: &str) {
        match self {
            DependencyError::ChecksumMismatch { .. } | DependencyError::Circular { .. } => {
                tracing::error!(
                    target: "security",
                    "DEPENDENCY REJECTED: '{}': {}",
                    dependency,
                    self
                );
            }
            DependencyError::Path(e) if e.is_escape() => {
                tracing::error!(
                    target: "security",
                    "DEPENDENCY REJECTED: '{}': {}",
                    dependency,
                    self
                );
            }
            _ => {}
        }
    }
}

/// Runs the full import pipeline on an already-fetched dependency
pub trait NestedImporter: Send + Sync {
    /// Import `content`, the checksum-verified bytes read from `path`.
    ///
    /// `path` is canonical and has passed the path guard; it anchors cycle
    /// detection and component resolution but must not be read again.
    /// `chain` holds every ancestor template.
    fn import_nested<'a>(
        &'a self,
        path: &'a Path,
        content: &'a [u8],
        options: &'a ImportOptions,
        chain: &'a [PathBuf],
    ) -> BoxFuture<'a, Result<ImportResult, ImportError>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `dependencies` of the template at the end of `chain`.
    ///
    /// Returns the imported templates keyed by declared name. The first
    /// failure aborts resolution and carries the dependency's name.
    pub async fn resolve(
        &self,
        dependencies: &[Dependency],
        options: &ImportOptions,
        chain: &[PathBuf],
        importer: &dyn NestedImporter,
    ) -> Result<BTreeMap<String, Template>, ImportError> {
        let mut resolved = BTreeMap::new();

        for dep in dependencies {
            debug!("Resolving dependency '{}' from {}", dep.name, dep.source_url);
            let template = self
                .resolve_one(dep, options, chain, importer)
                .await
                .map_err(|source| {
                    source.log_if_security_critical(&dep.name);
                    ImportError::Dependency {
                        name: dep.name.clone(),
                        source,
                    }
                })?;
            resolved.insert(dep.name.clone(), template);
        }

        if !resolved.is_empty() {
            info!("Resolved {} dependencies", resolved.len());
        }
        Ok(resolved)
    }

    async fn resolve_one(
        &self,
        dep: &Dependency,
        options: &ImportOptions,
        chain: &[PathBuf],
        importer: &dyn NestedImporter,
    ) -> Result<Template, DependencyError> {
        let path = self.locate(&dep.source_url, options)?;

        if chain.contains(&path) {
            return Err(DependencyError::Circular {
                path,
                chain: chain.to_vec(),
            });
        }

        let content = fetch(&path, options.max_document_bytes).await?;

        let actual = hash_bytes(&content);
        if actual != dep.checksum {
            return Err(DependencyError::ChecksumMismatch {
                expected: dep.checksum.clone(),
                actual,
            });
        }
        debug!("Checksum verified for '{}': {}", dep.name, actual);

        let result = importer
            .import_nested(&path, &content, options, chain)
            .await
            .map_err(|e| DependencyError::Nested(Box::new(e)))?;

        Ok(result.template)
    }

    /// Turn a `file://` URL into a guarded, canonical path
    fn locate(&self, url: &str, options: &ImportOptions) -> Result<PathBuf, DependencyError> {
        let raw = file_url_path(url)?;

        let guard = match &options.dependency_base_dir {
            Some(base) => SanitizeOptions::within(base),
            None => SanitizeOptions::absolute_only(),
        }
        .with_extensions(&options.allowed_extensions);

        let safe = PathGuard::sanitize(raw, &guard)?;

        // Without a base directory the guard returns the normalized path;
        // cycle detection needs the canonical one.
        std::fs::canonicalize(&safe).map_err(|source| DependencyError::Fetch { path: safe, source })
    }
}

/// Path component of a local `file://` URL
fn file_url_path(url: &str) -> Result<&str, DependencyError> {
    let Some(rest) = url.strip_prefix(FILE_SCHEME) else {
        return Err(DependencyError::UnsupportedProtocol {
            url: url.to_string(),
        });
    };

    let path = rest.strip_prefix("localhost").unwrap_or(rest);
    if !path.starts_with('/') {
        return Err(DependencyError::InvalidUrl {
            url: url.to_string(),
            reason: "expected file:///absolute/path".to_string(),
        });
    }
    if path.contains(['?', '#', '%']) {
        return Err(DependencyError::InvalidUrl {
            url: url.to_string(),
            reason: "query strings, fragments and percent-encoding are not supported".to_string(),
        });
    }

    Ok(path)
}

async fn fetch(path: &Path, max_bytes: usize) -> Result<Vec<u8>, DependencyError> {
    let fetch_err = |source| DependencyError::Fetch {
        path: path.to_path_buf(),
        source,
    };

    let metadata = tokio::fs::metadata(path).await.map_err(fetch_err)?;
    if metadata.len() > max_bytes as u64 {
        return Err(DependencyError::TooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max: max_bytes,
        });
    }

    tokio::fs::read(path).await.map_err(fetch_err)
}
