//! Path sanitization errors
//!
//! Each rejection reason is its own variant so callers (the loader, the
//! dependency resolver) can react to the exact failure.

use std::path::PathBuf;
use thiserror::Error;

/// Why a caller-supplied path was rejected
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Path is empty")]
    Empty,

    #[error("Path contains a null byte")]
    NullByte,

    #[error("Path is too long ({length} bytes, maximum is {max})")]
    TooLong { length: usize, max: usize },

    #[error("Path traversal detected: '{path}' contains a '..' segment")]
    Traversal { path: String },

    #[error("Path must be absolute: '{path}'")]
    NotAbsolute { path: String },

    #[error("File extension not permitted for '{path}' (allowed: {allowed})")]
    ExtensionNotAllowed { path: PathBuf, allowed: String },

    #[error("Path '{path}' escapes base directory '{base}'")]
    EscapesBase { path: PathBuf, base: PathBuf },

    #[error("Path '{path}' escapes base directory '{base}' via a symbolic link (resolves to '{real}')")]
    SymlinkEscape {
        path: PathBuf,
        base: PathBuf,
        real: PathBuf,
    },

    #[error("Path '{path}' is a symbolic link and symbolic links are not allowed")]
    SymlinkNotAllowed { path: PathBuf },

    #[error("Cannot inspect path '{path}'")]
    Inspect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PathError {
    /// True for every variant that means "the target lies outside the sandbox"
    pub fn is_escape(&self) -> bool {
        matches!(
            self,
            PathError::Traversal { .. }
                | PathError::EscapesBase { .. }
                | PathError::SymlinkEscape { .. }
                | PathError::SymlinkNotAllowed { .. }
        )
    }

    /// Log security-relevant rejections on the security target
    pub fn log_if_security_critical(&self) {
        if self.is_escape() || matches!(self, PathError::NullByte) {
            tracing::error!(target: "security", "PATH REJECTED: {}", self);
        }
    }
}
