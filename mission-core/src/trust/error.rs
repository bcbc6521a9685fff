//! Signature verification errors

use thiserror::Error;

use super::TrustLevel;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// No registered key matches the claimed key id and algorithm
    #[error("Untrusted signature: no registered key '{key_id}' for algorithm '{algorithm}'")]
    UnknownKey { key_id: String, algorithm: String },

    /// The key is known but registered below the required tier
    #[error("Signature key '{key_id}' has trust level '{actual}', below the required '{required}'")]
    TrustTooLow {
        key_id: String,
        actual: TrustLevel,
        required: TrustLevel,
    },
}

impl SignatureError {
    pub fn log_if_security_critical(&self) {
        tracing::error!(target: "security", "SIGNATURE REJECTED: {}", self);
    }
}
