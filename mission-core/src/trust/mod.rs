//! Trust - authorship signatures and content checksums
//!
//! A template names the key it claims to be signed with. The
//! [`SignatureVerifier`] resolves that claim against an explicit
//! [`TrustStore`] owned by the caller, then gates acceptance on the key's
//! [`TrustLevel`]. The store is a value, not process-wide state: each
//! importer (and each test) owns its own.
//!
//! The [`hasher`] module produces the canonical `sha256:<hex>` digests used to
//! pin dependencies.

pub mod error;
pub mod hasher;
pub mod store;
pub mod verifier;

pub use error::SignatureError;
pub use store::{TrustLevel, TrustStore, TrustedKey};
pub use verifier::{SignatureVerifier, VerifyOptions};
