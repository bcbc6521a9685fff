//! Mission template import and validation library

pub mod config;
pub mod error;
pub mod importer;
pub mod loader;
pub mod paths;
pub mod report;
pub mod resolver;
pub mod template;
pub mod trust;
pub mod validator;

pub use config::{ImportOptions, MissionConfig, SemanticRules};
pub use error::{FailureKind, ImportError, ImportStage};
pub use importer::Importer;
pub use report::{ImportResult, Layer, LayerResult, ValidationReport};
pub use template::{Template, TemplateDocument, TemplateFormat};
pub use trust::{TrustLevel, TrustStore, TrustedKey};
