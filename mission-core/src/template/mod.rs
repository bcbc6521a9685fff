//! Mission template model
//!
//! A template arrives in one of two wire formats. The format is decided once,
//! at parse time, and carried as a [`Template`] variant. Both variants expose
//! the same envelope through [`TemplateDocument`], so later pipeline stages
//! never branch on `apiVersion`/`kind` strings.

pub mod flat;
pub mod hybrid;
pub mod schema;

pub use flat::FlatTemplate;
pub use hybrid::{ComponentRef, Example, HybridTemplate};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// `apiVersion` of the flat (YAML) format
pub const FLAT_API_VERSION: &str = "mission-template.v1";
/// `kind` of the flat (YAML) format
pub const FLAT_KIND: &str = "MissionTemplate";
/// `apiVersion` of the hybrid (XML) format
pub const HYBRID_API_VERSION: &str = "mission-template.v2";
/// `kind` of the hybrid (XML) format
pub const HYBRID_KIND: &str = "HybridMissionTemplate";

static CHECKSUM_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^sha256:[0-9a-f]{64}$").expect("checksum pattern is valid"));

/// True if `checksum` is `sha256:` followed by 64 lowercase hex digits
pub fn is_valid_checksum(checksum: &str) -> bool {
    CHECKSUM_PATTERN.is_match(checksum)
}

/// Wire format of a raw template document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    Flat,
    Hybrid,
}

impl TemplateFormat {
    /// Hybrid documents are XML, so they start with `<` (after whitespace
    /// and an optional byte-order mark). Everything else is treated as flat.
    pub fn detect(content: &str) -> Self {
        let trimmed = content.trim_start_matches('\u{feff}').trim_start();
        if trimmed.starts_with('<') {
            TemplateFormat::Hybrid
        } else {
            TemplateFormat::Flat
        }
    }

    /// Identify the shape named by an `apiVersion`/`kind` pair.
    ///
    /// Both values must name the same known shape; a mixed pair is rejected.
    pub fn identify(api_version: &str, kind: &str) -> Result<Self, String> {
        match (api_version, kind) {
            (FLAT_API_VERSION, FLAT_KIND) => Ok(TemplateFormat::Flat),
            (HYBRID_API_VERSION, HYBRID_KIND) => Ok(TemplateFormat::Hybrid),
            (FLAT_API_VERSION, _) | (HYBRID_API_VERSION, _) => Err(format!(
                "kind '{kind}' does not match apiVersion '{api_version}'."
            )),
            _ => Err(format!(
                "Unsupported apiVersion '{api_version}'. Expected '{FLAT_API_VERSION}' or '{HYBRID_API_VERSION}'."
            )),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TemplateFormat::Flat => "yaml",
            TemplateFormat::Hybrid => "xml",
        }
    }
}

/// Claimed authorship signature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub algorithm: String,
    #[serde(default)]
    pub value: String,
}

/// Template metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub signature: Signature,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// How field names are spelled in error messages for each format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldStyle {
    Flat,
    Hybrid,
}

impl FieldStyle {
    fn label(self, flat: &'static str, hybrid: &'static str) -> &'static str {
        match self {
            FieldStyle::Flat => flat,
            FieldStyle::Hybrid => hybrid,
        }
    }
}

impl Metadata {
    /// Every problem with this metadata, collected rather than short-circuited
    pub(crate) fn problems(&self, style: FieldStyle) -> Vec<String> {
        let mut errors = Vec::new();
        let required = [
            (&self.name, style.label("metadata.name", "Metadata.Name")),
            (&self.version, style.label("metadata.version", "Metadata.Version")),
            (&self.author, style.label("metadata.author", "Metadata.Author")),
            (
                &self.signature.key_id,
                style.label("metadata.signature.keyId", "Metadata.Signature.KeyId"),
            ),
            (
                &self.signature.algorithm,
                style.label("metadata.signature.algorithm", "Metadata.Signature.Algorithm"),
            ),
            (
                &self.signature.value,
                style.label("metadata.signature.value", "Metadata.Signature.Value"),
            ),
        ];

        for (value, field) in required {
            if value.trim().is_empty() {
                errors.push(format!("{field} is required."));
            }
        }

        if self.tags.iter().any(|t| t.trim().is_empty()) {
            errors.push(format!(
                "{} entries must not be empty.",
                style.label("metadata.tags", "Metadata.Tags.Tag")
            ));
        }
        if self.tags.is_empty() {
            errors.push(format!(
                "At least one {} entry is required.",
                style.label("metadata.tags", "Metadata.Tags.Tag")
            ));
        }

        errors
    }
}

/// A declared, checksum-pinned dependency
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub checksum: String,
}

/// Problems across a dependency list: empty fields, bad checksums, duplicate names
pub(crate) fn dependency_problems(dependencies: &[Dependency]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, dep) in dependencies.iter().enumerate() {
        let label = if dep.name.trim().is_empty() {
            format!("Dependency #{}", index + 1)
        } else {
            format!("Dependency '{}'", dep.name)
        };

        if dep.name.trim().is_empty() {
            errors.push(format!("{label} requires a name."));
        } else if !seen.insert(dep.name.as_str()) {
            errors.push(format!("{label} is declared more than once."));
        }
        if dep.source_url.trim().is_empty() {
            errors.push(format!("{label} requires a sourceUrl."));
        }
        if dep.version.trim().is_empty() {
            errors.push(format!("{label} requires a version."));
        }
        if !is_valid_checksum(&dep.checksum) {
            errors.push(format!(
                "{label} checksum must match 'sha256:' followed by 64 lowercase hex characters."
            ));
        }
    }

    errors
}

/// The capability every template shape provides to the pipeline
pub trait TemplateDocument {
    fn api_version(&self) -> &str;
    fn kind(&self) -> &str;
    fn metadata(&self) -> &Metadata;
    fn dependencies(&self) -> &[Dependency];
    /// The specification as one JSON value, used by semantic validation
    fn to_spec(&self) -> Value;
}

/// A parsed template, tagged by wire format
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum Template {
    Flat(FlatTemplate),
    Hybrid(HybridTemplate),
}

impl Template {
    pub fn format(&self) -> TemplateFormat {
        match self {
            Template::Flat(_) => TemplateFormat::Flat,
            Template::Hybrid(_) => TemplateFormat::Hybrid,
        }
    }

    fn inner(&self) -> &dyn TemplateDocument {
        match self {
            Template::Flat(t) => t,
            Template::Hybrid(t) => t,
        }
    }
}

impl TemplateDocument for Template {
    fn api_version(&self) -> &str {
        self.inner().api_version()
    }

    fn kind(&self) -> &str {
        self.inner().kind()
    }

    fn metadata(&self) -> &Metadata {
        self.inner().metadata()
    }

    fn dependencies(&self) -> &[Dependency] {
        self.inner().dependencies()
    }

    fn to_spec(&self) -> Value {
        self.inner().to_spec()
    }
}
