//! Import configuration
//!
//! [`ImportOptions`] are per-call knobs. [`SemanticRules`] is the policy an
//! importer enforces. [`MissionConfig`] bundles both, plus the trusted key
//! list, in one YAML file:
//!
//! ```yaml
//! rules:
//!   maxResourceMemory: 2Gi
//!   maxResourceCpu: "2"
//!   allowedActions: [read_file, search]
//!   deniedKeywords: [eval, "/rm\\s+-rf/"]
//!   urlAllowlist: ["file:///srv/missions/"]
//!   maxDependencies: 8
//! trustedKeys:
//!   - keyId: platform
//!     algorithm: ed25519
//!     publicKey: MCowBQYDK2VwAyEA
//!     trustLevel: verified-internal
//! import:
//!   trustLevel: signed-known
//!   componentBaseDir: /srv/missions/components
//!   performanceTargetMs: 1000
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::loader::DEFAULT_MAX_DOCUMENT_BYTES;
use crate::trust::{TrustLevel, TrustStore, TrustedKey};

/// Soft wall-clock target for one import
pub const DEFAULT_PERFORMANCE_TARGET: Duration = Duration::from_millis(1000);

fn default_extensions() -> Vec<String> {
    ["yaml", "yml", "xml"].iter().map(|s| s.to_string()).collect()
}

/// Semantic policy. The default is maximally restrictive: every allowlist is
/// empty and no ceiling is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SemanticRules {
    /// Memory ceiling such as `512Mi`, `2G` or a plain byte count
    pub max_resource_memory: Option<String>,
    /// CPU ceiling in cores (`"2"`, `"0.5"`) or millicores (`"500m"`)
    pub max_resource_cpu: Option<String>,
    /// Permitted action names. Empty means actions are not restricted.
    pub allowed_actions: Vec<String>,
    /// Case-insensitive keywords, or `/regex/` patterns, forbidden anywhere in the spec
    pub denied_keywords: Vec<String>,
    /// Dependency source URLs that may be fetched. An entry containing `*`,
    /// `?` or `[` is a glob pattern. Any other entry is a prefix matched on a
    /// path boundary: `file:///srv/missions` admits `file:///srv/missions/a.yaml`
    /// but not `file:///srv/missions-old/a.yaml`.
    pub url_allowlist: Vec<String>,
    pub max_dependencies: Option<usize>,
}

/// Per-call import options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Bypass signature verification. Test and trusted-pipeline use only.
    pub skip_signature_verification: bool,
    /// Minimum tier the signing key must hold
    pub trust_level: TrustLevel,
    /// Directory the imported path must stay within
    pub base_dir: Option<PathBuf>,
    /// Directory hybrid component `src` references resolve against; defaults
    /// to the directory of the template being imported
    pub component_base_dir: Option<PathBuf>,
    /// Directory `file://` dependencies must stay within
    pub dependency_base_dir: Option<PathBuf>,
    pub allowed_extensions: Vec<String>,
    /// Exceeding this emits a warning; it never fails the import
    pub performance_target: Duration,
    pub max_document_bytes: usize,
    /// Parent directory for the scratch files of `import_from_string`;
    /// defaults to the system temporary directory
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            skip_signature_verification: false,
            trust_level: TrustLevel::default(),
            base_dir: None,
            component_base_dir: None,
            dependency_base_dir: None,
            allowed_extensions: default_extensions(),
            performance_target: DEFAULT_PERFORMANCE_TARGET,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            scratch_dir: None,
        }
    }
}

impl ImportOptions {
    pub fn skipping_signatures(mut self) -> Self {
        self.skip_signature_verification = true;
        self
    }

    pub fn with_trust_level(mut self, trust_level: TrustLevel) -> Self {
        self.trust_level = trust_level;
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_component_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.component_base_dir = Some(dir.into());
        self
    }

    pub fn with_dependency_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dependency_base_dir = Some(dir.into());
        self
    }

    pub fn with_performance_target(mut self, target: Duration) -> Self {
        self.performance_target = target;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

/// `import` section of the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportDefaults {
    pub trust_level: TrustLevel,
    pub base_dir: Option<PathBuf>,
    pub component_base_dir: Option<PathBuf>,
    pub dependency_base_dir: Option<PathBuf>,
    pub allowed_extensions: Vec<String>,
    pub performance_target_ms: u64,
    pub max_document_bytes: usize,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ImportDefaults {
    fn default() -> Self {
        Self {
            trust_level: TrustLevel::default(),
            base_dir: None,
            component_base_dir: None,
            dependency_base_dir: None,
            allowed_extensions: default_extensions(),
            performance_target_ms: DEFAULT_PERFORMANCE_TARGET.as_millis() as u64,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            scratch_dir: None,
        }
    }
}

/// Configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MissionConfig {
    pub rules: SemanticRules,
    pub trusted_keys: Vec<TrustedKey>,
    pub import: ImportDefaults,
}

impl MissionConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading mission configuration from: {:?}", path);

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))?;

        debug!(
            "Loaded {} trusted key(s), {} denied keyword(s)",
            config.trusted_keys.len(),
            config.rules.denied_keywords.len()
        );
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise the restrictive defaults
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            info!("No configuration at {:?}, using restrictive defaults", path);
            Ok(Self::default())
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).context("Failed to parse configuration YAML")
    }

    pub fn trust_store(&self) -> TrustStore {
        self.trusted_keys.iter().cloned().collect()
    }

    pub fn import_options(&self) -> ImportOptions {
        let defaults = &self.import;
        ImportOptions {
            skip_signature_verification: false,
            trust_level: defaults.trust_level,
            base_dir: defaults.base_dir.clone(),
            component_base_dir: defaults.component_base_dir.clone(),
            dependency_base_dir: defaults.dependency_base_dir.clone(),
            allowed_extensions: defaults.allowed_extensions.clone(),
            performance_target: Duration::from_millis(defaults.performance_target_ms),
            max_document_bytes: defaults.max_document_bytes,
            scratch_dir: defaults.scratch_dir.clone(),
        }
    }
}
