//! StructuralLoader - raw document to canonical [`Template`]
//!
//! Loading happens in two phases. `load` is a pure parse that collects every
//! structural problem. `resolve_components` then follows hybrid component
//! `src` references through the [`PathGuard`]; its failures are reported as
//! [`ComponentError`] rather than folded into the structural list because
//! they depend on the filesystem.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::paths::{PathError, PathGuard, SanitizeOptions};
use crate::template::schema::{Draft7Compiler, SchemaCompiler};
use crate::template::{
    ComponentRef, FlatTemplate, HybridTemplate, Template, TemplateDocument, TemplateFormat,
};

/// Default ceiling for a raw template document or component file
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 1024 * 1024;

/// Result of a structural load attempt
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
    pub template: Option<Template>,
}

impl LoadOutcome {
    fn rejected(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
            template: None,
        }
    }
}

/// Component `src` resolution failures
#[derive(Error, Debug)]
pub enum ComponentError {
    #[error("{component} src '{src}' escapes component base directory '{}'", .base.display())]
    EscapesBase {
        component: String,
        src: String,
        base: PathBuf,
        #[source]
        source: PathError,
    },

    #[error("{component} src '{src}' does not resolve to a regular file: {reason}")]
    Missing {
        component: String,
        src: String,
        reason: String,
    },

    #[error("{component} src '{src}' cannot be resolved without a component base directory")]
    NoBaseDirectory { component: String, src: String },
}

/// Parses raw documents into templates
#[derive(Clone)]
pub struct StructuralLoader {
    compiler: Arc<dyn SchemaCompiler>,
    max_document_bytes: usize,
}

impl Default for StructuralLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralLoader {
    /// Loader using the Draft-07 schema compiler
    pub fn new() -> Self {
        Self::with_compiler(Draft7Compiler)
    }

    pub fn with_compiler(compiler: impl SchemaCompiler + 'static) -> Self {
        Self {
            compiler: Arc::new(compiler),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }

    pub fn with_max_document_bytes(mut self, max_document_bytes: usize) -> Self {
        self.max_document_bytes = max_document_bytes;
        self
    }

    /// Parse `raw` and validate its structure
    pub fn load(&self, raw: &str) -> LoadOutcome {
        if raw.len() > self.max_document_bytes {
            return LoadOutcome::rejected(vec![format!(
                "Template document is {} bytes, exceeding the maximum of {} bytes.",
                raw.len(),
                self.max_document_bytes
            )]);
        }
        if raw.trim().is_empty() {
            return LoadOutcome::rejected(vec!["Template document is empty.".to_string()]);
        }

        let format = TemplateFormat::detect(raw);
        debug!("Detected {:?} template format", format);

        let parsed = match format {
            TemplateFormat::Flat => FlatTemplate::parse(raw).map(Template::Flat),
            TemplateFormat::Hybrid => {
                HybridTemplate::parse(raw, self.compiler.as_ref()).map(Template::Hybrid)
            }
        };

        match parsed {
            Ok(template) => {
                info!(
                    "Template '{}' v{} is structurally valid",
                    template.metadata().name,
                    template.metadata().version
                );
                LoadOutcome {
                    valid: true,
                    errors: Vec::new(),
                    template: Some(template),
                }
            }
            Err(errors) => {
                debug!("Structural validation found {} problem(s)", errors.len());
                LoadOutcome::rejected(errors)
            }
        }
    }

    /// Resolve and read every component `src` reference of a hybrid template.
    ///
    /// A reference must land on an existing regular file, not a symlink,
    /// inside `base_dir`. Flat templates have no components.
    pub async fn resolve_components(
        &self,
        template: &mut Template,
        base_dir: Option<&Path>,
    ) -> Result<(), ComponentError> {
        let Template::Hybrid(hybrid) = template else {
            return Ok(());
        };

        for (component, reference) in hybrid.component_refs_mut() {
            let ComponentRef::Source { src, content } = reference else {
                continue;
            };

            let base = base_dir.ok_or_else(|| ComponentError::NoBaseDirectory {
                component: component.to_string(),
                src: src.clone(),
            })?;

            let path = PathGuard::sanitize(src, &SanitizeOptions::within(base)).map_err(|e| {
                match e {
                    PathError::SymlinkNotAllowed { .. } => ComponentError::Missing {
                        component: component.to_string(),
                        src: src.clone(),
                        reason: e.to_string(),
                    },
                    e if e.is_escape() => ComponentError::EscapesBase {
                        component: component.to_string(),
                        src: src.clone(),
                        base: base.to_path_buf(),
                        source: e,
                    },
                    e => ComponentError::Missing {
                        component: component.to_string(),
                        src: src.clone(),
                        reason: e.to_string(),
                    },
                }
            })?;

            let text = self.read_component(component, src, &path).await?;
            debug!("Resolved {} src '{}' -> {:?}", component, src, path);
            *content = Some(text);
        }

        Ok(())
    }

    async fn read_component(
        &self,
        component: &str,
        src: &str,
        path: &Path,
    ) -> Result<String, ComponentError> {
        let missing = |reason: String| ComponentError::Missing {
            component: component.to_string(),
            src: src.to_string(),
            reason,
        };

        let metadata = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| missing(e.to_string()))?;
        if !metadata.is_file() {
            return Err(missing("not a regular file".to_string()));
        }
        if metadata.len() > self.max_document_bytes as u64 {
            return Err(missing(format!(
                "file is {} bytes, exceeding the maximum of {} bytes",
                metadata.len(),
                self.max_document_bytes
            )));
        }

        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| missing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn hybrid_with_persona(persona: &str) -> String {
        format!(
            r#"<MissionTemplate apiVersion="mission-template.v2" kind="HybridMissionTemplate">
  <Metadata>
    <Name>doc-writer</Name><Version>1.0.0</Version><Author>docs</Author>
    <Signature><KeyId>k</KeyId><Algorithm>ed25519</Algorithm><Value>v</Value></Signature>
    <Tags><Tag>docs</Tag></Tags>
  </Metadata>
  <MissionObjective>Write the docs</MissionObjective>
  {persona}
  <Instructions>Be concise.</Instructions>
  <Examples><Example name="one"><Input>a</Input><Output>b</Output></Example></Examples>
  <OutputSchema>{{"$schema":"http://json-schema.org/draft-07/schema#","type":"object"}}</OutputSchema>
</MissionTemplate>"#
        )
    }

    #[test]
    fn test_load_rejects_oversized_document() {
        let loader = StructuralLoader::new().with_max_document_bytes(16);
        let outcome = loader.load("apiVersion: mission-template.v1\n");
        assert!(!outcome.valid);
        assert!(outcome.errors[0].contains("exceeding the maximum"));
    }

    #[test]
    fn test_load_hybrid() {
        let outcome = StructuralLoader::new().load(&hybrid_with_persona(
            "<AgentPersona>Technical writer</AgentPersona>",
        ));
        assert!(outcome.valid, "{:?}", outcome.errors);
        assert_eq!(
            outcome.template.map(|t| t.format()),
            Some(TemplateFormat::Hybrid)
        );
    }

    #[tokio::test]
    async fn test_resolve_component_reads_file() {
        let base = TempDir::new().unwrap();
        fs::create_dir_all(base.path().join("components")).unwrap();
        fs::write(base.path().join("components/persona.md"), "Senior reviewer").unwrap();

        let loader = StructuralLoader::new();
        let mut template = loader
            .load(&hybrid_with_persona(r#"<AgentPersona src="components/persona.md"/>"#))
            .template
            .unwrap();

        loader
            .resolve_components(&mut template, Some(base.path()))
            .await
            .unwrap();

        let Template::Hybrid(hybrid) = &template else {
            panic!("expected hybrid template");
        };
        assert_eq!(hybrid.persona.content(), Some("Senior reviewer"));
    }

    #[tokio::test]
    async fn test_resolve_component_outside_base_rejected() {
        let base = TempDir::new().unwrap();
        let loader = StructuralLoader::new();
        let mut template = loader
            .load(&hybrid_with_persona(r#"<AgentPersona src="../outside.xml" />"#))
            .template
            .unwrap();

        let err = loader
            .resolve_components(&mut template, Some(base.path()))
            .await
            .unwrap_err();

        assert!(matches!(err, ComponentError::EscapesBase { .. }));
        assert!(err.to_string().contains("escapes component base directory"));
    }

    #[tokio::test]
    async fn test_resolve_missing_component() {
        let base = TempDir::new().unwrap();
        let loader = StructuralLoader::new();
        let mut template = loader
            .load(&hybrid_with_persona(r#"<AgentPersona src="nope.md" />"#))
            .template
            .unwrap();

        let err = loader
            .resolve_components(&mut template, Some(base.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ComponentError::Missing { .. }));
    }

    #[tokio::test]
    async fn test_resolve_directory_component_rejected() {
        let base = TempDir::new().unwrap();
        fs::create_dir_all(base.path().join("persona.md")).unwrap();
        let loader = StructuralLoader::new();
        let mut template = loader
            .load(&hybrid_with_persona(r#"<AgentPersona src="persona.md" />"#))
            .template
            .unwrap();

        let err = loader
            .resolve_components(&mut template, Some(base.path()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_symlinked_component_rejected() {
        use std::os::unix::fs::symlink;

        let base = TempDir::new().unwrap();
        fs::write(base.path().join("real.md"), "persona").unwrap();
        symlink(base.path().join("real.md"), base.path().join("link.md")).unwrap();

        let loader = StructuralLoader::new();
        let mut template = loader
            .load(&hybrid_with_persona(r#"<AgentPersona src="link.md" />"#))
            .template
            .unwrap();

        let err = loader
            .resolve_components(&mut template, Some(base.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ComponentError::Missing { .. }));
    }

    #[tokio::test]
    async fn test_resolve_without_base_directory() {
        let loader = StructuralLoader::new();
        let mut template = loader
            .load(&hybrid_with_persona(r#"<AgentPersona src="persona.md" />"#))
            .template
            .unwrap();

        let err = loader.resolve_components(&mut template, None).await.unwrap_err();
        assert!(matches!(err, ComponentError::NoBaseDirectory { .. }));
    }
}
