//! Importer - sequences the validation layers for one template
//!
//! ```text
//! path ─► PathGuard ─► StructuralLoader ─► components ─► signature + semantic ─► dependencies
//!         Unparsed     StructurallyValid                 SecurityValidated        DependenciesResolved ─► Complete
//! ```
//!
//! Structural problems are reported together; every later stage fails fast.
//! No partially validated template is ever returned.

use futures::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{ImportOptions, MissionConfig, SemanticRules};
use crate::error::{ImportError, ImportStage};
use crate::loader::StructuralLoader;
use crate::paths::{PathGuard, SanitizeOptions};
use crate::report::{ImportResult, Layer, LayerResult, ValidationReport};
use crate::resolver::{DependencyResolver, NestedImporter};
use crate::template::{Template, TemplateDocument, TemplateFormat};
use crate::trust::{SignatureVerifier, TrustStore, VerifyOptions};
use crate::validator::SemanticValidator;

/// Name prefix of the scratch directory `import_from_string` writes into
const SCRATCH_PREFIX: &str = "mission-import-";

pub struct Importer {
    loader: StructuralLoader,
    verifier: SignatureVerifier,
    validator: SemanticValidator,
    resolver: DependencyResolver,
}

impl Importer {
    pub fn new(store: TrustStore, rules: SemanticRules) -> Self {
        Self {
            loader: StructuralLoader::new(),
            verifier: SignatureVerifier::new(store),
            validator: SemanticValidator::new(&rules),
            resolver: DependencyResolver::new(),
        }
    }

    pub fn from_config(config: &MissionConfig) -> Self {
        Self::new(config.trust_store(), config.rules.clone())
    }

    /// The verifier, whose trust store accepts keys between imports
    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Import, validate and resolve the template at `path`
    pub async fn import(
        &self,
        path: impl AsRef<Path>,
        options: &ImportOptions,
    ) -> Result<ImportResult, ImportError> {
        let path = path.as_ref();
        let span = info_span!("import", import_id = %Uuid::new_v4());

        async {
            info!("Importing template from {:?}", path);
            let safe = self.guard_entry(path, options).await?;
            let component_base = options
                .component_base_dir
                .clone()
                .or_else(|| safe.parent().map(Path::to_path_buf));

            let result = self
                .run(&safe, options, component_base.as_deref(), &[])
                .await;
            log_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    /// Import a template held in memory.
    ///
    /// The content is written to a private temporary directory which is
    /// removed on every exit path. Component `src` references resolve only
    /// against `options.component_base_dir`.
    pub async fn import_from_string(
        &self,
        content: &str,
        options: &ImportOptions,
    ) -> Result<ImportResult, ImportError> {
        let span = info_span!("import", import_id = %Uuid::new_v4());

        async {
            if content.len() > options.max_document_bytes {
                return Err(ImportError::TooLarge {
                    path: PathBuf::from("<string>"),
                    size: content.len() as u64,
                    max: options.max_document_bytes,
                });
            }

            let mut builder = tempfile::Builder::new();
            builder.prefix(SCRATCH_PREFIX);
            let dir = match &options.scratch_dir {
                Some(parent) => builder.tempdir_in(parent),
                None => builder.tempdir(),
            }
            .map_err(|e| ImportError::internal(ImportStage::Unparsed, e))?;

            let file = dir.path().join(format!(
                "template.{}",
                TemplateFormat::detect(content).extension()
            ));
            tokio::fs::write(&file, content)
                .await
                .map_err(|e| ImportError::internal(ImportStage::Unparsed, e))?;
            debug!("Wrote in-memory template to {:?}", file);

            let entry_options = ImportOptions {
                base_dir: Some(dir.path().to_path_buf()),
                ..options.clone()
            };
            let safe = self.guard_entry(&file, &entry_options).await?;

            let result = self
                .run(&safe, options, options.component_base_dir.as_deref(), &[])
                .await;

            if let Err(e) = dir.close() {
                warn!("Failed to remove temporary import directory: {}", e);
            }
            log_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    /// Signature and semantic validation of an already parsed template
    pub async fn validate(
        &self,
        template: &Template,
        skip_signature_verification: bool,
    ) -> ValidationReport {
        let options = ImportOptions {
            skip_signature_verification,
            ..ImportOptions::default()
        };
        self.validate_with(template, &options).await
    }

    pub async fn validate_with(
        &self,
        template: &Template,
        options: &ImportOptions,
    ) -> ValidationReport {
        let started = Instant::now();
        let mut report = self.security_report(template, options).await;
        report.performance_ms = started.elapsed().as_millis() as u64;
        report
    }

    async fn guard_entry(
        &self,
        path: &Path,
        options: &ImportOptions,
    ) -> Result<PathBuf, ImportError> {
        let guard = match &options.base_dir {
            Some(base) => SanitizeOptions::within(base),
            None => SanitizeOptions {
                allow_relative: true,
                ..SanitizeOptions::default()
            },
        }
        .with_extensions(&options.allowed_extensions);

        let safe = PathGuard::sanitize(&path.to_string_lossy(), &guard)?;
        tokio::fs::canonicalize(&safe)
            .await
            .map_err(|source| ImportError::Read { path: safe, source })
    }

    async fn security_report(
        &self,
        template: &Template,
        options: &ImportOptions,
    ) -> ValidationReport {
        let signature = self
            .verifier
            .verify(
                template,
                VerifyOptions {
                    skip_verification: options.skip_signature_verification,
                    trust_level: Some(options.trust_level),
                },
            )
            .await;
        let semantic = self.validator.validate(template);

        let mut report = ValidationReport::from_layers(vec![
            LayerResult::pass(Layer::Structural),
            signature,
            semantic,
        ]);

        let version = &template.metadata().version;
        if semver::Version::parse(version).is_err() {
            report.warn(format!(
                "Metadata version '{version}' is not a valid semantic version"
            ));
        }

        report
    }

    /// Read the canonical, already guarded `path` and run the pipeline on it
    async fn run(
        &self,
        path: &Path,
        options: &ImportOptions,
        component_base: Option<&Path>,
        chain: &[PathBuf],
    ) -> Result<ImportResult, ImportError> {
        let read_err = |source| ImportError::Read {
            path: path.to_path_buf(),
            source,
        };
        let metadata = tokio::fs::metadata(path).await.map_err(read_err)?;
        if metadata.len() > options.max_document_bytes as u64 {
            return Err(ImportError::TooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                max: options.max_document_bytes,
            });
        }
        let raw = tokio::fs::read_to_string(path).await.map_err(read_err)?;

        self.run_content(path, &raw, options, component_base, chain).await
    }

    /// The pipeline proper, over `raw` as read from `path`.
    ///
    /// `path` only names the document: it anchors cycle detection and error
    /// messages. The file is never read again.
    async fn run_content(
        &self,
        path: &Path,
        raw: &str,
        options: &ImportOptions,
        component_base: Option<&Path>,
        chain: &[PathBuf],
    ) -> Result<ImportResult, ImportError> {
        let started = Instant::now();

        let loader = self
            .loader
            .clone()
            .with_max_document_bytes(options.max_document_bytes);
        let outcome = loader.load(raw);
        let mut template = match (outcome.valid, outcome.template) {
            (true, Some(template)) => template,
            _ => {
                return Err(ImportError::Structural {
                    errors: outcome.errors,
                })
            }
        };
        debug!("Stage: {}", ImportStage::StructurallyValid);

        loader
            .resolve_components(&mut template, component_base)
            .await?;

        let mut report = self.security_report(&template, options).await;
        if !report.valid {
            warn!(
                "Template '{}' failed security validation",
                template.metadata().name
            );
            return Err(ImportError::Security {
                errors: report.errors.clone(),
                report: Box::new(report),
            });
        }
        debug!("Stage: {}", ImportStage::SecurityValidated);

        let mut chain = chain.to_vec();
        chain.push(path.to_path_buf());
        let resolved_dependencies = self
            .resolver
            .resolve(template.dependencies(), options, &chain, self)
            .await?;
        report.push_layer(LayerResult::pass(Layer::Dependency));
        debug!("Stage: {}", ImportStage::DependenciesResolved);

        let elapsed = started.elapsed();
        report.performance_ms = elapsed.as_millis() as u64;
        if elapsed > options.performance_target {
            warn!(
                "Import of '{}' took {}ms, over the {}ms target",
                template.metadata().name,
                elapsed.as_millis(),
                options.performance_target.as_millis()
            );
            report.warn(format!(
                "Import took {}ms, exceeding the {}ms performance target",
                elapsed.as_millis(),
                options.performance_target.as_millis()
            ));
        }

        Ok(ImportResult {
            template,
            validation_report: report,
            resolved_dependencies,
        })
    }
}

impl NestedImporter for Importer {
    fn import_nested<'a>(
        &'a self,
        path: &'a Path,
        content: &'a [u8],
        options: &'a ImportOptions,
        chain: &'a [PathBuf],
    ) -> BoxFuture<'a, Result<ImportResult, ImportError>> {
        async move {
            let raw = std::str::from_utf8(content).map_err(|e| ImportError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })?;
            let component_base = options
                .component_base_dir
                .clone()
                .or_else(|| path.parent().map(Path::to_path_buf));
            self.run_content(path, raw, options, component_base.as_deref(), chain).await
        }
        .boxed()
    }
}

fn log_outcome(result: &Result<ImportResult, ImportError>) {
    match result {
        Ok(imported) => info!(
            "Stage: {} - template '{}' imported in {}ms",
            ImportStage::Complete,
            imported.template.metadata().name,
            imported.validation_report.performance_ms
        ),
        Err(e) => warn!("Import failed after stage {}: {}", e.stage(), e),
    }
}
