//! mission - validate and import mission templates from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mission_core::loader::StructuralLoader;
use mission_core::trust::hasher::hash_file;
use mission_core::{
    ImportOptions, Importer, MissionConfig, TemplateDocument, TrustLevel, ValidationReport,
};

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "mission",
    about = "Validate and import mission templates",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Configuration file with trusted keys and semantic rules
    #[clap(long, default_value = "mission.yaml", global = true)]
    config: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full import pipeline on a template
    Import {
        /// Template file (.yaml, .yml or .xml)
        path: PathBuf,

        /// Skip signature verification (development only)
        #[clap(long)]
        skip_signature: bool,

        /// Minimum trust level required of the signing key
        #[clap(long)]
        trust_level: Option<TrustLevel>,

        /// Directory the template path must stay within
        #[clap(long)]
        base_dir: Option<PathBuf>,

        /// Directory dependency paths must stay within
        #[clap(long)]
        dependency_base_dir: Option<PathBuf>,

        /// Print the result as JSON
        #[clap(long)]
        json: bool,
    },

    /// Run the structural, signature and semantic layers without resolving dependencies
    Validate {
        /// Template file (.yaml, .yml or .xml)
        path: PathBuf,

        /// Skip signature verification (development only)
        #[clap(long)]
        skip_signature: bool,

        /// Print the report as JSON
        #[clap(long)]
        json: bool,
    },

    /// Print the sha256 checksum used to pin a dependency
    Checksum {
        /// File to hash
        path: PathBuf,
    },
}

/// Logs go to stderr so stdout stays parseable
fn initialize_tracing(log_level: &LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level);

    let ok = match cli.command {
        Command::Import {
            path,
            skip_signature,
            trust_level,
            base_dir,
            dependency_base_dir,
            json,
        } => {
            let config = MissionConfig::load_or_default(&cli.config).await?;
            let mut options = config.import_options();
            options.skip_signature_verification = skip_signature;
            if let Some(level) = trust_level {
                options.trust_level = level;
            }
            if base_dir.is_some() {
                options.base_dir = base_dir;
            }
            if dependency_base_dir.is_some() {
                options.dependency_base_dir = dependency_base_dir;
            }
            import_command(&config, &path, &options, json).await?
        }
        Command::Validate {
            path,
            skip_signature,
            json,
        } => {
            let config = MissionConfig::load_or_default(&cli.config).await?;
            let mut options = config.import_options();
            options.skip_signature_verification = skip_signature;
            validate_command(&config, &path, &options, json).await?
        }
        Command::Checksum { path } => {
            let checksum = hash_file(&path).await?;
            println!("{checksum}");
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn import_command(
    config: &MissionConfig,
    path: &Path,
    options: &ImportOptions,
    json: bool,
) -> Result<bool> {
    debug!("Importing {:?} with options {:?}", path, options);
    let importer = Importer::from_config(config);

    match importer.import(path, options).await {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                let metadata = result.template.metadata();
                println!(
                    "✅ Imported '{}' v{} ({:?})",
                    metadata.name,
                    metadata.version,
                    result.template.format()
                );
                for name in result.resolved_dependencies.keys() {
                    println!("   dependency: {name}");
                }
                print_warnings(&result.validation_report);
                println!(
                    "   completed in {}ms",
                    result.validation_report.performance_ms
                );
            }
            Ok(true)
        }
        Err(e) => {
            if json {
                let body = serde_json::json!({
                    "error": e.to_string(),
                    "kind": e.kind(),
                    "stage": e.stage().to_string(),
                    "validationReport": e.report(),
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                eprintln!("❌ Import failed at stage '{}': {}", e.stage(), e);
                if let Some(report) = e.report() {
                    print_errors(report);
                }
            }
            Ok(false)
        }
    }
}

async fn validate_command(
    config: &MissionConfig,
    path: &Path,
    options: &ImportOptions,
    json: bool,
) -> Result<bool> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read template: {}", path.display()))?;

    let loader = StructuralLoader::new().with_max_document_bytes(options.max_document_bytes);
    let outcome = loader.load(&raw);
    let Some(mut template) = outcome.template.filter(|_| outcome.valid) else {
        if json {
            let body = serde_json::json!({ "valid": false, "errors": outcome.errors });
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else {
            eprintln!("❌ Structural validation failed:");
            for error in &outcome.errors {
                eprintln!("   - {error}");
            }
        }
        return Ok(false);
    };

    let component_base = options
        .component_base_dir
        .clone()
        .or_else(|| path.parent().map(Path::to_path_buf));
    loader
        .resolve_components(&mut template, component_base.as_deref())
        .await?;

    let report = Importer::from_config(config)
        .validate_with(&template, options)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.valid {
        println!("✅ '{}' passed validation", template.metadata().name);
        print_warnings(&report);
    } else {
        eprintln!("❌ '{}' failed validation", template.metadata().name);
        print_errors(&report);
    }
    Ok(report.valid)
}

fn print_errors(report: &ValidationReport) {
    for layer in report.layers.iter().filter(|l| !l.passed) {
        for error in &layer.errors {
            eprintln!("   [{}] {}", layer.layer, error);
        }
    }
}

fn print_warnings(report: &ValidationReport) {
    for warning in &report.warnings {
        println!("   ⚠️  {warning}");
    }
}
