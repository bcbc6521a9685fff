//! Shared fixtures for integration tests

#![allow(dead_code)]

use mission_core::template::Dependency;
use mission_core::trust::hasher::hash_string;
use mission_core::{SemanticRules, TrustLevel, TrustStore, TrustedKey};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;

pub const KEY_ID: &str = "platform-key";
pub const ALGORITHM: &str = "ed25519";

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Store holding the fixture signing key at `level`
pub fn store_with_key(level: TrustLevel) -> TrustStore {
    let mut store = TrustStore::new();
    store.register(
        TrustedKey::new(KEY_ID, ALGORITHM, "MCowBQYDK2VwAyEAfixture", level).with_owner("platform"),
    );
    store
}

/// Policy permitting local file dependencies
pub fn local_rules() -> SemanticRules {
    SemanticRules {
        url_allowlist: vec!["file:///".to_string()],
        ..SemanticRules::default()
    }
}

/// A flat template signed with the fixture key
pub fn flat_template(name: &str, spec: &str, dependencies: &[Dependency]) -> String {
    let mut yaml = format!(
        r#"apiVersion: mission-template.v1
kind: MissionTemplate
metadata:
  name: {name}
  version: 1.0.0
  author: platform-team
  signature:
    keyId: {KEY_ID}
    algorithm: {ALGORITHM}
    value: c2lnbmF0dXJl
  tags: [fixture]
spec:
{spec}
"#
    );

    if !dependencies.is_empty() {
        yaml.push_str("dependencies:\n");
        for dep in dependencies {
            yaml.push_str(&format!(
                "  - name: {}\n    sourceUrl: {}\n    version: {}\n    checksum: {}\n",
                dep.name, dep.source_url, dep.version, dep.checksum
            ));
        }
    }
    yaml
}

/// A hybrid template; `tags`, `persona` and `output_schema` are spliced in verbatim
pub fn hybrid_template(tags: &str, persona: &str, output_schema: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MissionTemplate apiVersion="mission-template.v2" kind="HybridMissionTemplate">
  <Metadata>
    <Name>security-review</Name>
    <Version>1.2.0</Version>
    <Author>appsec</Author>
    <Signature>
      <KeyId>{KEY_ID}</KeyId>
      <Algorithm>{ALGORITHM}</Algorithm>
      <Value>c2lnbmF0dXJl</Value>
    </Signature>
    <Tags>{tags}</Tags>
  </Metadata>
  <MissionObjective><![CDATA[Review the change set for injection risks]]></MissionObjective>
  {persona}
  <Instructions>List findings by severity.</Instructions>
  <ContextData>
    <Item key="language">rust</Item>
  </ContextData>
  <Examples>
    <Example name="finding">
      <Input>SELECT * FROM users WHERE id = $input</Input>
      <Output>High: unparameterised query</Output>
    </Example>
  </Examples>
  <OutputSchema><![CDATA[{output_schema}]]></OutputSchema>
</MissionTemplate>
"#
    )
}

pub const DRAFT07_SCHEMA: &str =
    r#"{"$schema":"http://json-schema.org/draft-07/schema#","type":"object","properties":{"findings":{"type":"array"}}}"#;

/// Write `content` to `dir/rel`, creating parent directories
pub fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Dependency entry pinned to `content` at `path`
pub fn pinned(name: &str, path: &Path, content: &str) -> Dependency {
    Dependency {
        name: name.to_string(),
        source_url: format!("file://{}", path.display()),
        version: "1.0.0".to_string(),
        checksum: hash_string(content),
    }
}
