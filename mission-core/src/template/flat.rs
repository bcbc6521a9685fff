//! Flat template parsing (YAML)
//!
//! The flat format is an `apiVersion`/`kind`/`metadata`/`spec` envelope with
//! an open `spec` map and an optional `dependencies` list. Every structural
//! problem is collected so the caller sees them all in one report.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    dependency_problems, Dependency, FieldStyle, Metadata, TemplateDocument, TemplateFormat,
};

/// A flat mission template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatTemplate {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub spec: Map<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

impl FlatTemplate {
    /// Parse and structurally validate a flat document.
    ///
    /// Returns every problem found when the document is not acceptable.
    pub fn parse(content: &str) -> Result<Self, Vec<String>> {
        let root: Value = serde_yaml_ng::from_str(content)
            .map_err(|e| vec![format!("Invalid YAML document: {e}")])?;

        let Value::Object(root) = root else {
            return Err(vec!["Template document must be a mapping.".to_string()]);
        };

        let mut errors = Vec::new();

        let api_version = string_field(&root, "apiVersion");
        let kind = string_field(&root, "kind");
        match (&api_version, &kind) {
            (Some(api_version), Some(kind)) => match TemplateFormat::identify(api_version, kind) {
                Ok(TemplateFormat::Flat) => {}
                Ok(TemplateFormat::Hybrid) => errors.push(format!(
                    "apiVersion '{api_version}' names the hybrid format, which must be an XML document."
                )),
                Err(e) => errors.push(e),
            },
            _ => {
                if api_version.is_none() {
                    errors.push("apiVersion is required.".to_string());
                }
                if kind.is_none() {
                    errors.push("kind is required.".to_string());
                }
            }
        }

        let metadata = match root.get("metadata") {
            None | Some(Value::Null) => {
                errors.push("metadata is required.".to_string());
                None
            }
            Some(value) => match serde_json::from_value::<Metadata>(value.clone()) {
                Ok(metadata) => {
                    errors.extend(metadata.problems(FieldStyle::Flat));
                    Some(metadata)
                }
                Err(e) => {
                    errors.push(format!("metadata is malformed: {e}"));
                    None
                }
            },
        };

        let spec = match root.get("spec") {
            Some(Value::Object(spec)) => Some(spec.clone()),
            None | Some(Value::Null) => {
                errors.push("spec is required.".to_string());
                None
            }
            Some(_) => {
                errors.push("spec must be a mapping.".to_string());
                None
            }
        };

        let dependencies = match root.get("dependencies") {
            None | Some(Value::Null) => Vec::new(),
            Some(value @ Value::Array(_)) => {
                match serde_json::from_value::<Vec<Dependency>>(value.clone()) {
                    Ok(deps) => {
                        errors.extend(dependency_problems(&deps));
                        deps
                    }
                    Err(e) => {
                        errors.push(format!("dependencies are malformed: {e}"));
                        Vec::new()
                    }
                }
            }
            Some(_) => {
                errors.push("dependencies must be a list.".to_string());
                Vec::new()
            }
        };

        match (errors.is_empty(), api_version, kind, metadata, spec) {
            (true, Some(api_version), Some(kind), Some(metadata), Some(spec)) => Ok(FlatTemplate {
                api_version,
                kind,
                metadata,
                spec,
                dependencies,
            }),
            _ => Err(errors),
        }
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

impl TemplateDocument for FlatTemplate {
    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    fn to_spec(&self) -> Value {
        Value::Object(self.spec.clone())
    }
}
