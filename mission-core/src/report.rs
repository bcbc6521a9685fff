//! Validation report types
//!
//! Every pipeline layer produces a [`LayerResult`]; the importer merges them
//! into a single [`ValidationReport`].

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::template::Template;

/// One independently pass/fail stage of the import pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Structural,
    Signature,
    Semantic,
    Dependency,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Structural => "structural",
            Layer::Signature => "signature",
            Layer::Semantic => "semantic",
            Layer::Dependency => "dependency",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerResult {
    pub layer: Layer,
    pub passed: bool,
    /// True when the layer passed without running (signature verification skipped)
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    pub errors: Vec<String>,
}

impl LayerResult {
    pub fn pass(layer: Layer) -> Self {
        Self {
            layer,
            passed: true,
            skipped: false,
            errors: Vec::new(),
        }
    }

    pub fn skipped(layer: Layer) -> Self {
        Self {
            skipped: true,
            ..Self::pass(layer)
        }
    }

    pub fn fail(layer: Layer, errors: Vec<String>) -> Self {
        Self {
            layer,
            passed: false,
            skipped: false,
            errors,
        }
    }

    /// Pass if `errors` is empty, fail otherwise
    pub fn from_errors(layer: Layer, errors: Vec<String>) -> Self {
        if errors.is_empty() {
            Self::pass(layer)
        } else {
            Self::fail(layer, errors)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub layers: Vec<LayerResult>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub performance_ms: u64,
}

impl ValidationReport {
    /// Merge layer results. The report is valid only if every layer passed.
    pub fn from_layers(layers: Vec<LayerResult>) -> Self {
        let valid = layers.iter().all(|l| l.passed);
        let errors = layers
            .iter()
            .flat_map(|l| l.errors.iter().cloned())
            .collect();

        Self {
            valid,
            layers,
            errors,
            warnings: Vec::new(),
            performance_ms: 0,
        }
    }

    /// Append a layer result, keeping `valid` and `errors` in step
    pub fn push_layer(&mut self, result: LayerResult) {
        self.valid = self.valid && result.passed;
        self.errors.extend(result.errors.iter().cloned());
        self.layers.push(result);
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn layer(&self, layer: Layer) -> Option<&LayerResult> {
        self.layers.iter().find(|l| l.layer == layer)
    }
}

/// A fully validated and resolved template
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub template: Template,
    pub validation_report: ValidationReport,
    /// Resolved dependencies keyed by their declared name
    pub resolved_dependencies: BTreeMap<String, Template>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_valid_only_when_all_layers_pass() {
        let report = ValidationReport::from_layers(vec![
            LayerResult::pass(Layer::Structural),
            LayerResult::skipped(Layer::Signature),
            LayerResult::fail(Layer::Semantic, vec!["Denied keyword 'eval'".into()]),
        ]);

        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Denied keyword 'eval'".to_string()]);
        assert!(report.layer(Layer::Signature).map_or(false, |l| l.passed));
    }

    #[test]
    fn test_push_layer_updates_validity() {
        let mut report = ValidationReport::from_layers(vec![LayerResult::pass(Layer::Structural)]);
        assert!(report.valid);

        report.push_layer(LayerResult::from_errors(Layer::Dependency, vec!["boom".into()]));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let mut report =
            ValidationReport::from_layers(vec![LayerResult::skipped(Layer::Signature)]);
        report.performance_ms = 12;
        report.warn("slow");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["performanceMs"], 12);
        assert_eq!(json["layers"][0]["layer"], "signature");
        assert_eq!(json["layers"][0]["skipped"], true);
        assert_eq!(json["warnings"][0], "slow");
    }
}
