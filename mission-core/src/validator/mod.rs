//! Semantic validation - policy checks over a parsed template
//!
//! The validator is a list of independent [`SemanticRule`]s built from a
//! [`SemanticRules`] policy. Every rule runs; their violations are collected
//! into one layer result.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub mod rules;


use crate::config::SemanticRules;
use crate::report::{Layer, LayerResult};
use crate::template::{Dependency, Template, TemplateDocument};
use rules::*;

/// A single policy violation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticViolation {
    #[error("Resource '{resource}' declares {declared}, exceeding the ceiling of {ceiling}")]
    ResourceCeilingExceeded {
        resource: String,
        declared: String,
        ceiling: String,
    },

    #[error("Resource '{resource}' value '{value}' is not a valid quantity")]
    InvalidQuantity { resource: String, value: String },

    #[error("Denied keyword '{keyword}' found in spec")]
    DeniedKeyword { keyword: String },

    #[error("Action '{action}' is not in the allowed actions list")]
    ActionNotAllowed { action: String },

    #[error("Dependency '{dependency}' sourceUrl '{url}' is not in the URL allowlist")]
    UrlNotAllowed { dependency: String, url: String },

    #[error("Template declares {count} dependencies, exceeding the maximum of {max}")]
    TooManyDependencies { count: usize, max: usize },

    /// The policy itself is unusable; the template is rejected
    #[error("Semantic rule '{rule}' is misconfigured: {reason}")]
    MisconfiguredRule { rule: &'static str, reason: String },
}

/// What a rule sees of a template
#[derive(Debug)]
pub struct SemanticInput<'a> {
    pub spec: Value,
    /// Serialized spec, searched by keyword rules
    pub spec_text: String,
    pub dependencies: &'a [Dependency],
}

impl<'a> SemanticInput<'a> {
    pub fn from_template(template: &'a Template) -> Self {
        let spec = template.to_spec();
        let spec_text = spec.to_string();
        Self {
            spec,
            spec_text,
            dependencies: template.dependencies(),
        }
    }
}

/// Trait for semantic rules
pub trait SemanticRule: Send + Sync {
    fn check(&self, input: &SemanticInput<'_>) -> Vec<SemanticViolation>;

    /// Rule identifier
    fn rule_id(&self) -> &'static str;

    /// Rule description
    fn description(&self) -> &'static str;
}

pub struct SemanticValidator {
    rules: Vec<Box<dyn SemanticRule>>,
}

impl SemanticValidator {
    /// Build the rule set a policy calls for
    pub fn new(policy: &SemanticRules) -> Self {
        let mut rules: Vec<Box<dyn SemanticRule>> = vec![
            Box::new(ResourceCeilingRule::from_policy(policy)),
            Box::new(DeniedKeywordRule::new(&policy.denied_keywords)),
            Box::new(ActionAllowlistRule::new(&policy.allowed_actions)),
            Box::new(UrlAllowlistRule::new(&policy.url_allowlist)),
        ];
        if let Some(max) = policy.max_dependencies {
            rules.push(Box::new(DependencyLimitRule::new(max)));
        }

        Self { rules }
    }

    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.rule_id()).collect()
    }

    /// Every violation of every rule
    pub fn violations(&self, template: &Template) -> Vec<SemanticViolation> {
        let input = SemanticInput::from_template(template);
        let mut violations = Vec::new();

        for rule in &self.rules {
            let found = rule.check(&input);
            if !found.is_empty() {
                debug!(
                    "Rule '{}' ({}) reported {} violation(s)",
                    rule.rule_id(),
                    rule.description(),
                    found.len()
                );
            }
            violations.extend(found);
        }

        violations
    }

    pub fn validate(&self, template: &Template) -> LayerResult {
        let violations = self.violations(template);
        if !violations.is_empty() {
            warn!(
                "Template '{}' failed semantic validation with {} violation(s)",
                template.metadata().name,
                violations.len()
            );
        }

        LayerResult::from_errors(
            Layer::Semantic,
            violations.iter().map(ToString::to_string).collect(),
        )
    }
}

impl Default for SemanticValidator {
    fn default() -> Self {
        Self::new(&SemanticRules::default())
    }
}
