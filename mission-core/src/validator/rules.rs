//! Semantic rules for mission templates

use super::{SemanticInput, SemanticRule, SemanticViolation};
use crate::config::SemanticRules;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

/// Rule: declared resources must not exceed configured ceilings
pub struct ResourceCeilingRule {
    memory: Option<Ceiling>,
    cpu: Option<Ceiling>,
}

struct Ceiling {
    raw: String,
    limit: Option<u64>,
}

impl Ceiling {
    fn new(raw: &str, parse: fn(&str) -> Option<u64>) -> Self {
        Self {
            raw: raw.to_string(),
            limit: parse(raw),
        }
    }
}

impl ResourceCeilingRule {
    pub fn from_policy(policy: &SemanticRules) -> Self {
        Self {
            memory: policy
                .max_resource_memory
                .as_deref()
                .map(|raw| Ceiling::new(raw, parse_memory)),
            cpu: policy
                .max_resource_cpu
                .as_deref()
                .map(|raw| Ceiling::new(raw, parse_cpu)),
        }
    }

    fn check_resource(
        &self,
        resource: &str,
        value: &str,
        violations: &mut Vec<SemanticViolation>,
    ) {
        let (ceiling, declared) = match resource {
            "memory" => (&self.memory, parse_memory(value)),
            "cpu" => (&self.cpu, parse_cpu(value)),
            _ => return,
        };
        let Some(ceiling) = ceiling else {
            return;
        };
        let Some(limit) = ceiling.limit else {
            // reported once by check()
            return;
        };

        match declared {
            None => violations.push(SemanticViolation::InvalidQuantity {
                resource: resource.to_string(),
                value: value.to_string(),
            }),
            Some(declared) if declared > limit => {
                violations.push(SemanticViolation::ResourceCeilingExceeded {
                    resource: resource.to_string(),
                    declared: value.to_string(),
                    ceiling: ceiling.raw.clone(),
                })
            }
            Some(_) => {}
        }
    }
}

impl SemanticRule for ResourceCeilingRule {
    fn rule_id(&self) -> &'static str {
        "resource-ceiling"
    }

    fn description(&self) -> &'static str {
        "Declared memory and cpu must not exceed configured ceilings"
    }

    fn check(&self, input: &SemanticInput<'_>) -> Vec<SemanticViolation> {
        let mut violations = Vec::new();

        for (name, ceiling) in [("memory", &self.memory), ("cpu", &self.cpu)] {
            if let Some(Ceiling { raw, limit: None }) = ceiling {
                violations.push(SemanticViolation::MisconfiguredRule {
                    rule: self.rule_id(),
                    reason: format!("{name} ceiling '{raw}' is not a valid quantity"),
                });
            }
        }

        let mut declared = Vec::new();
        collect_resources(&input.spec, &mut declared);
        for (resource, value) in declared {
            self.check_resource(resource, &value, &mut violations);
        }

        violations
    }
}

/// `(resource, value)` pairs from every `resources` map in the spec, plus
/// flattened `resources.memory` / `resources.cpu` keys
fn collect_resources(value: &Value, out: &mut Vec<(&'static str, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match key.as_str() {
                    "resources" => {
                        if let Value::Object(resources) = child {
                            for (name, amount) in resources {
                                if let (Some(resource), Some(amount)) =
                                    (resource_name(name), scalar_text(amount))
                                {
                                    out.push((resource, amount));
                                }
                            }
                        }
                    }
                    dotted => {
                        if let (Some(resource), Some(amount)) = (
                            dotted.strip_prefix("resources.").and_then(resource_name),
                            scalar_text(child),
                        ) {
                            out.push((resource, amount));
                        }
                    }
                }
                collect_resources(child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_resources(item, out);
            }
        }
        _ => {}
    }
}

fn resource_name(name: &str) -> Option<&'static str> {
    match name {
        "memory" => Some("memory"),
        "cpu" => Some("cpu"),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Memory quantity in bytes: plain bytes, decimal (`K`, `M`, `G`, `T`, optional
/// `B`) or binary (`Ki`, `Mi`, `Gi`, `Ti`, optional `B`) suffixes
pub fn parse_memory(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);
    let number: f64 = number.parse().ok()?;

    let multiplier: f64 = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1.0,
        "k" | "kb" => 1e3,
        "m" | "mb" => 1e6,
        "g" | "gb" => 1e9,
        "t" | "tb" => 1e12,
        "ki" | "kib" => 1024.0,
        "mi" | "mib" => 1024.0 * 1024.0,
        "gi" | "gib" => 1024.0 * 1024.0 * 1024.0,
        "ti" | "tib" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };

    let bytes = number * multiplier;
    (bytes.is_finite() && bytes >= 0.0).then(|| bytes.round() as u64)
}

/// CPU quantity in millicores: `"500m"`, `"2"` or `"0.5"`
pub fn parse_cpu(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Some(millis) = raw.strip_suffix('m') {
        return millis.parse().ok();
    }

    let cores: f64 = raw.parse().ok()?;
    let millis = cores * 1000.0;
    (millis.is_finite() && millis >= 0.0).then(|| millis.round() as u64)
}

/// Rule: denylisted keywords or `/regex/` patterns must not appear anywhere in the spec
pub struct DeniedKeywordRule {
    patterns: Vec<KeywordPattern>,
}

enum KeywordPattern {
    Literal { keyword: String, lowered: String },
    Pattern {
        source: String,
        compiled: Result<Regex, String>,
    },
}

impl DeniedKeywordRule {
    pub fn new(keywords: &[String]) -> Self {
        let patterns = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| match k.strip_prefix('/').and_then(|k| k.strip_suffix('/')) {
                Some(pattern) if !pattern.is_empty() => KeywordPattern::Pattern {
                    source: k.to_string(),
                    compiled: Regex::new(pattern).map_err(|e| e.to_string()),
                },
                _ => KeywordPattern::Literal {
                    keyword: k.to_string(),
                    lowered: k.to_lowercase(),
                },
            })
            .collect();

        Self { patterns }
    }
}

impl SemanticRule for DeniedKeywordRule {
    fn rule_id(&self) -> &'static str {
        "denied-keyword"
    }

    fn description(&self) -> &'static str {
        "Spec text must not contain denylisted keywords or patterns"
    }

    fn check(&self, input: &SemanticInput<'_>) -> Vec<SemanticViolation> {
        let lowered = input.spec_text.to_lowercase();
        let mut violations = Vec::new();

        for pattern in &self.patterns {
            match pattern {
                KeywordPattern::Literal { keyword, lowered: needle } => {
                    if lowered.contains(needle.as_str()) {
                        violations.push(SemanticViolation::DeniedKeyword {
                            keyword: keyword.clone(),
                        });
                    }
                }
                KeywordPattern::Pattern { source, compiled } => match compiled {
                    Ok(regex) => {
                        if regex.is_match(&input.spec_text) {
                            violations.push(SemanticViolation::DeniedKeyword {
                                keyword: source.clone(),
                            });
                        }
                    }
                    Err(e) => violations.push(SemanticViolation::MisconfiguredRule {
                        rule: self.rule_id(),
                        reason: format!("pattern {source} does not compile: {e}"),
                    }),
                },
            }
        }

        violations
    }
}

/// Rule: every action named in the spec must be allowlisted (when an allowlist is set)
pub struct ActionAllowlistRule {
    allowed: HashSet<String>,
}

impl ActionAllowlistRule {
    pub fn new(allowed: &[String]) -> Self {
        Self {
            allowed: allowed.iter().map(|a| a.trim().to_string()).collect(),
        }
    }
}

impl SemanticRule for ActionAllowlistRule {
    fn rule_id(&self) -> &'static str {
        "action-allowlist"
    }

    fn description(&self) -> &'static str {
        "Actions must appear in the allowed actions list"
    }

    fn check(&self, input: &SemanticInput<'_>) -> Vec<SemanticViolation> {
        if self.allowed.is_empty() {
            return Vec::new();
        }

        let mut actions = Vec::new();
        collect_actions(&input.spec, &mut actions);

        let mut seen = HashSet::new();
        actions
            .into_iter()
            .filter(|a| !self.allowed.contains(a) && seen.insert(a.clone()))
            .map(|action| SemanticViolation::ActionNotAllowed { action })
            .collect()
    }
}

/// Action names from `action: <name>` fields and `actions: [..]` lists
fn collect_actions(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match (key.as_str(), child) {
                    ("action", Value::String(name)) => out.push(name.trim().to_string()),
                    ("actions", Value::Array(items)) => {
                        for item in items {
                            let name = match item {
                                Value::String(name) => Some(name.as_str()),
                                Value::Object(obj) => obj.get("name").and_then(Value::as_str),
                                _ => None,
                            };
                            if let Some(name) = name {
                                out.push(name.trim().to_string());
                            }
                        }
                    }
                    _ => {}
                }
                collect_actions(child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_actions(item, out);
            }
        }
        _ => {}
    }
}

/// Rule: every dependency sourceUrl must match the URL allowlist
pub struct UrlAllowlistRule {
    entries: Vec<UrlPattern>,
}

enum UrlPattern {
    Prefix(String),
    Glob {
        source: String,
        compiled: Result<glob::Pattern, String>,
    },
}

impl UrlAllowlistRule {
    pub fn new(allowlist: &[String]) -> Self {
        let entries = allowlist
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .map(|e| {
                if e.contains(['*', '?', '[']) {
                    UrlPattern::Glob {
                        source: e.to_string(),
                        compiled: glob::Pattern::new(e).map_err(|err| err.to_string()),
                    }
                } else {
                    UrlPattern::Prefix(e.to_string())
                }
            })
            .collect();

        Self { entries }
    }

    fn allows(&self, url: &str) -> bool {
        self.entries.iter().any(|entry| match entry {
            UrlPattern::Prefix(prefix) => matches_on_boundary(url, prefix),
            UrlPattern::Glob {
                compiled: Ok(pattern),
                ..
            } => pattern.matches(url),
            UrlPattern::Glob { compiled: Err(_), .. } => false,
        })
    }
}

/// `url` starts with `prefix` and the match ends at a `/` or at the end of `url`
fn matches_on_boundary(url: &str, prefix: &str) -> bool {
    match url.strip_prefix(prefix) {
        Some(rest) => prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl SemanticRule for UrlAllowlistRule {
    fn rule_id(&self) -> &'static str {
        "url-allowlist"
    }

    fn description(&self) -> &'static str {
        "Dependency source URLs must match the URL allowlist"
    }

    fn check(&self, input: &SemanticInput<'_>) -> Vec<SemanticViolation> {
        let mut violations: Vec<SemanticViolation> = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                UrlPattern::Glob {
                    source,
                    compiled: Err(e),
                } => Some(SemanticViolation::MisconfiguredRule {
                    rule: self.rule_id(),
                    reason: format!("pattern '{source}' is invalid: {e}"),
                }),
                _ => None,
            })
            .collect();

        for dep in input.dependencies {
            if !self.allows(&dep.source_url) {
                violations.push(SemanticViolation::UrlNotAllowed {
                    dependency: dep.name.clone(),
                    url: dep.source_url.clone(),
                });
            }
        }

        violations
    }
}

/// Rule: dependency count must not exceed the configured maximum
pub struct DependencyLimitRule {
    max: usize,
}

impl DependencyLimitRule {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl SemanticRule for DependencyLimitRule {
    fn rule_id(&self) -> &'static str {
        "dependency-limit"
    }

    fn description(&self) -> &'static str {
        "Templates must not declare more dependencies than allowed"
    }

    fn check(&self, input: &SemanticInput<'_>) -> Vec<SemanticViolation> {
        let count = input.dependencies.len();
        if count > self.max {
            vec![SemanticViolation::TooManyDependencies {
                count,
                max: self.max,
            }]
        } else {
            Vec::new()
        }
    }
}
