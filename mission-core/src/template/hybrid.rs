//! Hybrid template parsing (XML)
//!
//! A hybrid template composes free text, two linked components (persona and
//! instructions), a key/value context map, worked examples and an embedded
//! JSON OutputSchema. Parsing is pure: component `src` references are only
//! recorded here and resolved later by the loader, which needs filesystem
//! access.
//!
//! DTDs are refused by the XML parser, which rules out entity expansion.

use roxmltree::{Document, Node, ParsingOptions};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use super::schema::{check_output_schema, SchemaCompiler};
use super::{
    dependency_problems, Dependency, FieldStyle, Metadata, Signature, TemplateDocument,
    TemplateFormat,
};

/// Upper bound on XML nodes handed to the parser
pub const MAX_XML_NODES: u32 = 50_000;

/// A linked component: inline text or a relative `src` pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ComponentRef {
    Inline {
        content: String,
    },
    Source {
        src: String,
        /// Filled in once the loader has resolved and read the file
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
}

impl ComponentRef {
    pub fn src(&self) -> Option<&str> {
        match self {
            ComponentRef::Source { src, .. } => Some(src),
            ComponentRef::Inline { .. } => None,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            ComponentRef::Inline { content } => Some(content),
            ComponentRef::Source { content, .. } => content.as_deref(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            ComponentRef::Inline { content } => json!({ "content": content }),
            ComponentRef::Source { src, content } => json!({ "src": src, "content": content }),
        }
    }
}

/// A worked input/output example
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Example {
    pub name: String,
    pub input: String,
    pub output: String,
}

/// A hybrid mission template
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridTemplate {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub objective: String,
    pub persona: ComponentRef,
    pub instructions: ComponentRef,
    pub context: BTreeMap<String, String>,
    pub examples: Vec<Example>,
    pub output_schema: Value,
    pub dependencies: Vec<Dependency>,
}

impl HybridTemplate {
    /// Parse and structurally validate a hybrid document.
    ///
    /// All problems are collected; the OutputSchema is checked with
    /// `compiler` only after its bound checks pass.
    pub fn parse(content: &str, compiler: &dyn SchemaCompiler) -> Result<Self, Vec<String>> {
        let mut options = ParsingOptions::default();
        options.allow_dtd = false;
        options.nodes_limit = MAX_XML_NODES;

        let doc = Document::parse_with_options(content, options)
            .map_err(|e| vec![format!("Invalid XML document: {e}")])?;
        let root = doc.root_element();

        let mut errors = Vec::new();

        let api_version = root.attribute("apiVersion").map(str::trim).unwrap_or("");
        let kind = root.attribute("kind").map(str::trim).unwrap_or("");
        if api_version.is_empty() || kind.is_empty() {
            if api_version.is_empty() {
                errors.push("Root element requires an apiVersion attribute.".to_string());
            }
            if kind.is_empty() {
                errors.push("Root element requires a kind attribute.".to_string());
            }
        } else {
            match TemplateFormat::identify(api_version, kind) {
                Ok(TemplateFormat::Hybrid) => {}
                Ok(TemplateFormat::Flat) => errors.push(format!(
                    "apiVersion '{api_version}' names the flat format, which must be a YAML document."
                )),
                Err(e) => errors.push(e),
            }
        }

        let metadata = match child(root, "Metadata") {
            Some(node) => {
                let metadata = parse_metadata(node);
                errors.extend(metadata.problems(FieldStyle::Hybrid));
                metadata
            }
            None => {
                errors.push("Metadata element is required.".to_string());
                Metadata::default()
            }
        };

        let objective = child(root, "MissionObjective").map(text_of).unwrap_or_default();
        if objective.is_empty() {
            errors.push("MissionObjective is required.".to_string());
        }

        let persona = parse_component(root, "AgentPersona", &mut errors);
        let instructions = parse_component(root, "Instructions", &mut errors);
        let context = parse_context(root, &mut errors);
        let examples = parse_examples(root, &mut errors);

        let output_schema = match child(root, "OutputSchema").map(text_of) {
            Some(text) if !text.is_empty() => match check_output_schema(&text, compiler) {
                Ok(schema) => Some(schema),
                Err(e) => {
                    errors.push(e.to_string());
                    None
                }
            },
            _ => {
                errors.push("OutputSchema is required.".to_string());
                None
            }
        };

        let dependencies = parse_dependencies(root);
        errors.extend(dependency_problems(&dependencies));

        match (errors.is_empty(), persona, instructions, output_schema) {
            (true, Some(persona), Some(instructions), Some(output_schema)) => Ok(HybridTemplate {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
                metadata,
                objective,
                persona,
                instructions,
                context,
                examples,
                output_schema,
                dependencies,
            }),
            _ => Err(errors),
        }
    }

    /// Components that still need their `src` resolved, with their element names
    pub fn component_refs_mut(&mut self) -> [(&'static str, &mut ComponentRef); 2] {
        [
            ("AgentPersona", &mut self.persona),
            ("Instructions", &mut self.instructions),
        ]
    }
}

impl TemplateDocument for HybridTemplate {
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
        let context: Map<String, Value> = self
            .context
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let examples: Vec<Value> = self
            .examples
            .iter()
            .map(|e| json!({ "name": e.name, "input": e.input, "output": e.output }))
            .collect();

        json!({
            "objective": self.objective,
            "persona": self.persona.to_json(),
            "instructions": self.instructions.to_json(),
            "context": context,
            "examples": examples,
            "outputSchema": self.output_schema,
        })
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

fn children<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

/// Concatenated text and CDATA content of a node's direct children, trimmed
fn text_of(node: Node<'_, '_>) -> String {
    node.children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn child_text(node: Node<'_, '_>, name: &str) -> String {
    child(node, name).map(text_of).unwrap_or_default()
}

fn parse_metadata(node: Node<'_, '_>) -> Metadata {
    let signature = child(node, "Signature")
        .map(|sig| Signature {
            key_id: child_text(sig, "KeyId"),
            algorithm: child_text(sig, "Algorithm"),
            value: child_text(sig, "Value"),
        })
        .unwrap_or_default();

    let tags: Vec<String> = child(node, "Tags")
        .map(|tags| children(tags, "Tag").map(text_of).collect())
        .unwrap_or_default();

    Metadata {
        name: child_text(node, "Name"),
        version: child_text(node, "Version"),
        author: child_text(node, "Author"),
        signature,
        tags,
    }
}

fn parse_component(
    root: Node<'_, '_>,
    name: &str,
    errors: &mut Vec<String>,
) -> Option<ComponentRef> {
    let Some(node) = child(root, name) else {
        errors.push(format!("{name} is required."));
        return None;
    };

    let inline = text_of(node);
    match node.attribute("src").map(str::trim) {
        Some(src) if !src.is_empty() => {
            if Path::new(src).is_absolute() || src.starts_with('/') || src.starts_with('\\') {
                errors.push(format!("{name} src must be a relative path."));
                return None;
            }
            if !inline.is_empty() {
                debug!("{} carries both inline content and src; src takes precedence", name);
            }
            Some(ComponentRef::Source {
                src: src.to_string(),
                content: None,
            })
        }
        _ if !inline.is_empty() => Some(ComponentRef::Inline { content: inline }),
        _ => {
            errors.push(format!(
                "{name} must provide inline content or a src reference."
            ));
            None
        }
    }
}

fn parse_context(root: Node<'_, '_>, errors: &mut Vec<String>) -> BTreeMap<String, String> {
    let mut context = BTreeMap::new();
    let Some(block) = child(root, "ContextData") else {
        return context;
    };

    for (index, item) in block.children().filter(|c| c.is_element()).enumerate() {
        match item.attribute("key").map(str::trim) {
            Some(key) if !key.is_empty() => {
                if context.insert(key.to_string(), text_of(item)).is_some() {
                    errors.push(format!("ContextData key '{key}' is declared more than once."));
                }
            }
            _ => errors.push(format!(
                "ContextData item #{} is missing a key attribute.",
                index + 1
            )),
        }
    }

    context
}

fn parse_examples(root: Node<'_, '_>, errors: &mut Vec<String>) -> Vec<Example> {
    let Some(block) = child(root, "Examples") else {
        errors.push("Examples block with at least one Example is required.".to_string());
        return Vec::new();
    };

    let mut examples = Vec::new();
    for (index, node) in children(block, "Example").enumerate() {
        let name = node.attribute("name").map(str::trim).unwrap_or("");
        let label = if name.is_empty() {
            errors.push(format!("Example #{} requires a name attribute.", index + 1));
            format!("Example #{}", index + 1)
        } else {
            format!("Example '{name}'")
        };

        let input = child_text(node, "Input");
        let output = child_text(node, "Output");
        if input.is_empty() {
            errors.push(format!("{label} requires a non-empty Input."));
        }
        if output.is_empty() {
            errors.push(format!("{label} requires a non-empty Output."));
        }

        examples.push(Example {
            name: name.to_string(),
            input,
            output,
        });
    }

    if examples.is_empty() {
        errors.push("Examples block with at least one Example is required.".to_string());
    }
    examples
}

fn parse_dependencies(root: Node<'_, '_>) -> Vec<Dependency> {
    let Some(block) = child(root, "Dependencies") else {
        return Vec::new();
    };

    children(block, "Dependency")
        .map(|node| {
            let attr = |name: &str| node.attribute(name).map(str::trim).unwrap_or("").to_string();
            Dependency {
                name: attr("name"),
                source_url: attr("sourceUrl"),
                version: attr("version"),
                checksum: attr("checksum"),
            }
        })
        .collect()
}
