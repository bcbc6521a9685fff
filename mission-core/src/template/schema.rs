//! Embedded OutputSchema checks
//!
//! The schema carried by a hybrid template is untrusted JSON. It goes through
//! three ordered passes, each able to reject on its own:
//!
//! 1. size of the UTF-8 text
//! 2. JSON object with a Draft-07 `$schema` declaration
//! 3. bounded complexity walk (depth, node count, object width, array length)
//!
//! Only a schema that clears all three is handed to the [`SchemaCompiler`].
//! The walk stops at the first exceeded bound, so a pathological document
//! never reaches the compiler.

use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, trace};

/// Maximum OutputSchema size in bytes of UTF-8 text
pub const MAX_SCHEMA_BYTES: usize = 64 * 1024;
/// Maximum nesting depth; the root object is depth 1
pub const MAX_SCHEMA_DEPTH: usize = 16;
/// Maximum number of JSON values in the document, the root included
pub const MAX_SCHEMA_NODES: usize = 2000;
/// Maximum number of properties on any single object
pub const MAX_OBJECT_PROPERTIES: usize = 256;
/// Maximum number of items in any single array
pub const MAX_ARRAY_ITEMS: usize = 1024;

/// Accepted `$schema` identifiers
pub const DRAFT07_URIS: &[&str] = &[
    "http://json-schema.org/draft-07/schema#",
    "http://json-schema.org/draft-07/schema",
    "https://json-schema.org/draft-07/schema#",
    "https://json-schema.org/draft-07/schema",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("OutputSchema is {size} bytes, exceeding the maximum size of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("OutputSchema is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("OutputSchema must be a JSON object")]
    NotAnObject,

    #[error("OutputSchema must declare a Draft-07 $schema (\"http://json-schema.org/draft-07/schema#\")")]
    MissingDialect,

    #[error("OutputSchema must declare a Draft-07 $schema, found '{0}'")]
    UnsupportedDialect(String),

    #[error("OutputSchema exceeds maximum nesting depth of {max} at '{path}'")]
    DepthExceeded { max: usize, path: String },

    #[error("OutputSchema exceeds maximum node count of {max}")]
    TooManyNodes { max: usize },

    #[error("OutputSchema object at '{path}' has {count} properties, exceeding the maximum of {max}")]
    TooManyProperties {
        path: String,
        count: usize,
        max: usize,
    },

    #[error("OutputSchema array at '{path}' has {count} items, exceeding the maximum of {max}")]
    ArrayTooLong {
        path: String,
        count: usize,
        max: usize,
    },

    #[error("OutputSchema is not a valid Draft-07 schema: {0}")]
    Compile(String),
}

/// Compiles a schema document to confirm it is itself well-formed
pub trait SchemaCompiler: Send + Sync {
    fn compile(&self, schema: &Value) -> Result<(), String>;
}

/// Draft-07 compiler backed by the `jsonschema` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct Draft7Compiler;

impl SchemaCompiler for Draft7Compiler {
    fn compile(&self, schema: &Value) -> Result<(), String> {
        jsonschema::options()
            .with_draft(jsonschema::Draft::Draft7)
            .build(schema)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Run all passes over an OutputSchema payload and return the parsed schema
pub fn check_output_schema(
    text: &str,
    compiler: &dyn SchemaCompiler,
) -> Result<Value, SchemaError> {
    let text = text.trim();

    if text.len() > MAX_SCHEMA_BYTES {
        return Err(SchemaError::TooLarge {
            size: text.len(),
            max: MAX_SCHEMA_BYTES,
        });
    }

    let schema: Value =
        serde_json::from_str(text).map_err(|e| SchemaError::InvalidJson(e.to_string()))?;

    check_dialect(&schema)?;

    let mut walker = ComplexityWalker::default();
    walker.walk(&schema, 1, "$")?;
    debug!(
        "OutputSchema within bounds ({} nodes); compiling",
        walker.nodes
    );

    compiler.compile(&schema).map_err(SchemaError::Compile)?;
    Ok(schema)
}

fn check_dialect(schema: &Value) -> Result<(), SchemaError> {
    let object = schema.as_object().ok_or(SchemaError::NotAnObject)?;
    match object.get("$schema") {
        None => Err(SchemaError::MissingDialect),
        Some(Value::String(uri)) if DRAFT07_URIS.contains(&uri.as_str()) => Ok(()),
        Some(Value::String(uri)) => Err(SchemaError::UnsupportedDialect(uri.clone())),
        Some(other) => Err(SchemaError::UnsupportedDialect(other.to_string())),
    }
}

/// Depth-first walk that fails the instant any bound is exceeded.
///
/// Values are tracked by address so a sub-schema reachable twice is counted
/// once; a parsed document never aliases, but the walk stays bounded if one
/// ever does.
#[derive(Default)]
struct ComplexityWalker {
    nodes: usize,
    seen: HashSet<*const Value>,
}

impl ComplexityWalker {
    fn walk(&mut self, value: &Value, depth: usize, path: &str) -> Result<(), SchemaError> {
        if !self.seen.insert(value as *const Value) {
            return Ok(());
        }

        self.nodes += 1;
        if self.nodes > MAX_SCHEMA_NODES {
            return Err(SchemaError::TooManyNodes {
                max: MAX_SCHEMA_NODES,
            });
        }

        match value {
            Value::Object(map) => {
                if depth > MAX_SCHEMA_DEPTH {
                    return Err(SchemaError::DepthExceeded {
                        max: MAX_SCHEMA_DEPTH,
                        path: path.to_string(),
                    });
                }
                if map.len() > MAX_OBJECT_PROPERTIES {
                    return Err(SchemaError::TooManyProperties {
                        path: path.to_string(),
                        count: map.len(),
                        max: MAX_OBJECT_PROPERTIES,
                    });
                }
                for (key, child) in map {
                    trace!("walking {}.{}", path, key);
                    self.walk(child, depth + 1, &format!("{path}.{key}"))?;
                }
            }
            Value::Array(items) => {
                if depth > MAX_SCHEMA_DEPTH {
                    return Err(SchemaError::DepthExceeded {
                        max: MAX_SCHEMA_DEPTH,
                        path: path.to_string(),
                    });
                }
                if items.len() > MAX_ARRAY_ITEMS {
                    return Err(SchemaError::ArrayTooLong {
                        path: path.to_string(),
                        count: items.len(),
                        max: MAX_ARRAY_ITEMS,
                    });
                }
                for (index, child) in items.iter().enumerate() {
                    self.walk(child, depth + 1, &format!("{path}[{index}]"))?;
                }
            }
            _ => {}
        }

        Ok(())
    }
}
