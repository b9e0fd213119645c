//! Behavior-tree definitions.
//!
//! A definition arrives as text in one of two dialects:
//!
//! - `mdsl`: the brace/keyword grammar parsed in [`mdsl`];
//! - `json`: the same structure serialized as JSON ([`model::NodeDefinition`]).
//!
//! The dialect is sniffed by attempting MDSL first, then JSON. The
//! [`pipeline`] turns a sniffed definition into a validated tree and graph.

pub mod mdsl;
pub mod model;
pub mod pipeline;
pub mod validate;

pub use model::{Bounds, CallDefinition, NodeDefinition, NodeKind};
pub use pipeline::DefinitionPipeline;

use serde::Serialize;
use serde_json::Value;

/// Deepest node nesting accepted below a root, in both dialects and after
/// branches are inlined.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("invalid definition syntax: {0}")]
    Syntax(String),
    #[error("invalid definition: {0}")]
    Invalid(String),
}

/// The dialect a definition is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    #[default]
    None,
    Mdsl,
    Json,
}

/// A definition after the dialect sniff, holding whatever the successful
/// parse attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Sniffed {
    None,
    Mdsl(Vec<NodeDefinition>),
    Json(Value),
}

impl Sniffed {
    pub fn kind(&self) -> DefinitionKind {
        match self {
            Sniffed::None => DefinitionKind::None,
            Sniffed::Mdsl(_) => DefinitionKind::Mdsl,
            Sniffed::Json(_) => DefinitionKind::Json,
        }
    }

    /// Decodes the sniffed definition into root nodes. `None` for an
    /// unrecognized definition.
    pub fn into_roots(self) -> Option<Result<Vec<NodeDefinition>, DefinitionError>> {
        match self {
            Sniffed::None => None,
            Sniffed::Mdsl(roots) => Some(Ok(roots)),
            Sniffed::Json(value) => Some(decode_json(value)),
        }
    }
}

/// Best-effort dialect detection: MDSL, then JSON, else none.
pub fn sniff(text: &str) -> Sniffed {
    if text.trim().is_empty() {
        return Sniffed::None;
    }
    if let Ok(roots) = mdsl::parse(text) {
        return Sniffed::Mdsl(roots);
    }
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Sniffed::Json(value);
    }
    Sniffed::None
}

/// Decodes a JSON definition: a single root object or an array of roots.
pub fn decode_json(value: Value) -> Result<Vec<NodeDefinition>, DefinitionError> {
    let decoded = match value {
        Value::Array(_) => serde_json::from_value::<Vec<NodeDefinition>>(value),
        other => serde_json::from_value::<NodeDefinition>(other).map(|root| vec![root]),
    };
    decoded.map_err(|e| DefinitionError::Invalid(e.to_string()))
}

/// Outcome of validating a definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationResult {
    pub succeeded: bool,
    pub error_message: Option<String>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            error_message: Some(message.into()),
        }
    }
}

impl From<Result<(), DefinitionError>> for ValidationResult {
    fn from(result: Result<(), DefinitionError>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// Sniffs, decodes and validates definition text.
pub fn validate_definition(text: &str) -> ValidationResult {
    match sniff(text).into_roots() {
        None => ValidationResult::failure(
            DefinitionError::Syntax("definition is neither MDSL nor JSON".into()).to_string(),
        ),
        Some(roots) => roots.and_then(|roots| validate::validate(&roots)).into(),
    }
}

/// Renders an MDSL definition in the JSON dialect.
pub fn convert_mdsl_to_json(text: &str) -> Result<String, DefinitionError> {
    let roots = mdsl::parse(text)?;
    let rendered = match roots.as_slice() {
        [single] => serde_json::to_string_pretty(single),
        many => serde_json::to_string_pretty(many),
    };
    rendered.map_err(|e| DefinitionError::Invalid(e.to_string()))
}
