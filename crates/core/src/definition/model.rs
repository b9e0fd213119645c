//! The structural form shared by both definition dialects.
//!
//! The JSON dialect is this model serialized directly; the MDSL dialect is
//! parsed into it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Sequence,
    Selector,
    Parallel,
    Race,
    All,
    Lotto,
    Repeat,
    Retry,
    Flip,
    Succeed,
    Fail,
    Wait,
    Action,
    Condition,
    Branch,
}

impl NodeKind {
    const KEYWORDS: [(&'static str, NodeKind); 16] = [
        ("root", NodeKind::Root),
        ("sequence", NodeKind::Sequence),
        ("selector", NodeKind::Selector),
        ("parallel", NodeKind::Parallel),
        ("race", NodeKind::Race),
        ("all", NodeKind::All),
        ("lotto", NodeKind::Lotto),
        ("repeat", NodeKind::Repeat),
        ("retry", NodeKind::Retry),
        ("flip", NodeKind::Flip),
        ("succeed", NodeKind::Succeed),
        ("fail", NodeKind::Fail),
        ("wait", NodeKind::Wait),
        ("action", NodeKind::Action),
        ("condition", NodeKind::Condition),
        ("branch", NodeKind::Branch),
    ];

    pub fn from_keyword(word: &str) -> Option<Self> {
        Self::KEYWORDS
            .iter()
            .find(|(keyword, _)| *keyword == word)
            .map(|(_, kind)| *kind)
    }

    pub fn keyword(self) -> &'static str {
        Self::KEYWORDS
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(keyword, _)| *keyword)
            .unwrap_or_default()
    }

    /// Nodes that own a list of children.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            NodeKind::Sequence
                | NodeKind::Selector
                | NodeKind::Parallel
                | NodeKind::Race
                | NodeKind::All
                | NodeKind::Lotto
        )
    }

    /// Nodes that wrap exactly one child. Root is handled separately.
    pub fn is_decorator(self) -> bool {
        matches!(
            self,
            NodeKind::Repeat | NodeKind::Retry | NodeKind::Flip | NodeKind::Succeed | NodeKind::Fail
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A call to a board function with its arguments, used by actions,
/// conditions, guards and lifecycle callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDefinition {
    pub call: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

/// A fixed count or an inclusive `[min, max]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bounds {
    Fixed(i64),
    Range(i64, i64),
}

impl Bounds {
    pub fn to_args(self) -> Vec<Value> {
        match self {
            Bounds::Fixed(n) => vec![Value::from(n)],
            Bounds::Range(min, max) => vec![Value::from(min), Value::from(max)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Name of a root node; `None` marks the main root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<Box<NodeDefinition>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<Bounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<Bounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Bounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<i64>>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "while", default, skip_serializing_if = "Option::is_none")]
    pub while_guard: Option<CallDefinition>,
    #[serde(rename = "until", default, skip_serializing_if = "Option::is_none")]
    pub until_guard: Option<CallDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<CallDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<CallDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<CallDefinition>,
}

impl NodeDefinition {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            id: None,
            call: None,
            args: Vec::new(),
            child: None,
            children: Vec::new(),
            iterations: None,
            attempts: None,
            duration: None,
            weights: None,
            reference: None,
            while_guard: None,
            until_guard: None,
            entry: None,
            step: None,
            exit: None,
        }
    }

    /// The direct children, whether held as `child` or `children`.
    pub fn child_nodes(&self) -> Vec<&NodeDefinition> {
        self.child
            .as_deref()
            .into_iter()
            .chain(self.children.iter())
            .collect()
    }

    /// Every board function this node calls directly.
    pub fn function_calls(&self) -> impl Iterator<Item = &str> {
        let call = match self.kind {
            NodeKind::Action | NodeKind::Condition => self.call.as_deref(),
            _ => None,
        };
        call.into_iter().chain(
            [
                &self.while_guard,
                &self.until_guard,
                &self.entry,
                &self.step,
                &self.exit,
            ]
            .into_iter()
            .filter_map(|c| c.as_ref().map(|c| c.call.as_str())),
        )
    }
}
