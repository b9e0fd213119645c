//! The behavior-tree engine seam and the built-in engine.
//!
//! An engine validates root definitions and instantiates them against a
//! board. The resulting [`TreeInstance`] only exposes its node hierarchy;
//! stepping the tree is outside this crate.

use crate::board::Board;
use crate::definition::{
    CallDefinition, DefinitionError, MAX_DEPTH, NodeDefinition, NodeKind, validate::validate,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("unknown board '{0}'")]
    UnknownBoard(String),
    #[error("board '{board}' does not provide function '{function}'")]
    UnknownFunction { board: String, function: String },
    #[error("invalid board: {0}")]
    InvalidBoard(String),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// Execution state of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    #[default]
    Ready,
    Running,
    Succeeded,
    Failed,
}

/// A node of an instantiated tree, with its children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDetails {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub state: NodeState,
    pub args: Vec<Value>,
    pub while_guard: Option<CallDefinition>,
    pub until_guard: Option<CallDefinition>,
    pub entry: Option<CallDefinition>,
    pub step: Option<CallDefinition>,
    pub exit: Option<CallDefinition>,
    pub children: Vec<NodeDetails>,
}

impl NodeDetails {
    /// Number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(NodeDetails::node_count).sum::<usize>()
    }

    /// Finds a node in this subtree by id.
    pub fn find(&self, id: &str) -> Option<&NodeDetails> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}

pub trait TreeInstance: Send {
    fn node_details(&self) -> &NodeDetails;

    fn board_name(&self) -> &str;
}

impl fmt::Debug for dyn TreeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeInstance")
            .field("board", &self.board_name())
            .field("nodes", &self.node_details().node_count())
            .finish()
    }
}

pub trait TreeEngine: Send {
    fn validate(&self, roots: &[NodeDefinition]) -> Result<(), DefinitionError> {
        validate(roots)
    }

    fn instantiate(
        &self,
        roots: &[NodeDefinition],
        board: Box<dyn Board>,
    ) -> Result<Box<dyn TreeInstance>, BuildError>;
}

/// An instantiated tree produced by [`MistreeEngine`].
#[derive(Debug)]
pub struct BehaviourTree {
    root: NodeDetails,
    board: Box<dyn Board>,
}

impl BehaviourTree {
    pub fn board(&self) -> &dyn Board {
        self.board.as_ref()
    }
}

impl TreeInstance for BehaviourTree {
    fn node_details(&self) -> &NodeDetails {
        &self.root
    }

    fn board_name(&self) -> &str {
        self.board.name()
    }
}

/// Built-in engine. Branch nodes are replaced by the child of the root they
/// reference, node ids are assigned in pre-order and every node starts
/// [`NodeState::Ready`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MistreeEngine;

impl TreeEngine for MistreeEngine {
    fn instantiate(
        &self,
        roots: &[NodeDefinition],
        board: Box<dyn Board>,
    ) -> Result<Box<dyn TreeInstance>, BuildError> {
        let main = roots
            .iter()
            .find(|root| root.id.is_none())
            .ok_or_else(|| DefinitionError::Invalid("no main root node".into()))?;
        let named: HashMap<&str, &NodeDefinition> = roots
            .iter()
            .filter_map(|root| root.id.as_deref().map(|id| (id, root)))
            .collect();

        let mut builder = Builder {
            named,
            board: board.as_ref(),
            next_id: 0,
            expanding: Vec::new(),
        };
        let root = builder.build(main, 0)?;
        debug!(board = %board.name(), nodes = root.node_count(), "Instantiated behaviour tree");

        Ok(Box::new(BehaviourTree { root, board }))
    }
}

struct Builder<'a> {
    named: HashMap<&'a str, &'a NodeDefinition>,
    board: &'a dyn Board,
    next_id: usize,
    /// Branch references currently being inlined.
    expanding: Vec<&'a str>,
}

impl<'a> Builder<'a> {
    /// Builds `node`, which sits `depth` levels below the main root.
    fn build(&mut self, node: &'a NodeDefinition, depth: usize) -> Result<NodeDetails, BuildError> {
        if depth > MAX_DEPTH {
            return Err(DefinitionError::Invalid(format!(
                "the tree nests deeper than {MAX_DEPTH} levels once branches are inlined"
            ))
            .into());
        }
        if node.kind == NodeKind::Branch {
            return self.inline_branch(node, depth);
        }

        for function in node.function_calls() {
            if !self.board.provides(function) {
                return Err(BuildError::UnknownFunction {
                    board: self.board.name().to_string(),
                    function: function.to_string(),
                });
            }
        }

        let id = self.next_id.to_string();
        self.next_id += 1;

        let children = node
            .child_nodes()
            .into_iter()
            .map(|child| self.build(child, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NodeDetails {
            id,
            name: caption(node),
            kind: node.kind,
            state: NodeState::Ready,
            args: node_args(node),
            while_guard: node.while_guard.clone(),
            until_guard: node.until_guard.clone(),
            entry: node.entry.clone(),
            step: node.step.clone(),
            exit: node.exit.clone(),
            children,
        })
    }

    fn inline_branch(
        &mut self,
        node: &'a NodeDefinition,
        depth: usize,
    ) -> Result<NodeDetails, BuildError> {
        let reference = node.reference.as_deref().unwrap_or_default();
        if self.expanding.contains(&reference) {
            return Err(DefinitionError::Invalid(format!(
                "circular branch reference to '{reference}'"
            ))
            .into());
        }
        let target = self
            .named
            .get(reference)
            .copied()
            .and_then(|root| root.child.as_deref())
            .ok_or_else(|| {
                DefinitionError::Invalid(format!(
                    "branch node references root node '{reference}' which has not been defined"
                ))
            })?;

        self.expanding.push(reference);
        let built = self.build(target, depth);
        self.expanding.pop();
        built
    }
}

/// Leaves are named after the function they call, everything else after
/// its kind.
fn caption(node: &NodeDefinition) -> String {
    match (node.kind, node.call.as_deref()) {
        (NodeKind::Action | NodeKind::Condition, Some(call)) => call.to_string(),
        (kind, _) => kind.keyword().to_uppercase(),
    }
}

fn node_args(node: &NodeDefinition) -> Vec<Value> {
    match node.kind {
        NodeKind::Action | NodeKind::Condition => node.args.clone(),
        NodeKind::Wait => node.duration.map(|b| b.to_args()).unwrap_or_default(),
        NodeKind::Repeat => node.iterations.map(|b| b.to_args()).unwrap_or_default(),
        NodeKind::Retry => node.attempts.map(|b| b.to_args()).unwrap_or_default(),
        NodeKind::Lotto => node
            .weights
            .iter()
            .flatten()
            .map(|w| Value::from(*w))
            .collect(),
        _ => Vec::new(),
    }
}
