//! Projection of an instantiated tree into renderable nodes and edges.

use crate::definition::{CallDefinition, NodeKind};
use crate::tree::{NodeDetails, NodeState};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeVariant {
    #[default]
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeVariant {
    #[default]
    Default,
    Active,
    Succeeded,
    Failed,
}

impl EdgeVariant {
    /// Edge style follows the state of the node the edge points to.
    pub fn for_child(state: NodeState) -> Self {
        match state {
            NodeState::Running => EdgeVariant::Active,
            NodeState::Succeeded => EdgeVariant::Succeeded,
            NodeState::Failed => EdgeVariant::Failed,
            NodeState::Ready => EdgeVariant::Default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub caption: String,
    pub kind: NodeKind,
    pub state: NodeState,
    pub args: Vec<Value>,
    pub while_guard: Option<CallDefinition>,
    pub until_guard: Option<CallDefinition>,
    pub entry: Option<CallDefinition>,
    pub step: Option<CallDefinition>,
    pub exit: Option<CallDefinition>,
    pub variant: NodeVariant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    /// `"<parent>_<child>"`
    pub id: String,
    pub from: String,
    pub to: String,
    pub variant: EdgeVariant,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CanvasElements {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl CanvasElements {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }
}

/// Walks the tree depth-first in pre-order.
pub fn project(root: &NodeDetails) -> CanvasElements {
    let mut canvas = CanvasElements::default();
    visit(root, None, &mut canvas);
    canvas
}

fn visit(node: &NodeDetails, parent: Option<&str>, canvas: &mut CanvasElements) {
    canvas.nodes.push(GraphNode {
        id: node.id.clone(),
        caption: node.name.clone(),
        kind: node.kind,
        state: node.state,
        args: node.args.clone(),
        while_guard: node.while_guard.clone(),
        until_guard: node.until_guard.clone(),
        entry: node.entry.clone(),
        step: node.step.clone(),
        exit: node.exit.clone(),
        variant: NodeVariant::Default,
    });

    if let Some(parent) = parent {
        canvas.edges.push(GraphEdge {
            id: format!("{parent}_{}", node.id),
            from: parent.to_string(),
            to: node.id.clone(),
            variant: EdgeVariant::for_child(node.state),
        });
    }

    for child in &node.children {
        visit(child, Some(&node.id), canvas);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(id: &str, state: NodeState, children: Vec<NodeDetails>) -> NodeDetails {
        NodeDetails {
            id: id.into(),
            name: id.to_uppercase(),
            kind: if children.is_empty() {
                NodeKind::Action
            } else {
                NodeKind::Sequence
            },
            state,
            args: Vec::new(),
            while_guard: None,
            until_guard: None,
            entry: None,
            step: None,
            exit: None,
            children,
        }
    }

    #[test]
    fn test_root_with_two_children() {
        let tree = details(
            "r",
            NodeState::Ready,
            vec![
                details("c1", NodeState::Ready, vec![]),
                details("c2", NodeState::Ready, vec![]),
            ],
        );
        let canvas = project(&tree);

        let ids: Vec<_> = canvas.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["r", "c1", "c2"]);
        let edges: Vec<_> = canvas.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(edges, ["r_c1", "r_c2"]);
        assert!(canvas.nodes.iter().all(|n| n.variant == NodeVariant::Default));
    }

    #[test]
    fn test_every_non_root_node_has_one_incoming_edge() {
        let tree = details(
            "a",
            NodeState::Running,
            vec![
                details("b", NodeState::Running, vec![details("c", NodeState::Ready, vec![])]),
                details("d", NodeState::Ready, vec![]),
            ],
        );
        let canvas = project(&tree);
        assert_eq!(canvas.nodes.len(), canvas.edges.len() + 1);
        for node in canvas.nodes.iter().skip(1) {
            assert_eq!(canvas.edges.iter().filter(|e| e.to == node.id).count(), 1);
        }
        let ids: Vec<_> = canvas.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_edge_variant_follows_child_state() {
        let tree = details(
            "r",
            NodeState::Running,
            vec![
                details("run", NodeState::Running, vec![]),
                details("ok", NodeState::Succeeded, vec![]),
                details("ko", NodeState::Failed, vec![]),
                details("idle", NodeState::Ready, vec![]),
            ],
        );
        let variants: Vec<_> = project(&tree).edges.iter().map(|e| e.variant).collect();
        assert_eq!(
            variants,
            [
                EdgeVariant::Active,
                EdgeVariant::Succeeded,
                EdgeVariant::Failed,
                EdgeVariant::Default
            ]
        );
    }

    #[test]
    fn test_serializes_for_renderers() {
        let canvas = project(&details("r", NodeState::Ready, vec![details("c", NodeState::Failed, vec![])]));
        let json = serde_json::to_value(&canvas).unwrap();
        assert_eq!(json["edges"][0]["variant"], "failed");
        assert_eq!(json["nodes"][1]["kind"], "action");
        assert_eq!(json["nodes"][0]["state"], "ready");
    }
}
