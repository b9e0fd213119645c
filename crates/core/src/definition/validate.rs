//! Structural validation shared by both dialects.

use super::{DefinitionError, MAX_DEPTH};
use super::model::{Bounds, NodeDefinition, NodeKind};
use std::collections::{BTreeMap, BTreeSet};

fn invalid(message: impl Into<String>) -> DefinitionError {
    DefinitionError::Invalid(message.into())
}

/// Validates a set of root definitions.
pub fn validate(roots: &[NodeDefinition]) -> Result<(), DefinitionError> {
    if roots.is_empty() {
        return Err(invalid("expected at least one root node"));
    }

    for root in roots {
        if root.kind != NodeKind::Root {
            return Err(invalid(format!(
                "expected root node at the base of the definition but got '{}'",
                root.kind
            )));
        }
    }

    let main_roots = roots.iter().filter(|r| r.id.is_none()).count();
    if main_roots != 1 {
        return Err(invalid(
            "expected a single unnamed root node at the base of the definition to act as the main root",
        ));
    }

    let mut named = BTreeSet::new();
    for id in roots.iter().filter_map(|r| r.id.as_deref()) {
        if !named.insert(id) {
            return Err(invalid(format!(
                "multiple root nodes found with duplicate name '{id}'"
            )));
        }
    }

    let mut references: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for root in roots {
        let mut refs = BTreeSet::new();
        validate_node(root, 0, &mut refs)?;
        for reference in &refs {
            if !named.contains(reference) {
                return Err(invalid(format!(
                    "branch node references root node '{reference}' which has not been defined"
                )));
            }
        }
        references.insert(root.id.as_deref().unwrap_or_default(), refs);
    }

    check_branch_cycles(&references)
}

fn validate_node<'a>(
    node: &'a NodeDefinition,
    depth: usize,
    refs: &mut BTreeSet<&'a str>,
) -> Result<(), DefinitionError> {
    let kind = node.kind;

    if depth > MAX_DEPTH {
        return Err(invalid(format!(
            "the definition nests deeper than {MAX_DEPTH} levels"
        )));
    }
    if kind == NodeKind::Root && depth > 0 {
        return Err(invalid("a root node cannot be the child of another node"));
    }

    if kind.is_composite() {
        if node.children.is_empty() {
            return Err(invalid(format!(
                "a {kind} node must have at least a single child"
            )));
        }
        if let Some(weights) = &node.weights {
            if weights.len() != node.children.len() {
                return Err(invalid(
                    "a lotto node must have a weight defined for each of its child nodes",
                ));
            }
            if weights.iter().any(|w| *w < 0) {
                return Err(invalid("a lotto node must have non-negative weights"));
            }
        }
    } else if (kind.is_decorator() || kind == NodeKind::Root) && node.child.is_none() {
        return Err(invalid(format!("a {kind} node must have a single child")));
    }

    match kind {
        NodeKind::Action | NodeKind::Condition => {
            if node.call.as_deref().is_none_or(|c| c.trim().is_empty()) {
                return Err(invalid(format!(
                    "a {kind} node must have a non-empty 'call' property"
                )));
            }
        }
        NodeKind::Branch => match node.reference.as_deref() {
            Some(reference) if !reference.is_empty() => {
                refs.insert(reference);
            }
            _ => {
                return Err(invalid("a branch node must have a non-empty 'ref' property"));
            }
        },
        NodeKind::Wait => check_bounds(kind, "duration", node.duration)?,
        NodeKind::Repeat => check_bounds(kind, "iteration count", node.iterations)?,
        NodeKind::Retry => check_bounds(kind, "attempt count", node.attempts)?,
        _ => {}
    }

    for child in node.child_nodes() {
        validate_node(child, depth + 1, refs)?;
    }
    Ok(())
}

fn check_bounds(
    kind: NodeKind,
    field: &str,
    bounds: Option<Bounds>,
) -> Result<(), DefinitionError> {
    match bounds {
        Some(Bounds::Fixed(n)) if n < 0 => Err(invalid(format!(
            "a {kind} node must have a non-negative {field}"
        ))),
        Some(Bounds::Range(min, max)) if min < 0 || max < 0 => Err(invalid(format!(
            "a {kind} node must have a non-negative minimum and maximum {field}"
        ))),
        Some(Bounds::Range(min, max)) if min > max => Err(invalid(format!(
            "a {kind} node must not have a minimum {field} that exceeds the maximum {field}"
        ))),
        _ => Ok(()),
    }
}

/// Rejects branch references that form a cycle between roots.
fn check_branch_cycles<'a>(
    references: &BTreeMap<&'a str, BTreeSet<&'a str>>,
) -> Result<(), DefinitionError> {
    fn visit<'r>(
        root: &'r str,
        references: &BTreeMap<&'r str, BTreeSet<&'r str>>,
        path: &mut Vec<&'r str>,
        done: &mut BTreeSet<&'r str>,
    ) -> Result<(), DefinitionError> {
        if let Some(pos) = path.iter().position(|r| *r == root) {
            let mut cycle: Vec<&str> = path[pos..].to_vec();
            cycle.push(root);
            return Err(invalid(format!(
                "circular dependency found in branch node references: {}",
                cycle.join(" => ")
            )));
        }
        if done.contains(root) {
            return Ok(());
        }
        path.push(root);
        if let Some(children) = references.get(root) {
            for child in children {
                visit(*child, references, path, done)?;
            }
        }
        path.pop();
        done.insert(root);
        Ok(())
    }

    let mut done = BTreeSet::new();
    for root in references.keys() {
        visit(*root, references, &mut Vec::new(), &mut done)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::mdsl;

    fn check(text: &str) -> Result<(), DefinitionError> {
        validate(&mdsl::parse(text).expect("test definitions must parse"))
    }

    /// A root over `levels` nested flips ending in an action, as decoded
    /// JSON would produce it.
    fn nested(levels: usize) -> NodeDefinition {
        let mut action = NodeDefinition::new(NodeKind::Action);
        action.call = Some("A".into());
        let body = (0..levels).fold(action, |child, _| {
            let mut flip = NodeDefinition::new(NodeKind::Flip);
            flip.child = Some(Box::new(child));
            flip
        });
        let mut root = NodeDefinition::new(NodeKind::Root);
        root.child = Some(Box::new(body));
        root
    }

    #[test]
    fn test_depth_limit_applies_to_decoded_definitions() {
        assert!(validate(&[nested(MAX_DEPTH - 1)]).is_ok());
        let err = validate(&[nested(MAX_DEPTH + 5)]).unwrap_err();
        assert!(err.to_string().contains("nests deeper than 64 levels"));
    }

    fn message(text: &str) -> String {
        check(text).unwrap_err().to_string()
    }

    #[test]
    fn test_valid_definitions() {
        check("root { action [Walk] }").unwrap();
        check("root { sequence { branch [Sub] } } root [Sub] { wait [10, 20] }").unwrap();
        check("root { lotto [1, 2] { action [A] action [B] } }").unwrap();
    }

    #[test]
    fn test_composite_needs_children() {
        assert!(message("root { selector { } }").contains("at least a single child"));
    }

    #[test]
    fn test_single_main_root_required() {
        assert!(message("root [A] { action [X] }").contains("single unnamed root"));
        assert!(message("root { action [X] } root { action [Y] }").contains("single unnamed root"));
    }

    #[test]
    fn test_duplicate_named_roots() {
        let text = "root { branch [A] } root [A] { wait } root [A] { wait }";
        assert!(message(text).contains("duplicate name 'A'"));
    }

    #[test]
    fn test_undefined_branch_reference() {
        assert!(message("root { branch [Missing] }").contains("'Missing'"));
    }

    #[test]
    fn test_circular_branches() {
        let text = "root { branch [A] } root [A] { branch [B] } root [B] { branch [A] }";
        let err = message(text);
        assert!(err.contains("circular dependency"), "{err}");
        assert!(err.contains("A => B => A"), "{err}");
    }

    #[test]
    fn test_bounds_are_checked() {
        assert!(message("root { repeat [5, 2] { action [A] } }").contains("exceeds the maximum"));
        assert!(message("root { wait [-1] }").contains("non-negative duration"));
    }

    #[test]
    fn test_lotto_weights_match_children() {
        assert!(message("root { lotto [1] { action [A] action [B] } }").contains("weight"));
    }

    #[test]
    fn test_top_level_must_be_roots() {
        let roots = vec![NodeDefinition::new(NodeKind::Sequence)];
        assert!(validate(&roots).unwrap_err().to_string().contains("'sequence'"));
    }

    #[test]
    fn test_empty_call_is_rejected() {
        let mut action = NodeDefinition::new(NodeKind::Action);
        action.call = Some("  ".into());
        let mut root = NodeDefinition::new(NodeKind::Root);
        root.child = Some(Box::new(action));
        assert!(validate(&[root]).unwrap_err().to_string().contains("'call'"));
    }
}
