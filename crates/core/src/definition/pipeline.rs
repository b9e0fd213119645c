//! Definition text to tree and graph.
//!
//! Every change replaces the tree and graph wholesale: the previous tree is
//! dropped before the new text is even sniffed, so a failed change always
//! leaves the pipeline with no tree and an empty graph.

use super::{DefinitionKind, ValidationResult, sniff};
use crate::board::{BoardRegistry, DEFAULT_BOARD};
use crate::graph::{CanvasElements, project};
use crate::tree::{MistreeEngine, TreeEngine, TreeInstance};
use tracing::{debug, info, warn};

pub struct DefinitionPipeline {
    engine: Box<dyn TreeEngine>,
    boards: BoardRegistry,
    definition: String,
    kind: DefinitionKind,
    board: String,
    error_message: Option<String>,
    tree: Option<Box<dyn TreeInstance>>,
    canvas: CanvasElements,
}

impl Default for DefinitionPipeline {
    fn default() -> Self {
        Self::new(Box::new(MistreeEngine), BoardRegistry::default())
    }
}

impl DefinitionPipeline {
    pub fn new(engine: Box<dyn TreeEngine>, boards: BoardRegistry) -> Self {
        Self {
            engine,
            boards,
            definition: String::new(),
            kind: DefinitionKind::None,
            board: DEFAULT_BOARD.to_string(),
            error_message: None,
            tree: None,
            canvas: CanvasElements::default(),
        }
    }

    /// Sets the board text used by later changes without rebuilding.
    pub fn with_board(mut self, board: impl Into<String>) -> Self {
        self.board = board.into();
        self
    }

    /// Processes new definition text. A `board_override` replaces the
    /// current board text before the tree is built.
    pub fn on_definition_change(
        &mut self,
        text: &str,
        board_override: Option<&str>,
    ) -> ValidationResult {
        if let Some(board) = board_override {
            self.board = board.to_string();
        }
        self.definition = text.to_string();
        self.tree = None;
        self.canvas.clear();
        self.error_message = None;

        let sniffed = sniff(text);
        self.kind = sniffed.kind();
        debug!(kind = ?self.kind, len = text.len(), "Definition changed");

        let Some(decoded) = sniffed.into_roots() else {
            return ValidationResult::default();
        };

        let result = decoded
            .and_then(|roots| self.engine.validate(&roots).map(|()| roots))
            .map_err(|e| e.to_string())
            .and_then(|roots| {
                let board = self.boards.create(&self.board).map_err(|e| e.to_string())?;
                self.engine
                    .instantiate(&roots, board)
                    .map_err(|e| e.to_string())
            });

        match result {
            Ok(tree) => {
                self.canvas = project(tree.node_details());
                info!(
                    board = %tree.board_name(),
                    nodes = self.canvas.nodes.len(),
                    "Behaviour tree built"
                );
                self.tree = Some(tree);
                ValidationResult::success()
            }
            Err(message) => {
                warn!(error = %message, "Definition rejected");
                self.error_message = Some(message.clone());
                ValidationResult::failure(message)
            }
        }
    }

    /// Drops the definition, tree and graph.
    pub fn clear(&mut self) {
        self.on_definition_change("", None);
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn kind(&self) -> DefinitionKind {
        self.kind
    }

    pub fn board(&self) -> &str {
        &self.board
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn tree(&self) -> Option<&dyn TreeInstance> {
        self.tree.as_deref()
    }

    pub fn canvas(&self) -> &CanvasElements {
        &self.canvas
    }

    /// Only a definition that built a tree can be confirmed. Unrecognised
    /// text carries no error message but has no tree either.
    pub fn can_confirm(&self) -> bool {
        self.tree.is_some() && self.error_message.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DefinitionError;
    use crate::definition::model::NodeDefinition;
    use crate::tree::BuildError;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_successful_build_projects_graph() {
        let mut pipeline = DefinitionPipeline::default();
        let result =
            pipeline.on_definition_change("root { sequence { action [A] action [B] } }", None);
        assert_eq!(result, ValidationResult::success());
        assert_eq!(pipeline.kind(), DefinitionKind::Mdsl);
        assert!(pipeline.tree().is_some());
        assert_eq!(pipeline.canvas().nodes.len(), 4);
        assert_eq!(pipeline.canvas().edges.len(), 3);
        assert!(pipeline.can_confirm());
    }

    #[test]
    fn test_unrecognized_text_yields_empty_graph_without_error() {
        let mut pipeline = DefinitionPipeline::default();
        pipeline.on_definition_change("root { action [A] }", None);
        let result = pipeline.on_definition_change("this is not a tree", None);
        assert!(!result.succeeded);
        assert_eq!(result.error_message, None);
        assert_eq!(pipeline.kind(), DefinitionKind::None);
        assert!(pipeline.tree().is_none());
        assert!(pipeline.canvas().is_empty());
        assert_eq!(pipeline.definition(), "this is not a tree");
        assert!(!pipeline.can_confirm());
    }

    #[test]
    fn test_validation_failure_resets_tree_and_keeps_text() {
        let mut pipeline = DefinitionPipeline::default();
        pipeline.on_definition_change("root { action [A] }", None);
        let result = pipeline.on_definition_change("root { selector { } }", None);
        assert!(!result.succeeded);
        assert!(pipeline.tree().is_none());
        assert!(pipeline.canvas().is_empty());
        assert_eq!(pipeline.kind(), DefinitionKind::Mdsl);
        assert_eq!(pipeline.definition(), "root { selector { } }");
        assert!(pipeline.error_message().unwrap().contains("at least a single child"));
        assert!(!pipeline.can_confirm());
    }

    #[test]
    fn test_board_override_is_remembered() {
        let mut pipeline = DefinitionPipeline::default();
        let result =
            pipeline.on_definition_change("root { action [Fly] }", Some("board Arm { Grab }"));
        assert_eq!(
            result.error_message.as_deref(),
            Some("board 'Arm' does not provide function 'Fly'")
        );
        assert!(pipeline.tree().is_none());

        let result = pipeline.on_definition_change("root { action [Grab] }", None);
        assert!(result.succeeded);
        assert_eq!(pipeline.tree().unwrap().board_name(), "Arm");
        assert_eq!(pipeline.board(), "board Arm { Grab }");
    }

    #[test]
    fn test_unknown_board_is_reported() {
        let mut pipeline = DefinitionPipeline::default().with_board("Nope");
        let result = pipeline.on_definition_change("root { action [A] }", None);
        assert_eq!(result.error_message.as_deref(), Some("unknown board 'Nope'"));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut pipeline = DefinitionPipeline::default();
        pipeline.on_definition_change("root { action [A] }", None);
        pipeline.clear();
        assert_eq!(pipeline.definition(), "");
        assert_eq!(pipeline.kind(), DefinitionKind::None);
        assert!(pipeline.tree().is_none());
        assert!(!pipeline.can_confirm());
    }

    struct CountingEngine {
        validations: Arc<Mutex<usize>>,
    }

    impl TreeEngine for CountingEngine {
        fn validate(&self, roots: &[NodeDefinition]) -> Result<(), DefinitionError> {
            *self.validations.lock().unwrap() += 1;
            crate::definition::validate::validate(roots)
        }

        fn instantiate(
            &self,
            _roots: &[NodeDefinition],
            _board: Box<dyn crate::board::Board>,
        ) -> Result<Box<dyn TreeInstance>, BuildError> {
            Err(BuildError::InvalidBoard("engine offline".into()))
        }
    }

    #[test]
    fn test_engine_errors_surface_verbatim() {
        let validations = Arc::new(Mutex::new(0));
        let mut pipeline = DefinitionPipeline::new(
            Box::new(CountingEngine {
                validations: validations.clone(),
            }),
            BoardRegistry::default(),
        );
        let first = pipeline.on_definition_change("root { action [A] }", None);
        let second = pipeline.on_definition_change("root { action [A] }", None);
        assert_eq!(first, second);
        assert_eq!(first.error_message.as_deref(), Some("invalid board: engine offline"));
        assert_eq!(*validations.lock().unwrap(), 2);

        pipeline.on_definition_change("", None);
        assert_eq!(*validations.lock().unwrap(), 2);
    }
}
