//! Boards: the set of functions a tree may call.
//!
//! Boards are never evaluated from code. Board text is either the name of a
//! registered board or a declaration that lists the functions it provides:
//!
//! ```text
//! board Kitchen { Walk, Grab, IsHolding }
//! ```
//!
//! Every board is handed the same fixed [`BoardHost`] capability set.

use crate::definition::mdsl::{Res, identifier, sp};
use crate::tree::BuildError;
use nom::{
    bytes::complete::tag,
    character::complete::char,
    combinator::{all_consuming, opt, verify},
    multi::separated_list0,
    sequence::{delimited, preceded, terminated, tuple},
};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Name of the built-in board that accepts every function.
pub const DEFAULT_BOARD: &str = "Agent";

/// Capabilities the client exposes to boards: three operator prompts and two
/// notification sinks.
pub trait BoardHost: Send + Sync {
    fn get_string_value(&self, prompt: &str) -> Option<String>;
    fn get_number_value(&self, prompt: &str) -> Option<f64>;
    fn get_boolean_value(&self, prompt: &str) -> bool;
    fn show_error_toast(&self, message: &str);
    fn show_info_toast(&self, message: &str);
}

/// A non-interactive host: prompts yield nothing and toasts go to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHost;

impl BoardHost for LoggingHost {
    fn get_string_value(&self, prompt: &str) -> Option<String> {
        debug!(prompt, "String prompt unanswered");
        None
    }

    fn get_number_value(&self, prompt: &str) -> Option<f64> {
        debug!(prompt, "Number prompt unanswered");
        None
    }

    fn get_boolean_value(&self, prompt: &str) -> bool {
        debug!(prompt, "Boolean prompt unanswered");
        false
    }

    fn show_error_toast(&self, message: &str) {
        error!(message, "Board error");
    }

    fn show_info_toast(&self, message: &str) {
        info!(message, "Board notice");
    }
}

pub trait Board: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the board can resolve a call to `function`.
    fn provides(&self, function: &str) -> bool;

    fn host(&self) -> &dyn BoardHost;
}

/// Resolves every function, deferring lookup to execution time.
pub struct OpenBoard {
    name: String,
    host: Arc<dyn BoardHost>,
}

impl Board for OpenBoard {
    fn name(&self) -> &str {
        &self.name
    }

    fn provides(&self, _function: &str) -> bool {
        true
    }

    fn host(&self) -> &dyn BoardHost {
        self.host.as_ref()
    }
}

/// Provides exactly the functions it was declared with.
pub struct DeclaredBoard {
    name: String,
    functions: BTreeSet<String>,
    host: Arc<dyn BoardHost>,
}

impl DeclaredBoard {
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(String::as_str)
    }
}

impl Board for DeclaredBoard {
    fn name(&self) -> &str {
        &self.name
    }

    fn provides(&self, function: &str) -> bool {
        self.functions.contains(function)
    }

    fn host(&self) -> &dyn BoardHost {
        self.host.as_ref()
    }
}

impl fmt::Debug for dyn Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board").field("name", &self.name()).finish()
    }
}

#[derive(Debug, Clone)]
enum Registered {
    Open,
    Declared(BTreeSet<String>),
}

/// A board declaration: `board <Name> { Fn1, Fn2, ... }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardDeclaration {
    pub name: String,
    pub functions: Vec<String>,
}

fn declaration(input: &str) -> Res<'_, BoardDeclaration> {
    let list = separated_list0(delimited(sp, char(','), sp), identifier);
    let (rest, (_, name, functions)) = all_consuming(delimited(
        sp,
        tuple((
            verify(identifier, |word: &str| word == "board"),
            preceded(sp, identifier),
            preceded(
                sp,
                delimited(
                    terminated(char('{'), sp),
                    terminated(list, opt(preceded(sp, tag(",")))),
                    preceded(sp, char('}')),
                ),
            ),
        )),
        sp,
    ))(input)?;
    Ok((
        rest,
        BoardDeclaration {
            name: name.to_string(),
            functions: functions.into_iter().map(str::to_string).collect(),
        },
    ))
}

impl BoardDeclaration {
    pub fn parse(text: &str) -> Result<Self, BuildError> {
        declaration(text)
            .map(|(_, decl)| decl)
            .map_err(|e| BuildError::InvalidBoard(format!("malformed board declaration: {e}")))
    }
}

/// Creates boards from board text.
pub struct BoardRegistry {
    host: Arc<dyn BoardHost>,
    boards: HashMap<String, Registered>,
}

impl Default for BoardRegistry {
    fn default() -> Self {
        Self::new(Arc::new(LoggingHost))
    }
}

impl BoardRegistry {
    /// A registry holding only the open [`DEFAULT_BOARD`].
    pub fn new(host: Arc<dyn BoardHost>) -> Self {
        let mut boards = HashMap::new();
        boards.insert(DEFAULT_BOARD.to_string(), Registered::Open);
        Self { host, boards }
    }

    pub fn register_open(&mut self, name: impl Into<String>) {
        self.boards.insert(name.into(), Registered::Open);
    }

    pub fn register<I, S>(&mut self, name: impl Into<String>, functions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let functions = functions.into_iter().map(Into::into).collect();
        self.boards.insert(name.into(), Registered::Declared(functions));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.boards.contains_key(name)
    }

    /// Builds a board from a registered name or a declaration. Empty text
    /// selects the default board.
    pub fn create(&self, text: &str) -> Result<Box<dyn Board>, BuildError> {
        let text = text.trim();
        let name = if text.is_empty() { DEFAULT_BOARD } else { text };

        if let Some(registered) = self.boards.get(name) {
            return Ok(self.build(name.to_string(), registered.clone()));
        }

        if name.starts_with("board") && name.contains('{') {
            let decl = BoardDeclaration::parse(name)?;
            debug!(board = %decl.name, functions = decl.functions.len(), "Declared board");
            let functions = decl.functions.into_iter().collect();
            return Ok(self.build(decl.name, Registered::Declared(functions)));
        }

        Err(BuildError::UnknownBoard(name.to_string()))
    }

    fn build(&self, name: String, registered: Registered) -> Box<dyn Board> {
        let host = Arc::clone(&self.host);
        match registered {
            Registered::Open => Box::new(OpenBoard { name, host }),
            Registered::Declared(functions) => Box::new(DeclaredBoard {
                name,
                functions,
                host,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHost {
        toasts: Mutex<Vec<String>>,
    }

    impl BoardHost for RecordingHost {
        fn get_string_value(&self, _prompt: &str) -> Option<String> {
            Some("kitchen".into())
        }
        fn get_number_value(&self, _prompt: &str) -> Option<f64> {
            Some(3.0)
        }
        fn get_boolean_value(&self, _prompt: &str) -> bool {
            true
        }
        fn show_error_toast(&self, message: &str) {
            self.toasts.lock().unwrap().push(format!("error: {message}"));
        }
        fn show_info_toast(&self, message: &str) {
            self.toasts.lock().unwrap().push(format!("info: {message}"));
        }
    }

    #[test]
    fn test_default_board_is_open() {
        let registry = BoardRegistry::default();
        for text in ["", "  ", "Agent"] {
            let board = registry.create(text).unwrap();
            assert_eq!(board.name(), DEFAULT_BOARD);
            assert!(board.provides("AnythingAtAll"));
        }
    }

    #[test]
    fn test_declared_board_is_restricted() {
        let registry = BoardRegistry::default();
        let board = registry
            .create("board Kitchen { Walk, Grab, }")
            .unwrap();
        assert_eq!(board.name(), "Kitchen");
        assert!(board.provides("Walk"));
        assert!(board.provides("Grab"));
        assert!(!board.provides("Fly"));
    }

    #[test]
    fn test_declaration_allows_comments_and_empty_lists() {
        let decl = BoardDeclaration::parse("board Empty { /* nothing yet */ }").unwrap();
        assert_eq!(decl.name, "Empty");
        assert!(decl.functions.is_empty());
    }

    #[test]
    fn test_unknown_and_malformed_boards() {
        let registry = BoardRegistry::default();
        assert!(matches!(
            registry.create("Robot"),
            Err(BuildError::UnknownBoard(name)) if name == "Robot"
        ));
        assert!(matches!(
            registry.create("board { Walk }"),
            Err(BuildError::InvalidBoard(_))
        ));
        assert!(matches!(
            registry.create("class Agent { walk() { eval('x') } }"),
            Err(BuildError::UnknownBoard(_))
        ));
    }

    #[test]
    fn test_registered_boards_share_the_host() {
        let host = Arc::new(RecordingHost::default());
        let mut registry = BoardRegistry::new(host.clone());
        registry.register("Arm", ["Grab", "Release"]);
        registry.register_open("Sandbox");

        let arm = registry.create("Arm").unwrap();
        assert!(arm.provides("Release"));
        assert!(!arm.provides("Walk"));
        assert!(registry.create("Sandbox").unwrap().provides("Walk"));

        assert_eq!(arm.host().get_string_value("where?").as_deref(), Some("kitchen"));
        assert_eq!(arm.host().get_number_value("how many?"), Some(3.0));
        assert!(arm.host().get_boolean_value("sure?"));
        arm.host().show_info_toast("picked up");
        arm.host().show_error_toast("dropped");
        assert_eq!(
            *host.toasts.lock().unwrap(),
            vec!["info: picked up".to_string(), "error: dropped".to_string()]
        );
    }
}
