//! Parser for the MDSL definition dialect.
//!
//! ```text
//! root {
//!     sequence while(IsPowered) {
//!         action [Walk, "kitchen", 2]
//!         wait [500, 1000]
//!         branch [PickUp]
//!     }
//! }
//! root [PickUp] { action [Grab] }
//! ```
//!
//! Action and condition argument lists may also use parentheses:
//! `action("go")` is the same as `action ["go"]`.

use super::{DefinitionError, MAX_DEPTH};
use super::model::{Bounds, CallDefinition, NodeDefinition, NodeKind};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_until},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace1},
    combinator::{all_consuming, cut, map, opt, recognize, value, verify},
    error::{ContextError, ErrorKind, ParseError, VerboseError, context},
    multi::{many0, many0_count, many1, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
};
use serde_json::{Value, json};

pub(crate) type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

// ============================================================================
// Public API
// ============================================================================

/// Parses MDSL text into its root nodes.
pub fn parse(input: &str) -> Result<Vec<NodeDefinition>, DefinitionError> {
    match definition(input) {
        Ok((_, roots)) => Ok(roots),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(DefinitionError::Syntax(nom::error::convert_error(input, e)))
        }
        Err(nom::Err::Incomplete(_)) => Err(DefinitionError::Syntax("incomplete input".into())),
    }
}

// ============================================================================
// Lexical helpers
// ============================================================================

fn comment(input: &str) -> Res<'_, ()> {
    value((), tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

/// Skips whitespace and `/* */` comments.
pub(crate) fn sp(input: &str) -> Res<'_, ()> {
    value((), many0_count(alt((value((), multispace1), comment))))(input)
}

pub(crate) fn identifier(input: &str) -> Res<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> Res<'a, &'a str> {
    verify(identifier, move |found: &str| found == word)
}

fn comma(input: &str) -> Res<'_, char> {
    delimited(sp, char(','), sp)(input)
}

fn string_literal(input: &str) -> Res<'_, String> {
    map(
        delimited(
            char('"'),
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((
                    value("\\", tag("\\")),
                    value("\"", tag("\"")),
                    value("\n", tag("n")),
                    value("\t", tag("t")),
                )),
            )),
            cut(char('"')),
        ),
        Option::unwrap_or_default,
    )(input)
}

fn integer(input: &str) -> Res<'_, i64> {
    let (rest, digits) = recognize(pair(opt(char('-')), digit1))(input)?;
    match digits.parse::<i64>() {
        Ok(n) => Ok((rest, n)),
        Err(_) => Err(nom::Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::Digit,
        ))),
    }
}

fn number(input: &str) -> Res<'_, Value> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;
    let parsed = if text.contains('.') {
        text.parse::<f64>().ok().map(Value::from)
    } else {
        text.parse::<i64>().ok().map(Value::from)
    };
    match parsed {
        Some(v) => Ok((rest, v)),
        None => Err(nom::Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::Float,
        ))),
    }
}

fn argument(input: &str) -> Res<'_, Value> {
    context(
        "argument",
        alt((
            map(string_literal, Value::String),
            value(Value::Bool(true), keyword("true")),
            value(Value::Bool(false), keyword("false")),
            value(Value::Null, keyword("null")),
            map(preceded(char('$'), identifier), |name| json!({ "$": name })),
            number,
        )),
    )(input)
}

fn function_name(input: &str) -> Res<'_, String> {
    alt((map(identifier, str::to_string), string_literal))(input)
}

fn call_body(input: &str) -> Res<'_, CallDefinition> {
    let (input, call) = context("function name", function_name)(input)?;
    let (input, args) = many0(preceded(comma, argument))(input)?;
    Ok((input, CallDefinition { call, args }))
}

/// `[Name, args...]` or `(Name, args...)`.
fn call_list(input: &str) -> Res<'_, CallDefinition> {
    alt((
        delimited(
            pair(char('['), sp),
            cut(call_body),
            pair(sp, cut(context("closing bracket", char(']')))),
        ),
        delimited(
            pair(char('('), sp),
            cut(call_body),
            pair(sp, cut(context("closing parenthesis", char(')')))),
        ),
    ))(input)
}

fn integer_list(input: &str) -> Res<'_, Vec<i64>> {
    delimited(
        pair(char('['), sp),
        cut(separated_list1(comma, integer)),
        pair(sp, cut(context("closing bracket", char(']')))),
    )(input)
}

fn bounds(input: &str) -> Res<'_, Bounds> {
    let (rest, values) = integer_list(input)?;
    match values.as_slice() {
        [n] => Ok((rest, Bounds::Fixed(*n))),
        [min, max] => Ok((rest, Bounds::Range(*min, *max))),
        _ => Err(nom::Err::Failure(VerboseError::add_context(
            input,
            "at most two bound values",
            VerboseError::from_error_kind(input, ErrorKind::Count),
        ))),
    }
}

// ============================================================================
// Attributes
// ============================================================================

fn attribute(input: &str) -> Res<'_, (&str, CallDefinition)> {
    let (input, name) = alt((
        keyword("while"),
        keyword("until"),
        keyword("entry"),
        keyword("step"),
        keyword("exit"),
    ))(input)?;
    let (input, _) = sp(input)?;
    let (input, call) = cut(delimited(
        pair(char('('), sp),
        call_body,
        pair(sp, context("closing parenthesis", char(')'))),
    ))(input)?;
    Ok((input, (name, call)))
}

fn attributes(input: &str) -> Res<'_, Vec<(&str, CallDefinition)>> {
    many0(preceded(sp, attribute))(input)
}

fn apply_attributes(node: &mut NodeDefinition, attributes: Vec<(&str, CallDefinition)>) {
    for (name, call) in attributes {
        let slot = match name {
            "while" => &mut node.while_guard,
            "until" => &mut node.until_guard,
            "entry" => &mut node.entry,
            "step" => &mut node.step,
            _ => &mut node.exit,
        };
        *slot = Some(call);
    }
}

// ============================================================================
// Nodes
// ============================================================================

fn child_block<'a>(input: &'a str, depth: usize) -> Res<'a, NodeDefinition> {
    delimited(
        tuple((sp, char('{'), sp)),
        context("child node", |i: &'a str| node(i, depth)),
        pair(sp, context("closing brace", char('}'))),
    )(input)
}

fn children_block<'a>(input: &'a str, depth: usize) -> Res<'a, Vec<NodeDefinition>> {
    delimited(
        pair(sp, char('{')),
        many0(preceded(sp, |i: &'a str| node(i, depth))),
        pair(sp, context("closing brace", char('}'))),
    )(input)
}

/// A node `depth` levels below its root.
fn node(input: &str, depth: usize) -> Res<'_, NodeDefinition> {
    if depth > MAX_DEPTH {
        return Err(nom::Err::Failure(VerboseError::add_context(
            input,
            "node nested too deeply",
            VerboseError::from_error_kind(input, ErrorKind::TooLarge),
        )));
    }
    let (rest, word) = identifier(input)?;
    let kind = match NodeKind::from_keyword(word) {
        Some(kind) if kind != NodeKind::Root => kind,
        _ => {
            return Err(nom::Err::Error(VerboseError::add_context(
                input,
                "node type",
                VerboseError::from_error_kind(input, ErrorKind::Tag),
            )));
        }
    };

    let mut definition = NodeDefinition::new(kind);
    let (rest, _) = sp(rest)?;
    let rest = match kind {
        NodeKind::Action | NodeKind::Condition => {
            let (rest, call) = cut(context("argument list", call_list))(rest)?;
            definition.call = Some(call.call);
            definition.args = call.args;
            rest
        }
        NodeKind::Branch => {
            let (rest, name) = cut(delimited(
                pair(char('['), sp),
                context("branch reference", identifier),
                pair(sp, context("closing bracket", char(']'))),
            ))(rest)?;
            definition.reference = Some(name.to_string());
            rest
        }
        NodeKind::Wait => {
            let (rest, duration) = opt(bounds)(rest)?;
            definition.duration = duration;
            rest
        }
        NodeKind::Repeat => {
            let (rest, iterations) = opt(bounds)(rest)?;
            definition.iterations = iterations;
            rest
        }
        NodeKind::Retry => {
            let (rest, attempts) = opt(bounds)(rest)?;
            definition.attempts = attempts;
            rest
        }
        NodeKind::Lotto => {
            let (rest, weights) = opt(integer_list)(rest)?;
            definition.weights = weights;
            rest
        }
        _ => rest,
    };

    let (rest, attrs) = attributes(rest)?;
    apply_attributes(&mut definition, attrs);

    let rest = if kind.is_composite() {
        let (rest, children) = cut(|i| children_block(i, depth + 1))(rest)?;
        definition.children = children;
        rest
    } else if kind.is_decorator() {
        let (rest, child) = cut(|i| child_block(i, depth + 1))(rest)?;
        definition.child = Some(Box::new(child));
        rest
    } else {
        rest
    };

    Ok((rest, definition))
}

fn root(input: &str) -> Res<'_, NodeDefinition> {
    let (input, _) = keyword("root")(input)?;
    let (input, _) = sp(input)?;
    let (input, id) = opt(delimited(
        pair(char('['), sp),
        cut(context("root name", identifier)),
        pair(sp, cut(char(']'))),
    ))(input)?;
    let (input, attrs) = attributes(input)?;
    let (input, child) = cut(context("root body", |i| child_block(i, 1)))(input)?;

    let mut definition = NodeDefinition::new(NodeKind::Root);
    definition.id = id.map(str::to_string);
    definition.child = Some(Box::new(child));
    apply_attributes(&mut definition, attrs);
    Ok((input, definition))
}

fn definition(input: &str) -> Res<'_, Vec<NodeDefinition>> {
    all_consuming(delimited(sp, many1(terminated(root, sp)), sp))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_minimal_root() {
        let roots = parse("root { action [Walk] }").unwrap();
        assert_eq!(roots.len(), 1);
        let child = roots[0].child.as_deref().unwrap();
        assert_eq!(child.kind, NodeKind::Action);
        assert_eq!(child.call.as_deref(), Some("Walk"));
    }

    #[test]
    fn test_parenthesised_arguments_with_string_name() {
        let roots = parse("root { action(\"go\") }").unwrap();
        let child = roots[0].child.as_deref().unwrap();
        assert_eq!(child.call.as_deref(), Some("go"));
        assert!(child.args.is_empty());
    }

    #[test]
    fn test_arguments_of_every_type() {
        let roots =
            parse(r#"root { condition [Check, "a \"b\"", 3, -1.5, true, null, $speed] }"#).unwrap();
        let child = roots[0].child.as_deref().unwrap();
        assert_eq!(
            child.args,
            vec![
                json!("a \"b\""),
                json!(3),
                json!(-1.5),
                json!(true),
                Value::Null,
                json!({ "$": "speed" }),
            ]
        );
    }

    #[test]
    fn test_composites_decorators_and_guards() {
        let text = r#"
            /* main behaviour */
            root {
                sequence while(IsPowered) entry(Start, 1) exit(Stop) {
                    repeat [2, 4] { flip { condition [IsBlocked] } }
                    lotto [1, 3] { wait [100] wait }
                    branch [PickUp]
                }
            }
            root [PickUp] until(HasItem) { retry [3] { action [Grab] } }
        "#;
        let roots = parse(text).unwrap();
        assert_eq!(roots.len(), 2);

        let sequence = roots[0].child.as_deref().unwrap();
        assert_eq!(sequence.kind, NodeKind::Sequence);
        assert_eq!(sequence.while_guard.as_ref().unwrap().call, "IsPowered");
        assert_eq!(sequence.entry.as_ref().unwrap().args, vec![json!(1)]);
        assert_eq!(sequence.exit.as_ref().unwrap().call, "Stop");
        assert_eq!(sequence.children.len(), 3);

        let repeat = &sequence.children[0];
        assert_eq!(repeat.iterations, Some(Bounds::Range(2, 4)));
        assert_eq!(repeat.child.as_deref().unwrap().kind, NodeKind::Flip);

        let lotto = &sequence.children[1];
        assert_eq!(lotto.weights, Some(vec![1, 3]));
        assert_eq!(lotto.children[0].duration, Some(Bounds::Fixed(100)));
        assert_eq!(lotto.children[1].duration, None);

        assert_eq!(sequence.children[2].reference.as_deref(), Some("PickUp"));

        assert_eq!(roots[1].id.as_deref(), Some("PickUp"));
        assert_eq!(roots[1].until_guard.as_ref().unwrap().call, "HasItem");
    }

    #[test]
    fn test_rejects_unknown_node_type() {
        assert!(matches!(
            parse("root { walk [Fast] }"),
            Err(DefinitionError::Syntax(_))
        ));
    }

    #[test]
    fn test_rejects_unbalanced_and_trailing_input() {
        assert!(parse("root { action [Walk]").is_err());
        assert!(parse("root { action [Walk] } extra").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_rejects_nested_root_and_json() {
        assert!(parse("root { root { action [A] } }").is_err());
        assert!(parse(r#"{"type": "root"}"#).is_err());
    }

    fn nested_flips(levels: usize) -> String {
        format!(
            "root {{ {}action [A]{} }}",
            "flip { ".repeat(levels),
            " }".repeat(levels)
        )
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        assert!(parse(&nested_flips(MAX_DEPTH - 1)).is_ok());

        match parse(&nested_flips(3000)) {
            Err(DefinitionError::Syntax(message)) => {
                assert!(message.contains("node nested too deeply"))
            }
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_decorator_requires_single_child_block() {
        assert!(parse("root { flip { action [A] action [B] } }").is_err());
    }
}
