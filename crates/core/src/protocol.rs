//! Wire protocol between the teaching client and the robot backend.
//!
//! The backend speaks over a single duplex channel:
//!
//! - binary frames are WAV clips of the robot's voice;
//! - text frames are `"<primary>__args__<arguments>"`, where the primary part
//!   may carry control tokens and an embedded `root { ... }` tree definition.

use bytes::Bytes;
use std::ops::Range;

/// Separates the primary text of an inbound frame from its argument text.
pub const ARGS_DELIMITER: &str = "__args__";

/// Outbound user text is cut to this many characters.
pub const MAX_MESSAGE_LENGTH: usize = 5000;

/// Keyword that opens an embedded tree definition.
pub const DEFINITION_KEYWORD: &str = "root";

/// Prefix marking a text frame as robot chat.
pub const ROBOT_PREFIX: &str = "Robot";

/// A raw frame as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Binary(Bytes),
    Text(String),
}

/// An opaque WAV payload to hand to audio playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub data: Bytes,
}

impl AudioFrame {
    pub const MIME_TYPE: &'static str = "audio/wav";
}

/// Control tokens recognized in the primary text of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlToken {
    RobotTalkingFinish,
    RobotTalkingStart,
    Idle,
    GetDemonstration,
    GetMap,
    AskForInstruction,
    TaskPlanning,
    LearningFromObservation,
    /// The robot asks the operator to confirm a segment of the uploaded video.
    LfoAsk,
    /// The robot pre-fills the operator's input box.
    FillInForm,
}

/// Token grammar in precedence order. The first entry found in a frame wins.
const TOKEN_TABLE: &[(&str, ControlToken)] = &[
    ("ROBOT_TALKING_FINISH", ControlToken::RobotTalkingFinish),
    ("ROBOT_TALKING_START", ControlToken::RobotTalkingStart),
    ("[Idle]", ControlToken::Idle),
    ("[GetDemonstration]", ControlToken::GetDemonstration),
    ("[GetMap]", ControlToken::GetMap),
    ("[AskForInstruction]", ControlToken::AskForInstruction),
    ("[TaskPlanning]", ControlToken::TaskPlanning),
    ("[LfO]", ControlToken::LearningFromObservation),
    ("[LFO_ASK]", ControlToken::LfoAsk),
    ("[FILL_IN_FORM]", ControlToken::FillInForm),
];

impl ControlToken {
    /// The literal that signals this token on the wire.
    pub fn literal(self) -> &'static str {
        TOKEN_TABLE
            .iter()
            .find(|(_, token)| *token == self)
            .map(|(literal, _)| *literal)
            .unwrap_or_default()
    }

    /// Position in the precedence order; lower wins.
    pub fn precedence(self) -> usize {
        TOKEN_TABLE
            .iter()
            .position(|(_, token)| *token == self)
            .unwrap_or(usize::MAX)
    }

    /// Whether this token drives a conversation-mode transition, as opposed
    /// to a content directive.
    pub fn is_transition(self) -> bool {
        !matches!(self, ControlToken::LfoAsk | ControlToken::FillInForm)
    }

    /// All tokens contained in `text`, ordered by precedence.
    pub fn scan(text: &str) -> Vec<ControlToken> {
        TOKEN_TABLE
            .iter()
            .filter(|(literal, _)| text.contains(literal))
            .map(|(_, token)| *token)
            .collect()
    }
}

/// An embedded tree definition located inside a frame's primary text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionBlock {
    /// Byte range of the block within the primary text.
    pub range: Range<usize>,
    pub text: String,
}

/// A decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFrame {
    pub raw: String,
    pub primary: String,
    pub args: Option<String>,
    /// Every recognized token in the primary text, in precedence order.
    pub tokens: Vec<ControlToken>,
    pub definition: Option<DefinitionBlock>,
}

impl TextFrame {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let (primary, args) = match raw.split_once(ARGS_DELIMITER) {
            Some((primary, args)) => (primary.to_string(), Some(args.to_string())),
            None => (raw.clone(), None),
        };
        let tokens = ControlToken::scan(&primary);
        let definition = find_definition_block(&primary);
        Self {
            raw,
            primary,
            args,
            tokens,
            definition,
        }
    }

    /// The highest-precedence transition token, if any.
    pub fn transition(&self) -> Option<ControlToken> {
        self.tokens.iter().copied().find(|t| t.is_transition())
    }

    pub fn contains(&self, token: ControlToken) -> bool {
        self.tokens.contains(&token)
    }

    /// Whether the frame is robot chat meant for the transcript.
    pub fn is_robot_chat(&self) -> bool {
        self.raw.starts_with(ROBOT_PREFIX)
    }

    /// The primary text with any definition block removed.
    pub fn chat_text(&self) -> String {
        match &self.definition {
            Some(block) => {
                let mut text = String::with_capacity(self.primary.len());
                text.push_str(&self.primary[..block.range.start]);
                text.push_str(&self.primary[block.range.end..]);
                text
            }
            None => self.primary.clone(),
        }
    }
}

/// Output of the protocol decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    Audio(AudioFrame),
    Text(TextFrame),
}

/// Demultiplexes one raw frame.
pub fn decode(frame: InboundFrame) -> DecodedFrame {
    match frame {
        InboundFrame::Binary(data) => DecodedFrame::Audio(AudioFrame { data }),
        InboundFrame::Text(text) => DecodedFrame::Text(TextFrame::parse(text)),
    }
}

/// Finds the first `root { ... }` block, matching braces and ignoring braces
/// inside double-quoted strings. An unterminated block yields `None`.
pub fn find_definition_block(text: &str) -> Option<DefinitionBlock> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(DEFINITION_KEYWORD) {
        let start = search_from + offset;
        let after_keyword = start + DEFINITION_KEYWORD.len();
        let rest = &text[after_keyword..];
        let open = after_keyword + (rest.len() - rest.trim_start().len());

        if text[open..].starts_with('{') {
            return match_closing_brace(text, open).map(|end| DefinitionBlock {
                range: start..end,
                text: text[start..end].to_string(),
            });
        }
        search_from = after_keyword;
    }
    None
}

/// Returns the byte offset just past the brace closing the one at `open`.
fn match_closing_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[open..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Frames the client sends to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    UserText(String),
    EmergencyStop,
    UploadComplete,
    DefinitionConfirmed(String),
    PlayEnded,
    TimeSelected { start: f64, end: f64 },
}

impl OutboundFrame {
    pub fn encode(&self) -> String {
        match self {
            OutboundFrame::UserText(text) => truncate(text, MAX_MESSAGE_LENGTH).to_string(),
            OutboundFrame::EmergencyStop => "e-stop".to_string(),
            OutboundFrame::UploadComplete => "(Upload Complete)".to_string(),
            OutboundFrame::DefinitionConfirmed(definition) => {
                format!("(BT_Confirmed)\n{definition}")
            }
            OutboundFrame::PlayEnded => "[play_ended]".to_string(),
            OutboundFrame::TimeSelected { start, end } => {
                format!("(time selected) start: {start:.2}, end: {end:.2}")
            }
        }
    }
}

/// Cuts `text` to at most `max` characters.
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Reads a `<key>:<number>` value out of free-form argument text.
pub fn numeric_arg(args: &str, key: &str) -> Option<f64> {
    let needle = format!("{key}:");
    let start = args.find(&needle)? + needle.len();
    let digits: String = args[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok()
}
