//! Plain-text rendering of a session for the terminal.

use robot_teaching_core::ChatState;
use robot_teaching_core::Session;
use robot_teaching_core::graph::CanvasElements;
use robot_teaching_core::message_log::{Fragment, Sender};
use std::collections::HashMap;
use std::io::{self, Write};

/// Prints what changed in a session since the previous call.
#[derive(Debug, Default)]
pub struct ConsoleRenderer {
    fragments_shown: usize,
    state: Option<ChatState>,
    canvas: CanvasElements,
    error: Option<String>,
    draft: String,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, session: &Session, out: &mut impl Write) -> io::Result<()> {
        let fragments = session
            .log()
            .messages()
            .iter()
            .flat_map(|m| m.contexts.iter().map(move |f| (m.from, f)));
        for (from, fragment) in fragments.skip(self.fragments_shown) {
            writeln!(out, "{}", format_fragment(from, fragment))?;
            self.fragments_shown += 1;
        }

        let state = session.state();
        if self.state != Some(state) {
            self.state = Some(state);
            match quick_action(state) {
                Some(hint) => writeln!(out, "-- state: {state} ({hint})")?,
                None => writeln!(out, "-- state: {state}")?,
            }
        }

        let pipeline = session.pipeline();
        let error = pipeline.error_message().map(str::to_string);
        if error != self.error {
            if let Some(message) = &error {
                writeln!(out, "-- definition error: {message}")?;
            }
            self.error = error;
        }
        if *pipeline.canvas() != self.canvas {
            self.canvas = pipeline.canvas().clone();
            if self.canvas.is_empty() {
                writeln!(out, "-- tree cleared")?;
            } else {
                writeln!(out, "-- tree:")?;
                write!(out, "{}", outline(&self.canvas))?;
            }
        }

        if session.draft() != self.draft {
            self.draft = session.draft().to_string();
            if !self.draft.is_empty() {
                writeln!(out, "-- suggested reply: {}", self.draft)?;
            }
        }
        out.flush()
    }

    pub fn alert(&self, message: &str, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "!! {message}")?;
        out.flush()
    }
}

/// What the operator is expected to do next in `state`.
pub fn quick_action(state: ChatState) -> Option<&'static str> {
    match state {
        ChatState::Idle => Some("/start to start commanding"),
        ChatState::GetDemonstrate => Some("/video <a.mp4> <b.npy> to upload a demonstration"),
        ChatState::GetMap => Some("/upload <file.json> to upload a map"),
        ChatState::TaskPlanning => Some("/confirm if the plan looks good"),
        ChatState::RobotTalking => Some("input is paused while the robot talks"),
        _ => None,
    }
}

pub fn format_fragment(from: Sender, fragment: &Fragment) -> String {
    let who = match from {
        Sender::User => "you",
        Sender::Robot => "robot",
    };
    match fragment {
        Fragment::Text(text) => format!("{who}> {}", text.trim_end()),
        Fragment::Video { path, selection } => match selection {
            Some(s) => format!(
                "{who}> [video {}] segment {:.2}s..{}",
                path.display(),
                s.start,
                s.end.map(|e| format!("{e:.2}s")).unwrap_or_else(|| "end".into())
            ),
            None => format!("{who}> [video {}]", path.display()),
        },
    }
}

/// An indented outline of the graph, one node per line.
pub fn outline(canvas: &CanvasElements) -> String {
    let parents: HashMap<&str, &str> = canvas
        .edges
        .iter()
        .map(|e| (e.to.as_str(), e.from.as_str()))
        .collect();
    let mut depths: HashMap<&str, usize> = HashMap::new();
    let mut text = String::new();

    for node in &canvas.nodes {
        let depth = parents
            .get(node.id.as_str())
            .and_then(|parent| depths.get(parent))
            .map_or(0, |d| d + 1);
        depths.insert(node.id.as_str(), depth);

        text.push_str(&"  ".repeat(depth));
        text.push_str(&node.caption);
        if !node.args.is_empty() {
            let args: Vec<String> = node.args.iter().map(|a| a.to_string()).collect();
            text.push_str(&format!("({})", args.join(", ")));
        }
        for (label, call) in [
            ("while", &node.while_guard),
            ("until", &node.until_guard),
            ("entry", &node.entry),
            ("step", &node.step),
            ("exit", &node.exit),
        ] {
            if let Some(call) = call {
                text.push_str(&format!(" {label}:{}", call.call));
            }
        }
        text.push('\n');
    }
    text
}
