//! Ordered, sender-grouped chat transcript.

use serde::Serialize;
use std::path::PathBuf;

/// The greeting every session transcript opens with.
pub const GREETING: &str = "Robot [Idle]: Hello. What can I do for you today?";

/// Who a transcript entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Robot,
}

/// A start/end window (in seconds) chosen on an uploaded demonstration video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeSelection {
    pub start: f64,
    pub end: Option<f64>,
}

/// One piece of content inside a transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Fragment {
    Text(String),
    /// A demonstration video, optionally with a segment the robot asked the
    /// operator to confirm.
    Video {
        path: PathBuf,
        selection: Option<TimeSelection>,
    },
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// A transcript entry: consecutive fragments from one sender.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub from: Sender,
    pub contexts: Vec<Fragment>,
}

/// The transcript. Insertion order is display order; entries are never
/// removed or reordered.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log holding only the robot greeting.
    pub fn with_greeting() -> Self {
        let mut log = Self::new();
        log.append(Sender::Robot, Fragment::text(GREETING));
        log
    }

    /// Appends `fragment`, extending the last entry when it has the same sender.
    pub fn append(&mut self, from: Sender, fragment: Fragment) {
        match self.messages.last_mut() {
            Some(last) if last.from == from => last.contexts.push(fragment),
            _ => self.messages.push(Message {
                from,
                contexts: vec![fragment],
            }),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total number of fragments across all entries.
    pub fn fragment_count(&self) -> usize {
        self.messages.iter().map(|m| m.contexts.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_fragments_are_grouped_by_sender() {
        let mut log = MessageLog::new();
        log.append(Sender::User, Fragment::text("a"));
        log.append(Sender::User, Fragment::text("b"));
        log.append(Sender::Robot, Fragment::text("c"));

        assert_eq!(
            log.messages(),
            &[
                Message {
                    from: Sender::User,
                    contexts: vec![Fragment::text("a"), Fragment::text("b")],
                },
                Message {
                    from: Sender::Robot,
                    contexts: vec![Fragment::text("c")],
                },
            ]
        );
        assert_eq!(log.fragment_count(), 3);
    }

    #[test]
    fn test_alternating_senders_start_new_entries() {
        let mut log = MessageLog::new();
        log.append(Sender::Robot, Fragment::text("1"));
        log.append(Sender::User, Fragment::text("2"));
        log.append(Sender::Robot, Fragment::text("3"));

        let senders: Vec<Sender> = log.messages().iter().map(|m| m.from).collect();
        assert_eq!(senders, vec![Sender::Robot, Sender::User, Sender::Robot]);
    }

    #[test]
    fn test_greeting_groups_with_following_robot_text() {
        let mut log = MessageLog::with_greeting();
        log.append(Sender::Robot, Fragment::text("more"));

        assert_eq!(log.len(), 1);
        assert_eq!(log.messages()[0].contexts[0], Fragment::text(GREETING));
    }

    #[test]
    fn test_fragment_serializes_with_kind_tag() {
        let json = serde_json::to_value(Fragment::Video {
            path: PathBuf::from("demo.mp4"),
            selection: Some(TimeSelection {
                start: 1.5,
                end: None,
            }),
        })
        .unwrap();
        assert_eq!(json["kind"], "video");
        assert_eq!(json["body"]["selection"]["start"], 1.5);
    }
}
