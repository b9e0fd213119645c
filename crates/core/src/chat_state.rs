//! Conversation mode state machine.
//!
//! The machine keeps exactly one current state plus a single previous-state
//! slot. Entering `robot_talking` records the interrupted state in the slot;
//! leaving it (either through the `ROBOT_TALKING_FINISH` token or when audio
//! playback ends) restores the slot and clears it.
//!
//! Only one level of interruption is supported: a second push while already
//! in `robot_talking` overwrites the slot, so the earlier saved state is lost.

use crate::protocol::ControlToken;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    Init,
    Closed,
    Error,
    Idle,
    GetDemonstrate,
    GetMap,
    Uploading,
    RobotTalking,
    AskForInstruction,
    TaskPlanning,
    WaitingForResponse,
    WaitingForConfirm,
}

impl ChatState {
    pub const ALL: [ChatState; 12] = [
        ChatState::Init,
        ChatState::Closed,
        ChatState::Error,
        ChatState::Idle,
        ChatState::GetDemonstrate,
        ChatState::GetMap,
        ChatState::Uploading,
        ChatState::RobotTalking,
        ChatState::AskForInstruction,
        ChatState::TaskPlanning,
        ChatState::WaitingForResponse,
        ChatState::WaitingForConfirm,
    ];

    /// Closed and errored sessions never leave their state.
    pub fn is_terminal(self) -> bool {
        matches!(self, ChatState::Closed | ChatState::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChatState::Init => "init",
            ChatState::Closed => "closed",
            ChatState::Error => "error",
            ChatState::Idle => "idle",
            ChatState::GetDemonstrate => "get_demonstrate",
            ChatState::GetMap => "get_map",
            ChatState::Uploading => "uploading",
            ChatState::RobotTalking => "robot_talking",
            ChatState::AskForInstruction => "ask_for_instruction",
            ChatState::TaskPlanning => "task_planning",
            ChatState::WaitingForResponse => "waiting_for_response",
            ChatState::WaitingForConfirm => "waiting_for_confirm",
        }
    }
}

impl fmt::Display for ChatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transition token does to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Restore the previous-state slot.
    Resume,
    /// Save the current state and enter `robot_talking`.
    Interrupt,
    Goto(ChatState),
}

impl Transition {
    pub fn for_token(token: ControlToken) -> Option<Self> {
        let transition = match token {
            ControlToken::RobotTalkingFinish => Transition::Resume,
            ControlToken::RobotTalkingStart => Transition::Interrupt,
            ControlToken::Idle => Transition::Goto(ChatState::Idle),
            ControlToken::GetDemonstration => Transition::Goto(ChatState::GetDemonstrate),
            ControlToken::GetMap => Transition::Goto(ChatState::GetMap),
            ControlToken::AskForInstruction => Transition::Goto(ChatState::AskForInstruction),
            ControlToken::TaskPlanning | ControlToken::LearningFromObservation => {
                Transition::Goto(ChatState::TaskPlanning)
            }
            ControlToken::LfoAsk | ControlToken::FillInForm => return None,
        };
        Some(transition)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatStateMachine {
    current: ChatState,
    previous: Option<ChatState>,
}

impl Default for ChatStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStateMachine {
    pub fn new() -> Self {
        Self::starting_at(ChatState::Init)
    }

    pub fn starting_at(state: ChatState) -> Self {
        Self {
            current: state,
            previous: None,
        }
    }

    pub fn current(&self) -> ChatState {
        self.current
    }

    pub fn previous(&self) -> Option<ChatState> {
        self.previous
    }

    /// Moves directly to `state` without touching the previous-state slot.
    /// Ignored once the machine is terminal.
    pub fn set(&mut self, state: ChatState) {
        if self.current.is_terminal() {
            debug!(current = %self.current, requested = %state, "Ignoring transition out of terminal state");
            return;
        }
        debug!(from = %self.current, to = %state, "Chat state transition");
        self.current = state;
    }

    /// Records the current state and enters `robot_talking`.
    pub fn interrupt(&mut self) {
        if self.current.is_terminal() {
            return;
        }
        if self.current == ChatState::RobotTalking {
            debug!("Nested interrupt overwrites the previous-state slot");
        }
        self.previous = Some(self.current);
        self.set(ChatState::RobotTalking);
    }

    /// Restores and clears the previous-state slot. Returns the restored state.
    pub fn resume(&mut self) -> Option<ChatState> {
        if self.current.is_terminal() {
            return None;
        }
        match self.previous.take() {
            Some(previous) => {
                self.set(previous);
                Some(previous)
            }
            None => {
                warn!(current = %self.current, "Resume requested with an empty previous-state slot");
                None
            }
        }
    }

    /// Applies a control token. Returns true when the token drove a transition.
    pub fn apply_token(&mut self, token: ControlToken) -> bool {
        match Transition::for_token(token) {
            Some(Transition::Resume) => self.resume().is_some(),
            Some(Transition::Interrupt) => {
                self.interrupt();
                self.current == ChatState::RobotTalking
            }
            Some(Transition::Goto(state)) => {
                self.set(state);
                self.current == state
            }
            None => false,
        }
    }

    pub fn on_channel_open(&mut self) {
        self.set(ChatState::Idle);
    }

    pub fn on_channel_error(&mut self) {
        self.set(ChatState::Error);
    }

    pub fn on_channel_close(&mut self) {
        self.set(ChatState::Closed);
    }
}
