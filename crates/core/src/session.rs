//! The teaching session: one channel, one conversation, one definition.
//!
//! [`Session`] ties the protocol decoder, the conversation state machine,
//! the message log and the definition pipeline together. It is plain data
//! mutated through `&mut self`; anything slow is handed back to the caller as
//! a [`Command`].

use crate::Command;
use crate::chat_state::{ChatState, ChatStateMachine};
use crate::definition::{DefinitionPipeline, ValidationResult};
use crate::endpoint::{self, EndpointError, SessionId, UploadKind};
use crate::message_log::{Fragment, MessageLog, Sender, TimeSelection};
use crate::protocol::{
    ControlToken, DecodedFrame, InboundFrame, OutboundFrame, TextFrame, decode, numeric_arg,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// The outbound half of the duplex channel.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    fn close(&mut self);
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("channel is closed")]
    Closed,
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError {
    #[error("please select a .json file")]
    ExpectedJson,
    #[error("please select two files")]
    ExpectedTwoFiles,
    #[error("please select a .mp4 file and a .npy or .npz file")]
    ExpectedVideoPair,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("channel is not connected")]
    NotConnected,
    #[error("there is no valid definition to confirm")]
    NothingToConfirm,
    #[error(transparent)]
    InvalidSelection(#[from] SelectionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

/// Files to POST as multipart field `files`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub kind: UploadKind,
    pub url: String,
    pub files: Vec<PathBuf>,
}

/// What the upload endpoint answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The request completed; the reply may still carry an `Error...` message.
    Replied { message: Option<String> },
    /// The request never produced a reply.
    Failed(String),
}

pub struct Session {
    id: Option<SessionId>,
    base_url: String,
    transport: Box<dyn Transport>,
    connected: bool,
    machine: ChatStateMachine,
    log: MessageLog,
    pipeline: DefinitionPipeline,
    draft: String,
    uploaded_video: Option<PathBuf>,
}

impl Session {
    pub fn new(
        base_url: impl Into<String>,
        id: SessionId,
        transport: Box<dyn Transport>,
        pipeline: DefinitionPipeline,
    ) -> Self {
        Self {
            id: Some(id),
            base_url: base_url.into(),
            transport,
            connected: false,
            machine: ChatStateMachine::new(),
            log: MessageLog::with_greeting(),
            pipeline,
            draft: String::new(),
            uploaded_video: None,
        }
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    pub fn state(&self) -> ChatState {
        self.machine.current()
    }

    pub fn previous_state(&self) -> Option<ChatState> {
        self.machine.previous()
    }

    pub fn is_connected(&self) -> bool {
        self.connected && self.id.is_some()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn pipeline(&self) -> &DefinitionPipeline {
        &self.pipeline
    }

    /// Text pre-filled into the operator's input by the robot.
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn take_draft(&mut self) -> String {
        std::mem::take(&mut self.draft)
    }

    pub fn uploaded_video(&self) -> Option<&Path> {
        self.uploaded_video.as_deref()
    }

    // ------------------------------------------------------------------
    // Channel lifecycle
    // ------------------------------------------------------------------

    pub fn on_open(&mut self) {
        info!(session_id = %self.id_str(), "Channel open");
        self.connected = true;
        self.machine.on_channel_open();
    }

    pub fn on_error(&mut self, reason: &str) {
        error!(session_id = %self.id_str(), reason, "Channel error");
        self.connected = false;
        self.machine.on_channel_error();
    }

    pub fn on_close(&mut self) {
        info!(session_id = %self.id_str(), state = %self.state(), "Channel closed");
        self.connected = false;
        self.machine.on_channel_close();
    }

    /// Closes the channel and forgets the session id.
    pub fn close(&mut self) {
        if self.id.is_none() {
            return;
        }
        self.transport.close();
        self.on_close();
        self.id = None;
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Processes one frame from the channel.
    pub fn handle_frame(&mut self, frame: InboundFrame) -> Vec<Command> {
        match decode(frame) {
            DecodedFrame::Audio(audio) => {
                debug!(bytes = audio.data.len(), "Audio frame");
                self.machine.interrupt();
                vec![Command::PlayAudio(audio)]
            }
            DecodedFrame::Text(frame) => {
                self.handle_text(frame);
                Vec::new()
            }
        }
    }

    fn handle_text(&mut self, frame: TextFrame) {
        debug!(tokens = ?frame.tokens, has_args = frame.args.is_some(), "Text frame");

        if let Some(token) = frame.transition() {
            self.machine.apply_token(token);
        }

        if frame.is_robot_chat() {
            self.log
                .append(Sender::Robot, Fragment::text(frame.chat_text()));
            if let Some(block) = &frame.definition {
                self.pipeline.on_definition_change(&block.text, None);
            }
        }

        if frame.contains(ControlToken::Idle) {
            self.pipeline.clear();
        }

        if frame.raw.starts_with(ControlToken::FillInForm.literal()) {
            let marker = format!("{}:", ControlToken::FillInForm.literal());
            self.draft = frame.primary.split(&marker).nth(1).unwrap_or_default().to_string();
        }

        if frame.contains(ControlToken::LfoAsk) {
            self.ask_for_segment(frame.args.as_deref().unwrap_or_default());
        }
    }

    /// Shows the uploaded video with the segment the robot proposes.
    fn ask_for_segment(&mut self, args: &str) {
        let Some(video) = self.uploaded_video.clone() else {
            warn!("Segment confirmation requested without an uploaded video");
            return;
        };
        let selection = TimeSelection {
            start: numeric_arg(args, "start").unwrap_or(0.0),
            end: numeric_arg(args, "end"),
        };
        self.log.append(
            Sender::User,
            Fragment::Video {
                path: video,
                selection: Some(selection),
            },
        );
        self.machine.set(ChatState::WaitingForConfirm);
    }

    /// Audio playback finished: tell the robot and resume the interrupted state.
    pub fn on_playback_ended(&mut self) -> Result<(), SessionError> {
        let sent = self.send_frame(OutboundFrame::PlayEnded);
        self.machine.resume();
        sent
    }

    // ------------------------------------------------------------------
    // Operator actions
    // ------------------------------------------------------------------

    /// Sends operator text. The log keeps the full text even when the frame
    /// is truncated.
    pub fn send_message(&mut self, text: &str) -> Result<(), SessionError> {
        self.send_frame(OutboundFrame::UserText(text.to_string()))?;
        self.log.append(Sender::User, Fragment::text(text));
        self.machine.set(ChatState::WaitingForResponse);
        Ok(())
    }

    pub fn emergency_stop(&mut self) -> Result<(), SessionError> {
        warn!(session_id = %self.id_str(), "Emergency stop");
        self.send_message(&OutboundFrame::EmergencyStop.encode())
    }

    pub fn select_time(&mut self, start: f64, end: f64) -> Result<(), SessionError> {
        self.send_message(&OutboundFrame::TimeSelected { start, end }.encode())
    }

    pub fn confirm_definition(&mut self) -> Result<(), SessionError> {
        if !self.pipeline.can_confirm() {
            return Err(SessionError::NothingToConfirm);
        }
        let frame = OutboundFrame::DefinitionConfirmed(self.pipeline.definition().to_string());
        self.send_message(&frame.encode())
    }

    pub fn edit_definition(&mut self, text: &str, board: Option<&str>) -> ValidationResult {
        self.pipeline.on_definition_change(text, board)
    }

    /// Starts uploading one `.json` demonstration file.
    pub fn upload_file(&mut self, file: impl Into<PathBuf>) -> Result<Command, SessionError> {
        let file = file.into();
        if !has_extension(&file, &["json"]) {
            return Err(SelectionError::ExpectedJson.into());
        }
        let url = self.upload_url(UploadKind::Files)?;

        self.machine.set(ChatState::Uploading);
        info!(file = %file.display(), "Uploading demonstration file");
        Ok(Command::Upload(UploadRequest {
            kind: UploadKind::Files,
            url,
            files: vec![file],
        }))
    }

    /// Starts uploading a `.mp4` video and its `.npy`/`.npz` companion.
    pub fn upload_video_files(&mut self, files: &[PathBuf]) -> Result<Command, SessionError> {
        if files.len() != 2 {
            return Err(SessionError::InvalidSelection(SelectionError::ExpectedTwoFiles));
        }
        let video = files.iter().find(|f| has_extension(f, &["mp4"]));
        let companion = files.iter().find(|f| has_extension(f, &["npy", "npz"]));
        let Some((video, _)) = video.zip(companion) else {
            return Err(SelectionError::ExpectedVideoPair.into());
        };
        let url = self.upload_url(UploadKind::VideoFiles)?;

        self.machine.set(ChatState::Uploading);
        self.uploaded_video = Some(video.clone());
        self.log.append(
            Sender::User,
            Fragment::Video {
                path: video.clone(),
                selection: None,
            },
        );
        info!(video = %video.display(), "Uploading demonstration video");
        Ok(Command::Upload(UploadRequest {
            kind: UploadKind::VideoFiles,
            url,
            files: files.to_vec(),
        }))
    }

    /// Reports the end of an upload. Failures come back as an alert and
    /// leave the conversation in `uploading`.
    pub fn on_upload_finished(
        &mut self,
        outcome: UploadOutcome,
    ) -> Result<Option<Command>, SessionError> {
        match outcome {
            UploadOutcome::Replied { message: Some(message) } if message.starts_with("Error") => {
                warn!(%message, "Upload rejected");
                Ok(Some(Command::Alert(message)))
            }
            UploadOutcome::Failed(reason) => {
                error!(%reason, "Upload failed");
                Ok(Some(Command::Alert(reason)))
            }
            UploadOutcome::Replied { .. } => {
                self.send_message(&OutboundFrame::UploadComplete.encode())?;
                Ok(None)
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn send_frame(&mut self, frame: OutboundFrame) -> Result<(), SessionError> {
        if !self.is_connected() {
            warn!(frame = ?frame, "Dropping outbound frame, channel is not open");
            return Err(SessionError::NotConnected);
        }
        self.transport.send_text(frame.encode())?;
        Ok(())
    }

    fn upload_url(&self, kind: UploadKind) -> Result<String, SessionError> {
        let id = self.id.as_ref().ok_or(SessionError::NotConnected)?;
        Ok(endpoint::upload_url(&self.base_url, kind, id)?)
    }

    fn id_str(&self) -> &str {
        self.id.as_ref().map(SessionId::as_str).unwrap_or("-")
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| extensions.contains(&ext))
}
