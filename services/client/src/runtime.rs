//! The operator console event loop.
//!
//! One task owns the [`Session`]. Channel events, operator input and the
//! results of background work (audio playback, uploads) are multiplexed
//! onto it with `tokio::select!`, so the session itself never blocks.

use crate::audio::{AudioError, AudioPlayer};
use crate::connection::ChannelEvent;
use crate::render::ConsoleRenderer;
use crate::upload::{self, Uploader};
use anyhow::Context;
use robot_teaching_core::{ChatState, Command, Session};
use robot_teaching_core::session::UploadOutcome;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

pub const HELP: &str = "\
commands:
  <text>                send a message to the robot
  /start                start commanding the robot
  /accept               send the suggested reply
  /upload <file.json>   upload a demonstration file
  /video <a.mp4> <b.npy>
                        upload a demonstration video and its data
  /time <start> <end>   confirm a video segment, in seconds
  /definition <text>    replace the behaviour tree definition
  /board <text>         rebuild the current definition against another board
  /confirm              send the current definition to the robot
  /estop                emergency stop
  /quit                 close the session";

/// Sent by `/start`.
pub const START_COMMANDING: &str = "start commanding";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '/{0}', try /help")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// One line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Say(String),
    Start,
    AcceptDraft,
    Upload(PathBuf),
    Video(Vec<PathBuf>),
    Time { start: f64, end: f64 },
    Definition(String),
    Board(String),
    Confirm,
    EmergencyStop,
    Help,
    Quit,
}

impl OperatorCommand {
    /// Blank lines parse to `None`. Anything not starting with `/` is chat.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(OperatorCommand::Say(line.to_string())));
        };
        let (name, arg) = rest
            .split_once(char::is_whitespace)
            .map(|(name, arg)| (name, arg.trim()))
            .unwrap_or((rest, ""));

        let command = match name {
            "start" => OperatorCommand::Start,
            "accept" => OperatorCommand::AcceptDraft,
            "upload" if !arg.is_empty() => OperatorCommand::Upload(PathBuf::from(arg)),
            "upload" => return Err(CommandError::Usage("/upload <file.json>")),
            "video" if !arg.is_empty() => {
                OperatorCommand::Video(arg.split_whitespace().map(PathBuf::from).collect())
            }
            "video" => return Err(CommandError::Usage("/video <a.mp4> <b.npy>")),
            "time" => {
                let mut values = arg.split_whitespace().map(str::parse::<f64>);
                match (values.next(), values.next(), values.next()) {
                    (Some(Ok(start)), Some(Ok(end)), None) => OperatorCommand::Time { start, end },
                    _ => return Err(CommandError::Usage("/time <start> <end>")),
                }
            }
            "definition" => OperatorCommand::Definition(arg.to_string()),
            "board" => OperatorCommand::Board(arg.to_string()),
            "confirm" => OperatorCommand::Confirm,
            "estop" | "stop" => OperatorCommand::EmergencyStop,
            "help" => OperatorCommand::Help,
            "quit" | "exit" => OperatorCommand::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

/// Background work reporting back to the loop.
#[derive(Debug)]
pub enum Completion {
    PlaybackEnded(Result<(), AudioError>),
    UploadFinished(UploadOutcome),
}

/// The effectful services commands are dispatched to.
#[derive(Clone)]
pub struct Services {
    pub uploader: Arc<dyn Uploader>,
    pub player: Arc<dyn AudioPlayer>,
}

struct Console<'a, W> {
    session: &'a mut Session,
    services: Services,
    completions: mpsc::UnboundedSender<Completion>,
    renderer: ConsoleRenderer,
    out: &'a mut W,
}

/// Runs until the channel closes or the operator quits.
#[instrument(name = "console", skip_all, fields(session_id = session.id().map(|id| id.as_str()).unwrap_or("-")))]
pub async fn run<W: Write>(
    session: &mut Session,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    mut lines: mpsc::Receiver<String>,
    services: Services,
    out: &mut W,
) -> anyhow::Result<()> {
    let (completions, mut done) = mpsc::unbounded_channel();
    let mut console = Console {
        session,
        services,
        completions,
        renderer: ConsoleRenderer::new(),
        out,
    };
    console.render()?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ChannelEvent::Open) => console.session.on_open(),
                Some(ChannelEvent::Frame(frame)) => {
                    let commands = console.session.handle_frame(frame);
                    for command in commands {
                        console.dispatch(command)?;
                    }
                }
                Some(ChannelEvent::Error(reason)) => console.session.on_error(&reason),
                Some(ChannelEvent::Closed) | None => {
                    console.session.on_close();
                    console.render()?;
                    info!("Channel closed, leaving console.");
                    break;
                }
            },
            line = lines.recv() => match line {
                Some(line) => {
                    if !console.on_line(&line)? {
                        console.session.close();
                        console.render()?;
                        break;
                    }
                }
                None => {
                    info!("Operator input closed.");
                    console.session.close();
                    break;
                }
            },
            Some(completion) = done.recv() => console.on_completion(completion)?,
        }
        console.render()?;
    }
    Ok(())
}

impl<W: Write> Console<'_, W> {
    fn render(&mut self) -> anyhow::Result<()> {
        self.renderer
            .render(self.session, self.out)
            .context("Failed to write to the console")
    }

    fn alert(&mut self, message: &str) -> anyhow::Result<()> {
        self.renderer
            .alert(message, self.out)
            .context("Failed to write to the console")
    }

    /// Returns `false` once the operator asks to quit.
    fn on_line(&mut self, line: &str) -> anyhow::Result<bool> {
        let command = match OperatorCommand::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(true),
            Err(e) => {
                self.alert(&e.to_string())?;
                return Ok(true);
            }
        };
        debug!(?command, "Operator command");

        let chat = matches!(
            command,
            OperatorCommand::Say(_) | OperatorCommand::Start | OperatorCommand::AcceptDraft
        );
        if chat && self.session.state() == ChatState::RobotTalking {
            self.alert("The robot is talking, wait for it to finish.")?;
            return Ok(true);
        }

        let session = &mut *self.session;
        let result = match command {
            OperatorCommand::Say(text) => session.send_message(&text),
            OperatorCommand::Start => session.send_message(START_COMMANDING),
            OperatorCommand::AcceptDraft => {
                let draft = session.take_draft();
                if draft.is_empty() {
                    return self.alert("There is no suggested reply.").map(|_| true);
                }
                session.send_message(&draft)
            }
            OperatorCommand::Upload(file) => match session.upload_file(file) {
                Ok(command) => {
                    self.dispatch(command)?;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            OperatorCommand::Video(files) => match session.upload_video_files(&files) {
                Ok(command) => {
                    self.dispatch(command)?;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            OperatorCommand::Time { start, end } => session.select_time(start, end),
            OperatorCommand::Definition(text) => {
                session.edit_definition(&text, None);
                Ok(())
            }
            OperatorCommand::Board(board) => {
                let definition = session.pipeline().definition().to_string();
                session.edit_definition(&definition, Some(&board));
                Ok(())
            }
            OperatorCommand::Confirm => session.confirm_definition(),
            OperatorCommand::EmergencyStop => session.emergency_stop(),
            OperatorCommand::Help => {
                writeln!(self.out, "{HELP}").context("Failed to write to the console")?;
                Ok(())
            }
            OperatorCommand::Quit => return Ok(false),
        };

        if let Err(e) = result {
            self.alert(&e.to_string())?;
        }
        Ok(true)
    }

    /// Hands a command to its service. Long-running work is spawned and
    /// reports back as a [`Completion`].
    fn dispatch(&mut self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::PlayAudio(clip) => {
                let player = Arc::clone(&self.services.player);
                let done = self.completions.clone();
                tokio::spawn(async move {
                    let result = player.play(clip).await;
                    let _ = done.send(Completion::PlaybackEnded(result));
                });
            }
            Command::Upload(request) => {
                let uploader = Arc::clone(&self.services.uploader);
                let done = self.completions.clone();
                tokio::spawn(async move {
                    let outcome = upload::outcome(uploader.upload(&request).await);
                    let _ = done.send(Completion::UploadFinished(outcome));
                });
            }
            Command::Alert(message) => self.alert(&message)?,
        }
        Ok(())
    }

    fn on_completion(&mut self, completion: Completion) -> anyhow::Result<()> {
        match completion {
            Completion::PlaybackEnded(result) => {
                if let Err(e) = result {
                    warn!(error = %e, "Audio playback failed");
                }
                if let Err(e) = self.session.on_playback_ended() {
                    warn!(error = %e, "Could not report the end of playback");
                }
            }
            Completion::UploadFinished(outcome) => match self.session.on_upload_finished(outcome) {
                Ok(Some(command)) => self.dispatch(command)?,
                Ok(None) => {}
                Err(e) => self.alert(&e.to_string())?,
            },
        }
        Ok(())
    }
}
