pub mod board;
pub mod chat_state;
pub mod definition;
pub mod endpoint;
pub mod graph;
pub mod message_log;
pub mod protocol;
pub mod session;
pub mod tree;

pub use chat_state::{ChatState, ChatStateMachine};
pub use definition::{DefinitionKind, DefinitionPipeline, ValidationResult};
pub use session::{Session, SessionError, Transport, TransportError};

use protocol::AudioFrame;
use session::UploadRequest;

/// Represents effects that the session asks an external runtime to perform.
///
/// The session itself never blocks or touches the network beyond its
/// [`Transport`]; audio playback and HTTP uploads are carried out by the
/// runtime, which reports completion back through
/// [`Session::on_playback_ended`] and [`Session::on_upload_finished`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Play a WAV clip of the robot's voice.
    PlayAudio(AudioFrame),
    /// POST files to an upload endpoint.
    Upload(UploadRequest),
    /// Show a blocking notice to the operator.
    Alert(String),
}
