use robot_teaching_core::board::DEFAULT_BOARD;
use robot_teaching_core::endpoint;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Channel base URL, e.g. `ws://robot:8000`.
    pub robot_teaching_url: String,
    pub log_level: Level,
    /// Board text handed to the definition pipeline.
    pub board: String,
    /// Where received voice clips are written.
    pub audio_dir: PathBuf,
    /// Command run with the path of each clip. Without one, playback just
    /// waits for the clip's duration.
    pub audio_player: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let robot_teaching_url = std::env::var("ROBOT_TEACHING_URL")
            .map_err(|_| ConfigError::MissingVar("ROBOT_TEACHING_URL".to_string()))?;
        validate_url(&robot_teaching_url)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let board = std::env::var("BOARD").unwrap_or_else(|_| DEFAULT_BOARD.to_string());

        let audio_dir = std::env::var("AUDIO_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./audio"));

        let audio_player = std::env::var("AUDIO_PLAYER")
            .ok()
            .filter(|cmd| !cmd.trim().is_empty());

        Ok(Self {
            robot_teaching_url,
            log_level,
            board,
            audio_dir,
            audio_player,
        })
    }

    /// Replaces the channel URL, e.g. from a command-line flag.
    pub fn with_url(mut self, url: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        validate_url(&url)?;
        self.robot_teaching_url = url;
        Ok(self)
    }
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    endpoint::http_base(url)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidValue("ROBOT_TEACHING_URL".to_string(), e.to_string()))
}
