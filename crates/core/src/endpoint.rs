//! Session ids and the URLs derived from the configured base URL.

use rand::{Rng, distr::Alphanumeric};
use serde::Serialize;
use std::fmt;

const SESSION_ID_LENGTH: usize = 16;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("unsupported channel URL scheme in '{0}', expected ws:// or wss://")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(String);

impl SessionId {
    /// 16 random characters from `[0-9a-zA-Z]`.
    pub fn generate() -> Self {
        let id = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LENGTH)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which upload endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    /// A single `.json` demonstration file.
    Files,
    /// A `.mp4` video with its `.npy`/`.npz` companion.
    VideoFiles,
}

impl UploadKind {
    pub fn path(self) -> &'static str {
        match self {
            UploadKind::Files => "uploadfiles",
            UploadKind::VideoFiles => "uploadvideofiles",
        }
    }
}

/// `<base>/ws/<id>`
pub fn channel_url(base_url: &str, id: &SessionId) -> String {
    format!("{}/ws/{id}", base_url.trim_end_matches('/'))
}

/// The HTTP origin matching a channel base URL.
pub fn http_base(base_url: &str) -> Result<String, EndpointError> {
    let base = base_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("wss://") {
        Ok(format!("https://{rest}"))
    } else if let Some(rest) = base.strip_prefix("ws://") {
        Ok(format!("http://{rest}"))
    } else {
        Err(EndpointError::UnsupportedScheme(base_url.to_string()))
    }
}

/// `<http base>/<uploadfiles|uploadvideofiles>/<id>`
pub fn upload_url(base_url: &str, kind: UploadKind, id: &SessionId) -> Result<String, EndpointError> {
    Ok(format!("{}/{}/{id}", http_base(base_url)?, kind.path()))
}
