//! Multipart uploads of demonstration files.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use robot_teaching_core::session::{UploadOutcome, UploadRequest};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{info, instrument};

/// Multipart field every file is sent under.
pub const FILES_FIELD: &str = "files";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload rejected with status {0}")]
    Rejected(reqwest::StatusCode),
}

/// The JSON body the upload endpoints answer with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadReply {
    #[serde(default)]
    pub message: Option<String>,
}

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadReply, UploadError>;
}

/// Posts files with `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpUploader {
    client: reqwest::Client,
}

impl HttpUploader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    #[instrument(skip_all, fields(url = %request.url, files = request.files.len()))]
    async fn upload(&self, request: &UploadRequest) -> Result<UploadReply, UploadError> {
        let mut form = Form::new();
        for path in &request.files {
            let data = tokio::fs::read(path).await.map_err(|source| UploadError::Io {
                path: path.clone(),
                source,
            })?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            form = form.part(FILES_FIELD, Part::bytes(data).file_name(file_name));
        }

        let response = self.client.post(&request.url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected(status));
        }
        let reply = response.json::<UploadReply>().await?;
        info!(?reply.message, "Upload finished");
        Ok(reply)
    }
}

/// Maps an upload result onto what the session expects.
pub fn outcome(result: Result<UploadReply, UploadError>) -> UploadOutcome {
    match result {
        Ok(reply) => UploadOutcome::Replied {
            message: reply.message,
        },
        Err(e) => UploadOutcome::Failed(format!("Error: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robot_teaching_core::endpoint::UploadKind;
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one HTTP request, answering with `body`, and returns the raw request.
    async fn serve_once(listener: TcpListener, status: &'static str, body: &'static str) -> String {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= header_end + 4 + content_length {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        String::from_utf8_lossy(&request).into_owned()
    }

    fn request(url: String, files: Vec<PathBuf>) -> UploadRequest {
        UploadRequest {
            kind: UploadKind::Files,
            url,
            files,
        }
    }

    #[tokio::test]
    async fn test_missing_file_fails_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let result = HttpUploader::default()
            .upload(&request("http://127.0.0.1:9/uploadfiles/S1".into(), vec![missing.clone()]))
            .await;
        match result {
            Err(UploadError::Io { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected an io error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_posts_files_as_multipart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"{"steps": []}"#).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener, "200 OK", r#"{"message": "saved"}"#));

        let reply = HttpUploader::default()
            .upload(&request(format!("http://{addr}/uploadfiles/S1"), vec![path]))
            .await
            .unwrap();
        assert_eq!(reply.message.as_deref(), Some("saved"));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /uploadfiles/S1 "));
        assert!(raw.contains(r#"name="files"; filename="demo.json""#));
        assert!(raw.contains(r#"{"steps": []}"#));
    }

    #[tokio::test]
    async fn test_server_error_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.json");
        std::fs::write(&path, "{}").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener, "500 Internal Server Error", "{}"));

        let result = HttpUploader::default()
            .upload(&request(format!("http://{addr}/uploadfiles/S1"), vec![path]))
            .await;
        server.await.unwrap();
        assert!(matches!(result, Err(UploadError::Rejected(status)) if status.as_u16() == 500));
    }

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(
            outcome(Ok(UploadReply {
                message: Some("Error: duplicate".into())
            })),
            UploadOutcome::Replied {
                message: Some("Error: duplicate".into())
            }
        );
        assert_eq!(
            outcome(Ok(UploadReply::default())),
            UploadOutcome::Replied { message: None }
        );
        let failed = outcome(Err(UploadError::Io {
            path: PathBuf::from("a.json"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }));
        assert!(matches!(failed, UploadOutcome::Failed(m) if m.starts_with("Error: failed to read a.json")));
    }
}
