//! Playback of the robot's voice clips.

use async_trait::async_trait;
use robot_teaching_core::protocol::AudioFrame;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid WAV data: {0}")]
    InvalidWav(&'static str),
    #[error("audio player exited with {0}")]
    Player(std::process::ExitStatus),
}

#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Plays `clip`, returning once playback has finished.
    async fn play(&self, clip: AudioFrame) -> Result<(), AudioError>;
}

/// Writes each clip to disk, then runs the configured player on it. Without
/// a player, "playback" lasts as long as the clip.
#[derive(Debug)]
pub struct WavPlayer {
    dir: PathBuf,
    command: Option<String>,
    clips: AtomicU64,
}

impl WavPlayer {
    pub fn new(dir: impl Into<PathBuf>, command: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            command,
            clips: AtomicU64::new(0),
        }
    }

    async fn write_clip(&self, clip: &AudioFrame) -> Result<PathBuf, AudioError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let n = self.clips.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("clip-{n:04}.wav"));
        tokio::fs::write(&path, &clip.data).await?;
        Ok(path)
    }
}

#[async_trait]
impl AudioPlayer for WavPlayer {
    #[instrument(skip_all, fields(bytes = clip.data.len()))]
    async fn play(&self, clip: AudioFrame) -> Result<(), AudioError> {
        let path = self.write_clip(&clip).await?;
        match &self.command {
            Some(command) => run_player(command, &path).await,
            None => {
                let duration = wav_duration(&clip.data)?;
                debug!(path = %path.display(), ?duration, "No player configured, waiting out the clip");
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }
}

async fn run_player(command: &str, path: &Path) -> Result<(), AudioError> {
    let mut parts = command.split_whitespace();
    let program = parts.next().unwrap_or(command);
    let status = Command::new(program).args(parts).arg(path).status().await?;
    if status.success() {
        Ok(())
    } else {
        Err(AudioError::Player(status))
    }
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Reads the playing time of a RIFF/WAVE clip from its `fmt ` and `data`
/// chunks.
pub fn wav_duration(data: &[u8]) -> Result<Duration, AudioError> {
    if !data.starts_with(b"RIFF") || data.get(8..12) != Some(b"WAVE".as_slice()) {
        return Err(AudioError::InvalidWav("missing RIFF/WAVE header"));
    }

    let mut byte_rate = None;
    let mut offset = 12;
    while let (Some(id), Some(size)) = (data.get(offset..offset + 4), read_u32(data, offset + 4)) {
        let body = offset + 8;
        match id {
            b"fmt " => byte_rate = read_u32(data, body + 8),
            b"data" => {
                let rate = byte_rate.filter(|r| *r > 0).ok_or(AudioError::InvalidWav(
                    "data chunk before a valid fmt chunk",
                ))?;
                return Ok(Duration::from_secs_f64(f64::from(size) / f64::from(rate)));
            }
            _ => {}
        }
        // Chunks are padded to an even length.
        offset = body + size as usize + (size as usize & 1);
    }
    Err(AudioError::InvalidWav("no data chunk"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    /// A PCM16 mono clip of `samples` silent samples.
    fn wav(sample_rate: u32, samples: u32) -> Vec<u8> {
        let data_len = samples * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(out.len() + data_len as usize, 0);
        out
    }

    #[test]
    fn test_wav_duration() {
        let clip = wav(16_000, 1_600);
        assert_eq!(wav_duration(&clip).unwrap(), Duration::from_millis(100));
    }

    #[test]
    fn test_wav_duration_skips_unknown_chunks() {
        let mut clip = wav(8_000, 8_000);
        let list = [b"LIST".as_slice(), &3u32.to_le_bytes(), b"abc\0"].concat();
        clip.splice(36..36, list);
        assert_eq!(wav_duration(&clip).unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_wav() {
        assert!(matches!(wav_duration(b"OggS"), Err(AudioError::InvalidWav(_))));
        let headerless = wav(16_000, 10)[..36].to_vec();
        assert!(matches!(wav_duration(&headerless), Err(AudioError::InvalidWav(_))));
    }

    #[tokio::test]
    async fn test_play_without_player_writes_clip() {
        let dir = tempfile::tempdir().unwrap();
        let player = WavPlayer::new(dir.path().join("audio"), None);
        let clip = AudioFrame {
            data: Bytes::from(wav(16_000, 160)),
        };

        player.play(clip.clone()).await.unwrap();
        player.play(clip).await.unwrap();

        let written = std::fs::read(dir.path().join("audio/clip-0001.wav")).unwrap();
        assert_eq!(written, wav(16_000, 160));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_player_command_status() {
        let dir = tempfile::tempdir().unwrap();
        let clip = AudioFrame {
            data: Bytes::from_static(b"not even a wav"),
        };

        let ok = WavPlayer::new(dir.path(), Some("true".into()));
        ok.play(clip.clone()).await.unwrap();

        let failing = WavPlayer::new(dir.path(), Some("false".into()));
        assert!(matches!(failing.play(clip).await, Err(AudioError::Player(_))));
    }
}
