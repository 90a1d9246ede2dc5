//! Audio capture capability.
//!
//! The monitor never talks to audio hardware itself. It asks an [`AudioCapture`]
//! for a clip of a given length and treats the result as opaque bytes.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    /// The capability is structurally missing (no driver, no recorder binary).
    /// Retrying will not help.
    #[error("audio capture unavailable: {0}")]
    Unavailable(String),

    /// A single capture failed; the next attempt may succeed.
    #[error("audio capture failed: {0}")]
    Failed(String),

    #[error("audio capture timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

impl CaptureError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CaptureError::Unavailable(_))
    }
}

#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Records `duration` of audio from `device_ref` on behalf of `sensor_id`.
    async fn record(
        &self,
        sensor_id: &str,
        device_ref: &str,
        duration: Duration,
    ) -> Result<Vec<u8>, CaptureError>;
}

/// Captures by spawning an ALSA-style recorder that writes WAV to stdout.
///
/// A recorder binary that cannot be found or executed maps to
/// [`CaptureError::Unavailable`]; every other failure is transient.
pub struct CommandCapture {
    program: String,
}

impl CommandCapture {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(device_ref: &str, duration: Duration) -> Vec<String> {
        // whole seconds, at least one
        let seconds = duration.as_millis().div_ceil(1000).max(1);
        vec![
            "-q".to_string(),
            "-D".to_string(),
            device_ref.to_string(),
            "-d".to_string(),
            seconds.to_string(),
            "-f".to_string(),
            "S16_LE".to_string(),
            "-r".to_string(),
            "16000".to_string(),
            "-c".to_string(),
            "1".to_string(),
            "-t".to_string(),
            "wav".to_string(),
            "-".to_string(),
        ]
    }
}

#[async_trait]
impl AudioCapture for CommandCapture {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn record(
        &self,
        sensor_id: &str,
        device_ref: &str,
        duration: Duration,
    ) -> Result<Vec<u8>, CaptureError> {
        let output = Command::new(&self.program)
            .args(Self::args(device_ref, duration))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    CaptureError::Unavailable(format!("{}: {}", self.program, e))
                }
                _ => CaptureError::Failed(e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(CaptureError::Failed("recorder produced no audio".to_string()));
        }

        debug!(bytes = output.stdout.len(), "clip recorded");
        Ok(output.stdout)
    }
}
