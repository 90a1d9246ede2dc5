//! Classifier capability.
//!
//! Converts a clip into a confidence score, a feature vector and a list of
//! pest candidates. The model behind it is opaque to the monitor.

use std::process::Stdio;

use acoustic_core::Classification;
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{instrument, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifierError {
    #[error("classifier failed: {0}")]
    Failed(String),

    #[error("classifier returned invalid output: {0}")]
    InvalidOutput(String),

    #[error("classifier timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, audio: &[u8]) -> Result<Classification, ClassifierError>;
}

/// Runs an external classifier program: audio on stdin, JSON on stdout.
///
/// The JSON object needs a `confidence`; `pestCandidates` (or `pestTypes`) and
/// `features` (or `acousticFeatures`) default to empty when missing.
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
}

impl CommandClassifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Classifier for CommandClassifier {
    #[instrument(skip(self, audio), fields(program = %self.program, bytes = audio.len()))]
    async fn classify(&self, audio: &[u8]) -> Result<Classification, ClassifierError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClassifierError::Failed(format!("{}: {}", self.program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClassifierError::Failed("classifier stdin unavailable".to_string()))?;
        let feed = async move {
            let result = stdin.write_all(audio).await;
            drop(stdin);
            result
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output.map_err(|e| ClassifierError::Failed(e.to_string()))?;
        if let Err(e) = fed {
            warn!(error = %e, "classifier closed stdin early");
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClassifierError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_output(&output.stdout)
    }
}

/// Parses classifier JSON, taking the last non-empty line so that log chatter
/// printed before the result is ignored.
pub fn parse_output(stdout: &[u8]) -> Result<Classification, ClassifierError> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| ClassifierError::InvalidOutput("empty output".to_string()))?;

    serde_json::from_str::<Classification>(line)
        .map_err(|e| ClassifierError::InvalidOutput(e.to_string()))
}
