use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage names, used for error context and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Probe,
    ExtractAudio,
    Captioning,
    Mixing,
    Compositing,
    EndCard,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Probe => "probe",
            Stage::ExtractAudio => "audio extraction",
            Stage::Captioning => "captioning",
            Stage::Mixing => "audio mixing",
            Stage::Compositing => "compositing",
            Stage::EndCard => "end-card append",
        };
        f.write_str(name)
    }
}

/// Everything that can fail a single pipeline job.
///
/// Failures are caught at job granularity by the batch orchestrator; none of
/// these abort sibling jobs. An empty transcript is not an error (a silent
/// video legitimately yields an empty caption track) — `Transcription` means
/// the model itself could not run.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("input error for {path:?}: {reason}")]
    Input { path: PathBuf, reason: String },

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("media engine failed during {stage}: {detail}")]
    MediaEngine { stage: Stage, detail: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cancelled during {0}")]
    Cancelled(Stage),
}

impl JobError {
    pub fn engine(stage: Stage, detail: impl Into<String>) -> Self {
        JobError::MediaEngine {
            stage,
            detail: detail.into(),
        }
    }

    /// Wrap a failed engine invocation, capturing stderr for diagnosis.
    pub fn from_output(stage: Stage, output: &std::process::Output) -> Self {
        JobError::MediaEngine {
            stage,
            detail: format!(
                "exit status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ),
        }
    }
}
