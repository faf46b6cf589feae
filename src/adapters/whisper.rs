use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use crate::domain::error::JobError;
use crate::domain::transcript::{TranscriptSegment, WordSpan};
use crate::ports::transcriber::Transcriber;

/// whisper.cpp sidecar: runs `whisper-cli` against an extracted WAV and
/// parses its full JSON output. Model size selects a GGML file under the
/// configured model directory.
pub struct WhisperSidecar {
    binary: PathBuf,
    model_dir: PathBuf,
    timeout_secs: u64,
}

impl WhisperSidecar {
    pub fn new(binary: PathBuf, model_dir: PathBuf) -> Self {
        Self {
            binary,
            model_dir,
            timeout_secs: 1800,
        }
    }

    fn model_path(&self, model: &str) -> PathBuf {
        self.model_dir.join(format!("ggml-{}.bin", model))
    }

    fn build_args(
        &self,
        wav: &Path,
        model: &str,
        language: Option<&str>,
        output_prefix: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            "--model".into(),
            self.model_path(model).to_string_lossy().into_owned(),
            "--output-json-full".into(),
            "--no-prints".into(),
            "--output-file".into(),
            output_prefix.to_string_lossy().into_owned(),
        ];
        if let Some(lang) = language {
            args.push("--language".into());
            args.push(lang.to_lowercase());
        }
        args.push("--file".into());
        args.push(wav.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl Transcriber for WhisperSidecar {
    async fn transcribe(
        &self,
        wav: &Path,
        model: &str,
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>, JobError> {
        let output_prefix = wav.with_extension("transcript");
        let args = self.build_args(wav, model, language, &output_prefix);

        tracing::debug!("running whisper: {:?} {:?}", self.binary, args);

        let child = TokioCommand::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                JobError::Transcription(format!(
                    "failed to spawn whisper binary {:?}: {}",
                    self.binary, e
                ))
            })?;

        let output = timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| {
                JobError::Transcription(format!("whisper timed out after {}s", self.timeout_secs))
            })?
            .map_err(|e| JobError::Transcription(format!("whisper process error: {}", e)))?;

        if !output.status.success() {
            return Err(JobError::Transcription(format!(
                "whisper exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let json_path = output_prefix.with_extension("transcript.json");
        let raw = tokio::fs::read_to_string(&json_path)
            .await
            .map_err(|e| {
                JobError::Transcription(format!("whisper output {:?} unreadable: {}", json_path, e))
            })?;

        parse_whisper_json(&raw)
    }
}

// ── whisper-cli JSON deserialization ────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WhisperJson {
    #[serde(default)]
    transcription: Vec<WhisperJsonSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperJsonSegment {
    offsets: WhisperOffsets,
    text: String,
    #[serde(default)]
    tokens: Vec<WhisperJsonToken>,
}

#[derive(Debug, Deserialize)]
struct WhisperJsonToken {
    text: String,
    offsets: WhisperOffsets,
}

#[derive(Debug, Deserialize)]
struct WhisperOffsets {
    from: u64,
    to: u64,
}

fn parse_whisper_json(raw: &str) -> Result<Vec<TranscriptSegment>, JobError> {
    let parsed: WhisperJson = serde_json::from_str(raw)
        .map_err(|e| JobError::Transcription(format!("malformed whisper JSON: {}", e)))?;

    let segments = parsed
        .transcription
        .into_iter()
        .filter(|seg| !seg.text.trim().is_empty())
        .map(|seg| TranscriptSegment {
            start: seg.offsets.from as f64 / 1000.0,
            end: seg.offsets.to as f64 / 1000.0,
            text: seg.text.trim().to_string(),
            words: merge_tokens_to_words(&seg.tokens),
        })
        .collect();

    Ok(segments)
}

/// whisper emits subword tokens; a token starting with a space begins a new
/// word. Special tokens (`[_BEG_]` and friends) carry no speech and are
/// dropped.
fn merge_tokens_to_words(tokens: &[WhisperJsonToken]) -> Vec<WordSpan> {
    let mut words: Vec<WordSpan> = Vec::new();

    for token in tokens {
        if token.text.starts_with("[_") {
            continue;
        }
        let starts_word = token.text.starts_with(' ') || words.is_empty();
        let piece = token.text.trim();
        if piece.is_empty() {
            continue;
        }

        if starts_word {
            words.push(WordSpan {
                word: piece.to_string(),
                start: token.offsets.from as f64 / 1000.0,
                end: token.offsets.to as f64 / 1000.0,
            });
        } else if let Some(last) = words.last_mut() {
            last.word.push_str(piece);
            last.end = token.offsets.to as f64 / 1000.0;
        }
    }

    words
}
