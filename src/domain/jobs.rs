use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Suffix tagging a produced output artifact. A file carrying this tag is
/// never rescheduled as an input — that would reprocess outputs forever
/// when they are written alongside their sources.
pub const OUTPUT_TAG: &str = "_edited";

/// Source extensions considered by batch discovery.
pub const SOURCE_EXTENSIONS: [&str; 3] = ["mp4", "mov", "m4v"];

/// Optional background audio blended under the original track.
#[derive(Debug, Clone, PartialEq)]
pub struct MixSpec {
    pub source: PathBuf,
    /// Multiplier applied to the auxiliary stream. Values above 1.0 are
    /// allowed but can clip the original dialogue.
    pub gain: f64,
}

/// The unit of work the batch orchestrator schedules: one source video plus
/// its requested options. Discarded after reaching a terminal state; the
/// only persistence across runs is the output-tag idempotency marker.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub id: String,
    pub source: PathBuf,
    pub mix: Option<MixSpec>,
    pub end_card: Option<PathBuf>,
    pub model: String,
    pub language: Option<String>,
}

impl PipelineJob {
    pub fn new(
        source: PathBuf,
        mix: Option<MixSpec>,
        end_card: Option<PathBuf>,
        model: String,
        language: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            mix,
            end_card,
            model,
            language,
        }
    }

    pub fn stem(&self) -> String {
        self.source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string())
    }
}

/// Discovery-time classification of a candidate file. The idempotency
/// predicate is evaluated exactly once, here; no later stage re-derives
/// the marker string.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Pending(PathBuf),
    AlreadyDone(PathBuf),
}

pub fn classify(path: &Path) -> Candidate {
    let is_output = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|stem| stem.ends_with(OUTPUT_TAG))
        .unwrap_or(false);

    if is_output {
        Candidate::AlreadyDone(path.to_path_buf())
    } else {
        Candidate::Pending(path.to_path_buf())
    }
}

/// Deterministic final artifact path for a source, under `output_root`.
pub fn output_path(source: &Path, output_root: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".to_string());
    output_root.join(format!("{}{}.mp4", stem, OUTPUT_TAG))
}

/// Deterministic caption track path for a source, under `captions_dir`.
pub fn caption_path(source: &Path, captions_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".to_string());
    captions_dir.join(format!("{}.ass", stem))
}

/// Per-batch outcome counts, reported once at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
}
