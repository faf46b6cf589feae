use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::domain::error::JobError;
use crate::domain::jobs::{
    self, BatchSummary, Candidate, MixSpec, PipelineJob, SOURCE_EXTENSIONS,
};
use crate::ports::media::MediaRunner;
use crate::ports::transcriber::Transcriber;

use super::pipeline::{CancelToken, OutputLayout, PipelineService};

/// One batch invocation: where to look, what to caption with, and which
/// optional treatments to apply to every job.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Directory to scan, or a single video file
    pub input: PathBuf,
    pub model: String,
    pub language: Option<String>,
    pub music: Option<PathBuf>,
    pub music_volume: f64,
    pub end_card: Option<PathBuf>,
}

/// Drives pending sources through the pipeline one at a time. A failed job
/// is logged and counted; it never aborts the rest of the batch.
pub struct BatchService<M, T> {
    pipeline: PipelineService<M, T>,
}

impl<M, T> BatchService<M, T>
where
    M: MediaRunner,
    T: Transcriber,
{
    pub fn new(pipeline: PipelineService<M, T>) -> Self {
        Self { pipeline }
    }

    pub async fn run(
        &self,
        request: &BatchRequest,
        layout: &OutputLayout,
        cancel: &CancelToken,
    ) -> Result<BatchSummary, JobError> {
        validate(request)?;

        let mut summary = BatchSummary::default();
        let sources = discover(&request.input, &layout.output_root, &mut summary)?;
        info!(
            "batch: {} pending, {} already done",
            sources.len(),
            summary.skipped
        );

        for source in sources {
            if cancel.is_cancelled() {
                info!("batch cancelled, stopping before next job");
                break;
            }

            let job = PipelineJob::new(
                source.clone(),
                request.music.as_ref().map(|m| MixSpec {
                    source: m.clone(),
                    gain: request.music_volume,
                }),
                request.end_card.clone(),
                request.model.clone(),
                request.language.clone(),
            );

            info!("job {}: processing {:?}", job.id, source);
            match self.pipeline.run(&job, layout, cancel).await {
                Ok(final_path) => {
                    info!("job {}: wrote {:?}", job.id, final_path);
                    summary.done += 1;
                }
                Err(JobError::Cancelled(stage)) => {
                    info!("job {}: cancelled during {}", job.id, stage);
                    break;
                }
                Err(e) => {
                    error!("job {}: {:?} failed: {}", job.id, source, e);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}

/// Reject a request whose referenced files cannot work before any job
/// starts. Batch-level misconfiguration fails the whole run; per-source
/// problems surface later as individual job failures.
fn validate(request: &BatchRequest) -> Result<(), JobError> {
    if !request.input.exists() {
        return Err(JobError::Configuration(format!(
            "input path {:?} does not exist",
            request.input
        )));
    }
    if let Some(music) = &request.music {
        if !music.is_file() {
            return Err(JobError::Configuration(format!(
                "music file {:?} does not exist",
                music
            )));
        }
        if !request.music_volume.is_finite() || request.music_volume <= 0.0 {
            return Err(JobError::Configuration(format!(
                "music volume must be a positive number, got {}",
                request.music_volume
            )));
        }
        if request.music_volume > 1.0 {
            warn!(
                "music volume {} amplifies the track and may clip dialogue",
                request.music_volume
            );
        }
    }
    if let Some(card) = &request.end_card {
        if !card.is_file() {
            return Err(JobError::Configuration(format!(
                "end card {:?} does not exist",
                card
            )));
        }
    }
    Ok(())
}

/// Enumerate pending sources. Non-recursive, sorted by filename so runs are
/// deterministic. A file is skipped when it carries the output tag or when
/// its derived output artifact already exists.
fn discover(
    input: &Path,
    output_root: &Path,
    summary: &mut BatchSummary,
) -> Result<Vec<PathBuf>, JobError> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if input.is_file() {
        candidates.push(input.to_path_buf());
    } else {
        let entries = std::fs::read_dir(input).map_err(|e| {
            JobError::Configuration(format!("cannot read input directory {:?}: {}", input, e))
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| {
                JobError::Configuration(format!("cannot read input directory {:?}: {}", input, e))
            })?;
            let path = entry.path();
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| SOURCE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && matches_ext {
                candidates.push(path);
            }
        }
        candidates.sort();
    }

    let mut pending = Vec::new();
    for path in candidates {
        match jobs::classify(&path) {
            Candidate::AlreadyDone(path) => {
                info!("skipping {:?}: already an output artifact", path);
                summary.skipped += 1;
            }
            Candidate::Pending(path) => {
                // a prior run may have produced the artifact already
                if jobs::output_path(&path, output_root).is_file() {
                    info!("skipping {:?}: output already exists", path);
                    summary.skipped += 1;
                } else {
                    pending.push(path);
                }
            }
        }
    }

    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::media::MockMediaRunner;
    use crate::ports::transcriber::MockTranscriber;
    use std::io;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};
    use tempfile::tempdir;

    fn mock_output(stdout: &str, success: bool) -> io::Result<Output> {
        Ok(Output {
            status: if success {
                ExitStatus::from_raw(0)
            } else {
                ExitStatus::from_raw(256)
            },
            stdout: stdout.as_bytes().to_vec(),
            stderr: b"boom".to_vec(),
        })
    }

    fn probe_json() -> String {
        serde_json::json!({
            "streams": [
                { "codec_type": "video", "width": 1080, "height": 1920 },
                { "codec_type": "audio", "codec_name": "aac" }
            ],
            "format": { "duration": "5.0" }
        })
        .to_string()
    }

    fn layout(root: &Path) -> OutputLayout {
        OutputLayout {
            output_root: root.to_path_buf(),
            captions_dir: root.join("transcriptions"),
            work_root: root.join(".capburn"),
        }
    }

    fn request(input: &Path) -> BatchRequest {
        BatchRequest {
            input: input.to_path_buf(),
            model: "small".into(),
            language: None,
            music: None,
            music_volume: 0.3,
            end_card: None,
        }
    }

    #[test]
    fn test_discover_skips_tagged_and_existing_outputs() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("b.mov"), b"x").unwrap();
        std::fs::write(dir.path().join("c_edited.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        // artifact from a prior run makes b.mov already done
        std::fs::write(dir.path().join("b_edited.mp4"), b"x").unwrap();

        let mut summary = BatchSummary::default();
        let pending = discover(dir.path(), dir.path(), &mut summary).unwrap();

        assert_eq!(pending, vec![dir.path().join("a.mp4")]);
        // c_edited.mp4 by tag, b.mov by existing artifact; b_edited.mp4 by tag
        assert_eq!(summary.skipped, 3);
    }

    #[test]
    fn test_discover_single_file_input() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("solo.mp4");
        std::fs::write(&file, b"x").unwrap();

        let mut summary = BatchSummary::default();
        let pending = discover(&file, dir.path(), &mut summary).unwrap();
        assert_eq!(pending, vec![file]);
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn test_validate_rejects_missing_music() {
        let dir = tempdir().unwrap();
        let mut req = request(dir.path());
        req.music = Some(dir.path().join("absent.mp3"));
        assert!(matches!(validate(&req), Err(JobError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_non_positive_volume() {
        let dir = tempdir().unwrap();
        let music = dir.path().join("music.mp3");
        std::fs::write(&music, b"x").unwrap();
        let mut req = request(dir.path());
        req.music = Some(music);
        req.music_volume = 0.0;
        assert!(matches!(validate(&req), Err(JobError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_batch_isolates_job_failure() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("bad.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("good.mp4"), b"x").unwrap();

        let mut media = MockMediaRunner::new();
        // discovery sorts, so bad.mp4 runs first and fails at probe
        media
            .expect_run_probe()
            .times(2)
            .returning(|path| {
                let fail = path.to_string_lossy().contains("bad");
                Box::pin(async move {
                    if fail {
                        mock_output("", false)
                    } else {
                        mock_output(&probe_json(), true)
                    }
                })
            });
        // only the surviving job reaches captioning and burn
        media.expect_run_extract_audio().times(1).returning(|_, wav| {
            std::fs::write(wav, b"riff").unwrap();
            Box::pin(async move { mock_output("", true) })
        });
        media
            .expect_run_burn_subtitles()
            .times(1)
            .returning(|_, _, _, _, _, out| {
                std::fs::write(out, b"burned").unwrap();
                Box::pin(async move { mock_output("", true) })
            });

        let mut stt = MockTranscriber::new();
        stt.expect_transcribe()
            .times(1)
            .returning(|_, _, _| Box::pin(async move { Ok(Vec::new()) }));

        let service = BatchService::new(PipelineService::new(media, stt, 20));
        let summary = service
            .run(&request(dir.path()), &layout(dir.path()), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(summary.done, 1);
        assert_eq!(summary.failed, 1);
        assert!(dir.path().join("good_edited.mp4").is_file());
        assert!(!dir.path().join("bad_edited.mp4").exists());
    }

    #[tokio::test]
    async fn test_rerun_schedules_nothing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("clip_edited.mp4"), b"x").unwrap();

        // no engine expectations: a second run must start zero jobs
        let media = MockMediaRunner::new();
        let stt = MockTranscriber::new();
        let service = BatchService::new(PipelineService::new(media, stt, 20));

        let summary = service
            .run(&request(dir.path()), &layout(dir.path()), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(summary.done, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_cancelled_batch_starts_no_jobs() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"x").unwrap();

        let media = MockMediaRunner::new();
        let stt = MockTranscriber::new();
        let service = BatchService::new(PipelineService::new(media, stt, 20));

        let cancel = CancelToken::new();
        cancel.cancel();
        let summary = service
            .run(&request(dir.path()), &layout(dir.path()), &cancel)
            .await
            .unwrap();
        assert_eq!(summary.done, 0);
        assert_eq!(summary.failed, 0);
    }
}
