use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::domain::captions::{CaptionStyle, CaptionTrack};
use crate::domain::error::{JobError, Stage};
use crate::domain::frame::parse_source_info;
use crate::domain::jobs::{self, PipelineJob};
use crate::domain::transcript::shape_cues;
use crate::ports::media::MediaRunner;
use crate::ports::transcriber::Transcriber;

/// Cooperative cancellation flag, checked between pipeline stages and
/// between jobs. A long-running engine invocation is never interrupted
/// mid-stage.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Filesystem layout for one batch run.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    /// Where final artifacts land
    pub output_root: PathBuf,
    /// Where caption tracks persist (retained across runs)
    pub captions_dir: PathBuf,
    /// Transient directory; per-job subdirectories live underneath
    pub work_root: PathBuf,
}

/// Per-job scratch directory, removed on every exit path (including
/// failure and panic) via `Drop`. Scoped by source stem + job id so
/// concurrent runs cannot collide.
struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    fn create(root: &Path, job: &PipelineJob) -> Result<Self, JobError> {
        let tag: String = job.id.chars().take(8).collect();
        let path = root.join(format!("{}-{}", job.stem(), tag));
        std::fs::create_dir_all(&path).map_err(|e| JobError::Input {
            path: path.clone(),
            reason: format!("cannot create work directory: {}", e),
        })?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("failed to clean work directory {:?}: {}", self.path, e);
            }
        }
    }
}

/// Runs one job through the fixed stage order: probe, captioning,
/// optional mixing, compositing, optional end-card append.
pub struct PipelineService<M, T> {
    engine: M,
    transcriber: T,
    max_chars: usize,
}

impl<M, T> PipelineService<M, T>
where
    M: MediaRunner,
    T: Transcriber,
{
    pub fn new(engine: M, transcriber: T, max_chars: usize) -> Self {
        Self {
            engine,
            transcriber,
            max_chars,
        }
    }

    /// Run a job to completion, returning the final artifact path.
    ///
    /// On failure the caption track (if already persisted) and any
    /// previously completed jobs' outputs are left intact; everything in
    /// the job's work directory is removed.
    pub async fn run(
        &self,
        job: &PipelineJob,
        layout: &OutputLayout,
        cancel: &CancelToken,
    ) -> Result<PathBuf, JobError> {
        if !job.source.is_file() {
            return Err(JobError::Input {
                path: job.source.clone(),
                reason: "source file not found".to_string(),
            });
        }

        let final_path = jobs::output_path(&job.source, &layout.output_root);
        let work = WorkDir::create(&layout.work_root, job)?;

        // probe: resolve the visual frame once, up front
        let probe_out = engine_output(
            Stage::Probe,
            self.engine.run_probe(&job.source).await,
        )?;
        let probe: Value = serde_json::from_slice(&probe_out.stdout).map_err(|e| {
            JobError::Input {
                path: job.source.clone(),
                reason: format!("unreadable probe metadata: {}", e),
            }
        })?;
        let info = parse_source_info(&probe, &job.source)?;
        let frame = info.visual_frame();
        info!(
            "{}: stored {}x{}, rotation {:?}, visual {}x{}",
            job.stem(),
            info.width,
            info.height,
            info.rotation,
            frame.width,
            frame.height
        );

        ensure_not_cancelled(cancel, Stage::Captioning)?;

        // captioning: persist the track before any compositing starts
        let track_path = jobs::caption_path(&job.source, &layout.captions_dir);
        let track = if track_path.is_file() {
            info!("{}: reusing caption track {:?}", job.stem(), track_path);
            CaptionTrack::load(&track_path)
                .await
                .map_err(|reason| JobError::Input {
                    path: track_path.clone(),
                    reason,
                })?
        } else {
            let track = self.build_track(job, &info, frame, work.path()).await?;
            track
                .write_to(&track_path)
                .await
                .map_err(|e| JobError::Input {
                    path: track_path.clone(),
                    reason: format!("cannot write caption track: {}", e),
                })?;
            info!(
                "{}: wrote {} cue(s) to {:?}",
                job.stem(),
                track.cues.len(),
                track_path
            );
            track
        };
        let (canvas_w, canvas_h) = track.canvas();

        ensure_not_cancelled(cancel, Stage::Mixing)?;

        // mixing: optional, audio-only intermediate in the work dir
        let mixed = match &job.mix {
            Some(mix) => {
                if !info.has_audio {
                    return Err(JobError::engine(
                        Stage::Mixing,
                        "source has no audio stream to mix into",
                    ));
                }
                let out = work.path().join("mixed.m4a");
                let result = self
                    .engine
                    .run_mix_audio(&job.source, &mix.source, mix.gain, &out)
                    .await;
                engine_output(Stage::Mixing, result)?;
                Some(out)
            }
            None => None,
        };

        ensure_not_cancelled(cancel, Stage::Compositing)?;

        // compositing: burn at the track's declared canvas size
        let burned = work.path().join(format!("{}_captioned.mp4", job.stem()));
        let result = self
            .engine
            .run_burn_subtitles(
                &job.source,
                &track_path,
                canvas_w,
                canvas_h,
                mixed.as_deref(),
                &burned,
            )
            .await;
        engine_output(Stage::Compositing, result)?;
        if !burned.is_file() {
            return Err(JobError::engine(
                Stage::Compositing,
                "engine reported success but produced no output",
            ));
        }

        // end card: conform, then frame-accurate concat. The burned clip has
        // visual dimensions (the encoder autorotates flagged input), so the
        // card is scaled to the canvas, never to the stored frame buffer.
        let assembled = match &job.end_card {
            Some(card) => {
                ensure_not_cancelled(cancel, Stage::EndCard)?;

                // concat needs an audio stream on both inputs; a clip burned
                // from a silent source has none, so conform it like the card
                let first = if info.has_audio {
                    burned
                } else {
                    let silenced = work.path().join(format!("{}_silenced.mp4", job.stem()));
                    let result = self
                        .engine
                        .run_prepare_end_card(&burned, canvas_w, canvas_h, &silenced)
                        .await;
                    engine_output(Stage::EndCard, result)?;
                    silenced
                };

                let prepared = work.path().join("endcard_conformed.mp4");
                let result = self
                    .engine
                    .run_prepare_end_card(card, canvas_w, canvas_h, &prepared)
                    .await;
                engine_output(Stage::EndCard, result)?;

                let concatenated = work.path().join(format!("{}_timeline.mp4", job.stem()));
                let result = self
                    .engine
                    .run_concat(&first, &prepared, &concatenated)
                    .await;
                engine_output(Stage::EndCard, result)?;
                concatenated
            }
            None => burned,
        };

        persist(&assembled, &final_path).await?;
        Ok(final_path)
    }

    async fn build_track(
        &self,
        job: &PipelineJob,
        info: &crate::domain::frame::SourceInfo,
        frame: crate::domain::frame::VisualFrame,
        work_dir: &Path,
    ) -> Result<CaptionTrack, JobError> {
        let segments = if info.has_audio {
            let wav = work_dir.join(format!("{}.wav", job.stem()));
            let result = self.engine.run_extract_audio(&job.source, &wav).await;
            engine_output(Stage::ExtractAudio, result)?;
            self.transcriber
                .transcribe(&wav, &job.model, job.language.as_deref())
                .await?
        } else {
            info!("{}: no audio stream, writing empty caption track", job.stem());
            Vec::new()
        };

        let lines = shape_cues(&segments, self.max_chars);
        Ok(CaptionTrack::from_lines(
            CaptionStyle::default_for_frame(frame),
            lines,
        ))
    }
}

fn ensure_not_cancelled(cancel: &CancelToken, stage: Stage) -> Result<(), JobError> {
    if cancel.is_cancelled() {
        Err(JobError::Cancelled(stage))
    } else {
        Ok(())
    }
}

/// Interpret one engine invocation: spawn errors and non-zero exits both
/// become stage-tagged media engine errors.
fn engine_output(stage: Stage, result: io::Result<Output>) -> Result<Output, JobError> {
    let output = result.map_err(|e| JobError::engine(stage, e.to_string()))?;
    if !output.status.success() {
        return Err(JobError::from_output(stage, &output));
    }
    Ok(output)
}

/// Move the assembled artifact to its final path. The work directory may
/// sit on another filesystem, so fall back to a copy when rename fails.
async fn persist(tmp: &Path, dest: &Path) -> Result<(), JobError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| JobError::Input {
                path: dest.to_path_buf(),
                reason: format!("cannot create output directory: {}", e),
            })?;
    }
    if tokio::fs::rename(tmp, dest).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(tmp, dest)
        .await
        .map_err(|e| JobError::Input {
            path: dest.to_path_buf(),
            reason: format!("cannot write final artifact: {}", e),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::MixSpec;
    use crate::ports::media::MockMediaRunner;
    use crate::ports::transcriber::MockTranscriber;
    use crate::domain::transcript::{TranscriptSegment, WordSpan};
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;
    use tempfile::tempdir;

    fn mock_output(stdout: &str, stderr: &str, success: bool) -> io::Result<Output> {
        Ok(Output {
            status: if success {
                ExitStatus::from_raw(0)
            } else {
                ExitStatus::from_raw(256)
            },
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        })
    }

    fn probe_json(width: u32, height: u32, rotation: Option<i64>, has_audio: bool) -> String {
        let mut video = serde_json::json!({
            "codec_type": "video",
            "width": width,
            "height": height,
        });
        if let Some(r) = rotation {
            video["side_data_list"] = serde_json::json!([
                { "side_data_type": "Display Matrix", "rotation": r }
            ]);
        }
        let mut streams = vec![video];
        if has_audio {
            streams.push(serde_json::json!({ "codec_type": "audio", "codec_name": "aac" }));
        }
        serde_json::json!({
            "streams": streams,
            "format": { "duration": "10.000000" }
        })
        .to_string()
    }

    fn one_segment() -> Vec<TranscriptSegment> {
        vec![TranscriptSegment {
            start: 0.0,
            end: 2.0,
            text: "hello world".to_string(),
            words: vec![
                WordSpan { word: "hello".into(), start: 0.0, end: 1.0 },
                WordSpan { word: "world".into(), start: 1.0, end: 2.0 },
            ],
        }]
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        source: PathBuf,
        layout: OutputLayout,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"fake video").unwrap();
        let layout = OutputLayout {
            output_root: dir.path().to_path_buf(),
            captions_dir: dir.path().join("transcriptions"),
            work_root: dir.path().join(".capburn"),
        };
        Fixture {
            _dir: dir,
            source,
            layout,
        }
    }

    fn job(source: &Path) -> PipelineJob {
        PipelineJob::new(source.to_path_buf(), None, None, "small".into(), None)
    }

    fn expect_probe(mock: &mut MockMediaRunner, json: String) {
        mock.expect_run_probe()
            .times(1)
            .returning(move |_| {
                let json = json.clone();
                Box::pin(async move { mock_output(&json, "", true) })
            });
    }

    fn expect_extract(mock: &mut MockMediaRunner) {
        mock.expect_run_extract_audio()
            .times(1)
            .returning(|_, wav| {
                std::fs::write(wav, b"riff").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });
    }

    #[tokio::test]
    async fn test_passthrough_happy_path() {
        let fx = fixture();
        let mut media = MockMediaRunner::new();
        expect_probe(&mut media, probe_json(1080, 1920, None, true));
        expect_extract(&mut media);
        media
            .expect_run_burn_subtitles()
            .withf(|_, _, w, h, mixed, _| *w == 1080 && *h == 1920 && mixed.is_none())
            .times(1)
            .returning(|_, _, _, _, _, out| {
                std::fs::write(out, b"burned").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });

        let mut stt = MockTranscriber::new();
        stt.expect_transcribe()
            .times(1)
            .returning(|_, _, _| Box::pin(async move { Ok(one_segment()) }));

        let service = PipelineService::new(media, stt, 20);
        let job = job(&fx.source);
        let final_path = service
            .run(&job, &fx.layout, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(final_path, fx.layout.output_root.join("clip_edited.mp4"));
        assert!(final_path.is_file());
        assert!(fx.layout.captions_dir.join("clip.ass").is_file());
        // per-job work directories are gone
        let leftovers: Vec<_> = std::fs::read_dir(&fx.layout.work_root)
            .map(|d| d.collect())
            .unwrap_or_default();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_rotated_source_uses_visual_canvas() {
        let fx = fixture();
        let mut media = MockMediaRunner::new();
        // stored landscape, rotated 90: captions must use the 1080x1920 canvas
        expect_probe(&mut media, probe_json(1920, 1080, Some(-90), true));
        expect_extract(&mut media);
        media
            .expect_run_burn_subtitles()
            .withf(|_, _, w, h, _, _| *w == 1080 && *h == 1920)
            .times(1)
            .returning(|_, _, _, _, _, out| {
                std::fs::write(out, b"burned").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });

        let mut stt = MockTranscriber::new();
        stt.expect_transcribe()
            .times(1)
            .returning(|_, _, _| Box::pin(async move { Ok(one_segment()) }));

        let service = PipelineService::new(media, stt, 20);
        service
            .run(&job(&fx.source), &fx.layout, &CancelToken::new())
            .await
            .unwrap();

        let track = CaptionTrack::load(&fx.layout.captions_dir.join("clip.ass"))
            .await
            .unwrap();
        assert_eq!(track.canvas(), (1080, 1920));
        assert_eq!(track.style.margin_v, 640);
    }

    #[tokio::test]
    async fn test_mixed_audio_replaces_passthrough() {
        let fx = fixture();
        let music = fx.source.parent().unwrap().join("music.mp3");
        std::fs::write(&music, b"mp3").unwrap();

        let mut media = MockMediaRunner::new();
        expect_probe(&mut media, probe_json(1080, 1920, None, true));
        expect_extract(&mut media);
        media
            .expect_run_mix_audio()
            .withf(|_, _, gain, _| (*gain - 0.3).abs() < 1e-9)
            .times(1)
            .returning(|_, _, _, out| {
                std::fs::write(out, b"mixed").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });
        media
            .expect_run_burn_subtitles()
            .withf(|_, _, _, _, mixed, _| mixed.is_some())
            .times(1)
            .returning(|_, _, _, _, _, out| {
                std::fs::write(out, b"burned").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });

        let mut stt = MockTranscriber::new();
        stt.expect_transcribe()
            .times(1)
            .returning(|_, _, _| Box::pin(async move { Ok(one_segment()) }));

        let service = PipelineService::new(media, stt, 20);
        let job = PipelineJob::new(
            fx.source.clone(),
            Some(MixSpec { source: music, gain: 0.3 }),
            None,
            "small".into(),
            None,
        );
        service.run(&job, &fx.layout, &CancelToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_compositor_failure_retains_caption_track() {
        let fx = fixture();
        let mut media = MockMediaRunner::new();
        expect_probe(&mut media, probe_json(1080, 1920, None, true));
        expect_extract(&mut media);
        media
            .expect_run_burn_subtitles()
            .times(1)
            .returning(|_, _, _, _, _, _| {
                Box::pin(async move { mock_output("", "subtitle filter blew up", false) })
            });

        let mut stt = MockTranscriber::new();
        stt.expect_transcribe()
            .times(1)
            .returning(|_, _, _| Box::pin(async move { Ok(one_segment()) }));

        let service = PipelineService::new(media, stt, 20);
        let result = service
            .run(&job(&fx.source), &fx.layout, &CancelToken::new())
            .await;

        match result {
            Err(JobError::MediaEngine { stage, detail }) => {
                assert_eq!(stage, Stage::Compositing);
                assert!(detail.contains("subtitle filter blew up"));
            }
            other => panic!("expected compositing failure, got {:?}", other),
        }
        // the track survives for diagnosis / re-render
        assert!(fx.layout.captions_dir.join("clip.ass").is_file());
        // no final artifact carries the output marker
        assert!(!fx.layout.output_root.join("clip_edited.mp4").exists());
    }

    #[tokio::test]
    async fn test_empty_transcript_still_burns() {
        let fx = fixture();
        let mut media = MockMediaRunner::new();
        expect_probe(&mut media, probe_json(1080, 1920, None, true));
        expect_extract(&mut media);
        media
            .expect_run_burn_subtitles()
            .times(1)
            .returning(|_, _, _, _, _, out| {
                std::fs::write(out, b"burned").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });

        let mut stt = MockTranscriber::new();
        stt.expect_transcribe()
            .times(1)
            .returning(|_, _, _| Box::pin(async move { Ok(Vec::new()) }));

        let service = PipelineService::new(media, stt, 20);
        service
            .run(&job(&fx.source), &fx.layout, &CancelToken::new())
            .await
            .unwrap();

        let track = CaptionTrack::load(&fx.layout.captions_dir.join("clip.ass"))
            .await
            .unwrap();
        assert!(track.cues.is_empty());
        assert!(fx.layout.output_root.join("clip_edited.mp4").is_file());
    }

    #[tokio::test]
    async fn test_existing_track_skips_transcription() {
        let fx = fixture();

        // pre-existing track from an earlier run
        let style = CaptionStyle::default_for_frame(crate::domain::frame::VisualFrame {
            width: 1080,
            height: 1920,
        });
        let track = CaptionTrack { style, cues: vec![] };
        let track_path = fx.layout.captions_dir.join("clip.ass");
        track.write_to(&track_path).await.unwrap();

        let mut media = MockMediaRunner::new();
        expect_probe(&mut media, probe_json(1080, 1920, None, true));
        // no extract expectation: reuse must not touch the audio
        media
            .expect_run_burn_subtitles()
            .withf(|_, _, w, h, _, _| *w == 1080 && *h == 1920)
            .times(1)
            .returning(|_, _, _, _, _, out| {
                std::fs::write(out, b"burned").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });

        // transcriber must never run
        let stt = MockTranscriber::new();

        let service = PipelineService::new(media, stt, 20);
        service
            .run(&job(&fx.source), &fx.layout, &CancelToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_silent_source_writes_empty_track_without_transcribing() {
        let fx = fixture();
        let mut media = MockMediaRunner::new();
        expect_probe(&mut media, probe_json(1080, 1920, None, false));
        media
            .expect_run_burn_subtitles()
            .times(1)
            .returning(|_, _, _, _, _, out| {
                std::fs::write(out, b"burned").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });

        let stt = MockTranscriber::new();
        let service = PipelineService::new(media, stt, 20);
        service
            .run(&job(&fx.source), &fx.layout, &CancelToken::new())
            .await
            .unwrap();
        assert!(fx.layout.captions_dir.join("clip.ass").is_file());
    }

    #[tokio::test]
    async fn test_end_card_is_prepared_and_concatenated() {
        let fx = fixture();
        let card = fx.source.parent().unwrap().join("endcard.mp4");
        std::fs::write(&card, b"card").unwrap();

        let mut media = MockMediaRunner::new();
        expect_probe(&mut media, probe_json(1080, 1920, None, true));
        expect_extract(&mut media);
        media
            .expect_run_burn_subtitles()
            .times(1)
            .returning(|_, _, _, _, _, out| {
                std::fs::write(out, b"burned").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });
        media
            .expect_run_prepare_end_card()
            .withf(|_, w, h, _| *w == 1080 && *h == 1920)
            .times(1)
            .returning(|_, _, _, out| {
                std::fs::write(out, b"conformed").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });
        media
            .expect_run_concat()
            .times(1)
            .returning(|_, _, out| {
                std::fs::write(out, b"joined").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });

        let mut stt = MockTranscriber::new();
        stt.expect_transcribe()
            .times(1)
            .returning(|_, _, _| Box::pin(async move { Ok(one_segment()) }));

        let service = PipelineService::new(media, stt, 20);
        let job = PipelineJob::new(
            fx.source.clone(),
            None,
            Some(card),
            "small".into(),
            None,
        );
        let final_path = service
            .run(&job, &fx.layout, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(
            std::fs::read(&final_path).unwrap(),
            b"joined".to_vec()
        );
    }

    #[tokio::test]
    async fn test_end_card_conforms_to_visual_canvas_of_rotated_source() {
        let fx = fixture();
        let card = fx.source.parent().unwrap().join("endcard.mp4");
        std::fs::write(&card, b"card").unwrap();

        let mut media = MockMediaRunner::new();
        // stored landscape, rotated 90: the burned clip comes out 1080x1920,
        // so the card must be scaled to that, not to the stored 1920x1080
        expect_probe(&mut media, probe_json(1920, 1080, Some(-90), true));
        expect_extract(&mut media);
        media
            .expect_run_burn_subtitles()
            .times(1)
            .returning(|_, _, _, _, _, out| {
                std::fs::write(out, b"burned").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });
        media
            .expect_run_prepare_end_card()
            .withf(|_, w, h, _| *w == 1080 && *h == 1920)
            .times(1)
            .returning(|_, _, _, out| {
                std::fs::write(out, b"conformed").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });
        media
            .expect_run_concat()
            .times(1)
            .returning(|_, _, out| {
                std::fs::write(out, b"joined").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });

        let mut stt = MockTranscriber::new();
        stt.expect_transcribe()
            .times(1)
            .returning(|_, _, _| Box::pin(async move { Ok(one_segment()) }));

        let service = PipelineService::new(media, stt, 20);
        let job = PipelineJob::new(
            fx.source.clone(),
            None,
            Some(card),
            "small".into(),
            None,
        );
        service.run(&job, &fx.layout, &CancelToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_source_with_end_card_gets_silent_track_before_concat() {
        let fx = fixture();
        let card = fx.source.parent().unwrap().join("endcard.mp4");
        std::fs::write(&card, b"card").unwrap();

        let mut media = MockMediaRunner::new();
        expect_probe(&mut media, probe_json(1080, 1920, None, false));
        media
            .expect_run_burn_subtitles()
            .times(1)
            .returning(|_, _, _, _, _, out| {
                std::fs::write(out, b"burned").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });
        // conformed twice: the audio-less burned clip, then the card
        media
            .expect_run_prepare_end_card()
            .withf(|_, w, h, _| *w == 1080 && *h == 1920)
            .times(2)
            .returning(|_, _, _, out| {
                std::fs::write(out, b"conformed").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });
        media
            .expect_run_concat()
            .withf(|first, _, _| {
                first.to_string_lossy().ends_with("_silenced.mp4")
            })
            .times(1)
            .returning(|_, _, out| {
                std::fs::write(out, b"joined").unwrap();
                Box::pin(async move { mock_output("", "", true) })
            });

        let stt = MockTranscriber::new();
        let service = PipelineService::new(media, stt, 20);
        let job = PipelineJob::new(
            fx.source.clone(),
            None,
            Some(card),
            "small".into(),
            None,
        );
        let final_path = service
            .run(&job, &fx.layout, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(std::fs::read(&final_path).unwrap(), b"joined".to_vec());
    }

    #[tokio::test]
    async fn test_cancellation_between_stages() {
        let fx = fixture();
        let mut media = MockMediaRunner::new();
        expect_probe(&mut media, probe_json(1080, 1920, None, true));

        let stt = MockTranscriber::new();
        let service = PipelineService::new(media, stt, 20);

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = service.run(&job(&fx.source), &fx.layout, &cancel).await;
        assert!(matches!(result, Err(JobError::Cancelled(_))));
        // cleanup ran even on the cancel path
        let leftovers: Vec<_> = std::fs::read_dir(&fx.layout.work_root)
            .map(|d| d.collect())
            .unwrap_or_default();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_is_input_error() {
        let fx = fixture();
        let media = MockMediaRunner::new();
        let stt = MockTranscriber::new();
        let service = PipelineService::new(media, stt, 20);

        let job = PipelineJob::new(
            fx.source.parent().unwrap().join("nope.mp4"),
            None,
            None,
            "small".into(),
            None,
        );
        let result = service.run(&job, &fx.layout, &CancelToken::new()).await;
        assert!(matches!(result, Err(JobError::Input { .. })));
    }
}
