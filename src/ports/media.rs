use std::io;
use std::path::Path;
use std::process::Output;

use async_trait::async_trait;

/// Media engine operations, executed by an external ffmpeg/ffprobe install.
///
/// Each method runs one declarative operation and returns the raw process
/// output; interpretation (exit status, stdout parsing) happens in the
/// caller. Codecs are never implemented here.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait MediaRunner: Send + Sync {
    /// ffprobe the container: streams + format as JSON on stdout.
    async fn run_probe(&self, path: &Path) -> io::Result<Output>;

    /// Extract the audio track as 16 kHz mono WAV for transcription.
    async fn run_extract_audio(&self, src: &Path, wav_out: &Path) -> io::Result<Output>;

    /// Mix the source's audio with a looped auxiliary stream at `gain`,
    /// producing an audio-only file at the source audio's duration.
    async fn run_mix_audio(
        &self,
        src: &Path,
        aux: &Path,
        gain: f64,
        out: &Path,
    ) -> io::Result<Output>;

    /// Burn the subtitle document into the video at the declared canvas
    /// size. With `mixed_audio`, the mixed stream replaces the original;
    /// otherwise the original audio is stream-copied untouched.
    async fn run_burn_subtitles(
        &self,
        src: &Path,
        track: &Path,
        canvas_width: u32,
        canvas_height: u32,
        mixed_audio: Option<&Path>,
        out: &Path,
    ) -> io::Result<Output>;

    /// Conform a clip for concatenation: inject a silent audio track if the
    /// clip has none and scale to the caption canvas dimensions.
    async fn run_prepare_end_card(
        &self,
        card: &Path,
        width: u32,
        height: u32,
        out: &Path,
    ) -> io::Result<Output>;

    /// Frame-accurate concatenation of two format-reconciled clips.
    async fn run_concat(&self, first: &Path, second: &Path, out: &Path) -> io::Result<Output>;
}
