use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command as TokioCommand;

use crate::ports::media::MediaRunner;

/// ffmpeg/ffprobe invoker with explicitly configured executable paths.
///
/// The paths are resolved once at startup and passed in here; nothing in
/// the process mutates PATH or the working directory to locate binaries.
pub struct FfmpegEngine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegEngine {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }
}

/// Subtitle filter argument. The path lands inside a filter expression, so
/// colons (drive letters, mostly) must be escaped and the whole path quoted.
fn ass_filter_arg(track: &Path, canvas_width: u32, canvas_height: u32) -> String {
    let escaped = track.to_string_lossy().replace(':', "\\:");
    format!(
        "ass='{}':original_size={}x{}",
        escaped, canvas_width, canvas_height
    )
}

/// amix graph: auxiliary stream attenuated then mixed under the original.
/// `duration=first` pins the output to the original audio's length; the
/// auxiliary input is looped upstream, so it is truncated rather than
/// padding the mix.
fn mix_filter(gain: f64) -> String {
    format!(
        "[1:a]volume={}[bg];[0:a][bg]amix=inputs=2:duration=first:normalize=0[aout]",
        gain
    )
}

#[async_trait]
impl MediaRunner for FfmpegEngine {
    async fn run_probe(&self, path: &Path) -> io::Result<Output> {
        TokioCommand::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_format")
            .arg("-show_streams")
            .arg("-print_format")
            .arg("json")
            .arg(path)
            .output()
            .await
    }

    async fn run_extract_audio(&self, src: &Path, wav_out: &Path) -> io::Result<Output> {
        TokioCommand::new(&self.ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(src)
            .arg("-vn")
            .arg("-ac")
            .arg("1")
            .arg("-ar")
            .arg("16000")
            .arg("-c:a")
            .arg("pcm_s16le")
            .arg(wav_out)
            .output()
            .await
    }

    async fn run_mix_audio(
        &self,
        src: &Path,
        aux: &Path,
        gain: f64,
        out: &Path,
    ) -> io::Result<Output> {
        TokioCommand::new(&self.ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(src)
            .arg("-stream_loop")
            .arg("-1")
            .arg("-i")
            .arg(aux)
            .arg("-filter_complex")
            .arg(mix_filter(gain))
            .arg("-map")
            .arg("[aout]")
            .arg("-vn")
            .arg("-c:a")
            .arg("aac")
            .arg("-b:a")
            .arg("192k")
            .arg(out)
            .output()
            .await
    }

    async fn run_burn_subtitles(
        &self,
        src: &Path,
        track: &Path,
        canvas_width: u32,
        canvas_height: u32,
        mixed_audio: Option<&Path>,
        out: &Path,
    ) -> io::Result<Output> {
        let mut command = TokioCommand::new(&self.ffmpeg);
        command.arg("-y").arg("-i").arg(src);

        if let Some(mixed) = mixed_audio {
            command.arg("-i").arg(mixed);
        }

        command
            .arg("-vf")
            .arg(ass_filter_arg(track, canvas_width, canvas_height))
            .arg("-map")
            .arg("0:v");

        if mixed_audio.is_some() {
            command.arg("-map").arg("1:a");
        } else {
            // optional map keeps audio-less sources working; copy keeps the
            // passthrough stream bit-identical
            command.arg("-map").arg("0:a?");
        }

        command
            .arg("-c:v")
            .arg("libx264")
            .arg("-c:a")
            .arg("copy")
            .arg(out)
            .output()
            .await
    }

    async fn run_prepare_end_card(
        &self,
        card: &Path,
        width: u32,
        height: u32,
        out: &Path,
    ) -> io::Result<Output> {
        TokioCommand::new(&self.ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(card)
            .arg("-f")
            .arg("lavfi")
            .arg("-i")
            .arg("anullsrc=channel_layout=stereo:sample_rate=48000")
            .arg("-shortest")
            .arg("-vf")
            .arg(format!("scale={}:{}", width, height))
            .arg("-c:v")
            .arg("libx264")
            .arg("-c:a")
            .arg("aac")
            .arg(out)
            .output()
            .await
    }

    async fn run_concat(&self, first: &Path, second: &Path, out: &Path) -> io::Result<Output> {
        TokioCommand::new(&self.ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(first)
            .arg("-i")
            .arg(second)
            .arg("-filter_complex")
            .arg("[0:v][0:a][1:v][1:a]concat=n=2:v=1:a=1[v][a]")
            .arg("-map")
            .arg("[v]")
            .arg("-map")
            .arg("[a]")
            .arg("-movflags")
            .arg("+faststart")
            .arg(out)
            .output()
            .await
    }
}
