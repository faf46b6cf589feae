use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use capburn::adapters::ffmpeg::FfmpegEngine;
use capburn::adapters::whisper::WhisperSidecar;
use capburn::{
    BatchRequest, BatchService, CancelToken, Config, OutputLayout, PipelineService,
};

/// Burn word-timed captions into every video in a directory.
#[derive(Debug, Parser)]
#[command(name = "capburn", version, about)]
struct Cli {
    /// Directory of videos to process, or a single video file
    input: PathBuf,

    /// Whisper model size (tiny, base, small, medium, large)
    #[arg(long, default_value = "small")]
    model: String,

    /// Spoken language; auto-detected when omitted
    #[arg(long)]
    language: Option<String>,

    /// Background music blended under the original audio
    #[arg(long)]
    music: Option<PathBuf>,

    /// Volume multiplier for the background music
    #[arg(long, default_value_t = 0.3)]
    music_volume: f64,

    /// Video appended after the captioned timeline
    #[arg(long)]
    end_card: Option<PathBuf>,

    /// Where final artifacts land; beside the sources when omitted
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Where caption tracks persist; `<output>/transcriptions` when omitted
    #[arg(long)]
    captions_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let output_root = cli
        .output_dir
        .or(config.output_dir)
        .unwrap_or_else(|| default_output_root(&cli.input));
    let captions_dir = cli
        .captions_dir
        .or(config.captions_dir)
        .unwrap_or_else(|| output_root.join("transcriptions"));
    let layout = OutputLayout {
        work_root: output_root.join(".capburn"),
        output_root,
        captions_dir,
    };

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, finishing current stage then stopping");
                cancel.cancel();
            }
        });
    }

    let engine = FfmpegEngine::new(config.ffmpeg_path, config.ffprobe_path);
    let transcriber = WhisperSidecar::new(config.whisper_path, config.model_dir);
    let batch = BatchService::new(PipelineService::new(engine, transcriber, config.max_chars));

    let request = BatchRequest {
        input: cli.input,
        model: cli.model,
        language: cli.language,
        music: cli.music,
        music_volume: cli.music_volume,
        end_card: cli.end_card,
    };

    match batch.run(&request, &layout, &cancel).await {
        Ok(summary) => {
            info!(
                "batch finished: {} done, {} skipped, {} failed",
                summary.done, summary.skipped, summary.failed
            );
            if summary.failed > 0 {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("batch aborted: {}", e);
            ExitCode::from(1)
        }
    }
}

fn default_output_root(input: &Path) -> PathBuf {
    if input.is_file() {
        input
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        input.to_path_buf()
    }
}
