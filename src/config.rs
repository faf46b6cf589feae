//! Environment configuration.

use std::env;
use std::path::PathBuf;

/// Process-level configuration, loaded once at startup.
///
/// Engine executables are explicit paths handed to the adapters; nothing
/// downstream consults PATH or mutates ambient process state to find them.
#[derive(Clone, Debug)]
pub struct Config {
    /// ffmpeg executable
    pub ffmpeg_path: PathBuf,
    /// ffprobe executable
    pub ffprobe_path: PathBuf,
    /// whisper-cli executable
    pub whisper_path: PathBuf,
    /// Directory holding ggml-<model>.bin files
    pub model_dir: PathBuf,
    /// Output root for final artifacts; beside each source when unset
    pub output_dir: Option<PathBuf>,
    /// Caption track directory; `<output root>/transcriptions` when unset
    pub captions_dir: Option<PathBuf>,
    /// Maximum characters per caption cue
    pub max_chars: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            ffmpeg_path: PathBuf::from(
                env::var("CAPBURN_FFMPEG").unwrap_or_else(|_| String::from("ffmpeg")),
            ),
            ffprobe_path: PathBuf::from(
                env::var("CAPBURN_FFPROBE").unwrap_or_else(|_| String::from("ffprobe")),
            ),
            whisper_path: PathBuf::from(
                env::var("CAPBURN_WHISPER").unwrap_or_else(|_| String::from("whisper-cli")),
            ),
            model_dir: PathBuf::from(
                env::var("CAPBURN_MODEL_DIR").unwrap_or_else(|_| String::from("models")),
            ),
            output_dir: env::var("CAPBURN_OUTPUT_DIR").ok().map(PathBuf::from),
            captions_dir: env::var("CAPBURN_CAPTIONS_DIR").ok().map(PathBuf::from),
            max_chars: env::var("CAPBURN_MAX_CHARS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
        }
    }
}
