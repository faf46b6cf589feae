//! Capburn - Batch Caption Burn-in Library
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (frames, transcripts, captions, jobs)
//! - ports/: Trait definitions (media engine, transcriber)
//! - adapters/: Concrete implementations (ffmpeg, whisper-cli)
//! - application/: Generic services (pipeline, batch orchestrator)
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports for convenience
pub use application::orchestrator::{BatchRequest, BatchService};
pub use application::pipeline::{CancelToken, OutputLayout, PipelineService};
pub use config::Config;
pub use domain::jobs::BatchSummary;
