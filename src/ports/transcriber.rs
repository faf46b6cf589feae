use std::path::Path;

use async_trait::async_trait;

use crate::domain::error::JobError;
use crate::domain::transcript::TranscriptSegment;

/// Speech-to-text collaborator: audio in, ordered timed segments out.
///
/// The engine is a black box; cue granularity is whatever it emits
/// (word timings are optional). An empty result is valid — it means no
/// speech was detected, not that the engine failed.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        wav: &Path,
        model: &str,
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>, JobError>;
}
