use serde_json::Value;

use crate::domain::error::JobError;

/// Stored stream metadata for a source video, as reported by ffprobe.
///
/// `width`/`height` are the encoded frame-buffer dimensions; `rotation` is
/// the container's display rotation in degrees, if any. Rendering ignores
/// the rotation flag when laying out subtitle geometry, so callers must go
/// through [`VisualFrame::from_stored`] before making geometric decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub rotation: Option<i64>,
    pub duration: Option<f64>,
    pub has_audio: bool,
}

/// The effective on-screen dimensions once rotation metadata is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualFrame {
    pub width: u32,
    pub height: u32,
}

impl VisualFrame {
    /// Resolve the visual frame from stored dimensions and rotation.
    ///
    /// Rotations of 90 or 270 degrees (after normalization, so -90 counts
    /// as 270) swap width and height. Absent rotation is identity: plenty
    /// of footage carries no display matrix at all.
    pub fn from_stored(width: u32, height: u32, rotation: Option<i64>) -> Self {
        match rotation.map(|r| r.rem_euclid(360)) {
            Some(90) | Some(270) => Self {
                width: height,
                height: width,
            },
            _ => Self { width, height },
        }
    }
}

impl SourceInfo {
    /// Interpret an ffprobe `-show_streams -show_format` JSON document.
    ///
    /// A missing or malformed rotation entry resolves to `None`; a missing
    /// video stream is an input error.
    pub fn from_probe(probe: &Value) -> Result<SourceInfo, String> {
        let streams = probe
            .get("streams")
            .and_then(|s| s.as_array())
            .ok_or_else(|| "no streams in probe output".to_string())?;

        let video = streams
            .iter()
            .find(|s| s.get("codec_type").and_then(|v| v.as_str()) == Some("video"))
            .ok_or_else(|| "no video stream found".to_string())?;

        let width = video
            .get("width")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| "video stream has no width".to_string())? as u32;
        let height = video
            .get("height")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| "video stream has no height".to_string())? as u32;

        let has_audio = streams
            .iter()
            .any(|s| s.get("codec_type").and_then(|v| v.as_str()) == Some("audio"));

        let duration = probe
            .get("format")
            .and_then(|f| f.get("duration"))
            .and_then(|d| d.as_str())
            .and_then(|d| d.parse::<f64>().ok());

        Ok(SourceInfo {
            width,
            height,
            rotation: read_rotation(video),
            duration,
            has_audio,
        })
    }

    pub fn visual_frame(&self) -> VisualFrame {
        VisualFrame::from_stored(self.width, self.height, self.rotation)
    }
}

/// Display rotation from the stream's side data, falling back to the legacy
/// `rotate` tag. The display matrix reports counter-clockwise rotation and
/// may be negative; normalization happens in `VisualFrame::from_stored`.
fn read_rotation(video: &Value) -> Option<i64> {
    let from_matrix = video
        .get("side_data_list")
        .and_then(|l| l.as_array())
        .and_then(|list| {
            list.iter().find(|side| {
                side.get("side_data_type").and_then(|v| v.as_str()) == Some("Display Matrix")
            })
        })
        .and_then(|side| side.get("rotation"))
        .and_then(|r| r.as_i64());

    from_matrix.or_else(|| {
        video
            .get("tags")
            .and_then(|t| t.get("rotate"))
            .and_then(|r| r.as_str())
            .and_then(|r| r.parse::<i64>().ok())
    })
}

/// Convenience wrapper turning a parse failure into an input error.
pub fn parse_source_info(probe: &Value, path: &std::path::Path) -> Result<SourceInfo, JobError> {
    SourceInfo::from_probe(probe).map_err(|reason| JobError::Input {
        path: path.to_path_buf(),
        reason,
    })
}
