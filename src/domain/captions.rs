use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::domain::frame::VisualFrame;
use crate::domain::transcript::TimedLine;

/// Vertical margin as a fraction of canvas height. Keeps the caption
/// baseline above platform UI overlays on short-form players.
const MARGIN_V_RATIO: f64 = 1.0 / 3.0;
const FONT_SIZE_RATIO: f64 = 0.072;
const MARGIN_SIDE_RATIO: f64 = 0.037;

/// ASS style block for one caption track.
///
/// `play_res_x`/`play_res_y` must equal the source's visual frame, never its
/// stored encode dimensions — the renderer lays out geometry on the stored
/// frame buffer and ignores rotation flags, so the canvas is resolved once,
/// upstream, and embedded here.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    pub name: String,
    pub font_name: String,
    pub font_size: u32,
    pub primary_color: String,
    pub secondary_color: String,
    pub outline_color: String,
    pub back_color: String,
    pub outline: u32,
    pub shadow: u32,
    /// ASS numpad alignment; 2 is bottom-center, the only supported anchor.
    pub alignment: u32,
    pub margin_l: u32,
    pub margin_r: u32,
    pub margin_v: u32,
    pub play_res_x: u32,
    pub play_res_y: u32,
}

impl CaptionStyle {
    /// Style defaults for a given visual frame.
    pub fn default_for_frame(frame: VisualFrame) -> Self {
        let margin_side = (frame.width as f64 * MARGIN_SIDE_RATIO).round() as u32;
        Self {
            name: "Default".to_string(),
            font_name: "Roboto".to_string(),
            font_size: (frame.height as f64 * FONT_SIZE_RATIO).round() as u32,
            primary_color: "&H00FFFFFF".to_string(),
            secondary_color: "&H000000FF".to_string(),
            outline_color: "&H00000000".to_string(),
            back_color: "&H64000000".to_string(),
            outline: 3,
            shadow: 2,
            alignment: 2,
            margin_l: margin_side,
            margin_r: margin_side,
            margin_v: (frame.height as f64 * MARGIN_V_RATIO).round() as u32,
            play_res_x: frame.width,
            play_res_y: frame.height,
        }
    }

    fn style_line(&self) -> String {
        format!(
            "Style: {},{},{},{},{},{},{},0,0,0,0,100,100,0,0,1,{},{},{},{},{},{},1",
            self.name,
            self.font_name,
            self.font_size,
            self.primary_color,
            self.secondary_color,
            self.outline_color,
            self.back_color,
            self.outline,
            self.shadow,
            self.alignment,
            self.margin_l,
            self.margin_r,
            self.margin_v,
        )
    }
}

/// One timed caption entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// A styled subtitle document, one per source video.
///
/// Persisted before compositing and retained afterward: the track is a
/// reusable artifact, re-renderable without re-transcribing.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTrack {
    pub style: CaptionStyle,
    pub cues: Vec<Cue>,
}

const STYLE_FORMAT: &str = "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, \
    OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, \
    Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding";
const EVENT_FORMAT: &str =
    "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text";

impl CaptionTrack {
    /// Build a track from shaped caption lines. An empty line list yields a
    /// valid header-only document — a video with no detected speech is a
    /// legitimate, captionless output.
    pub fn from_lines(style: CaptionStyle, lines: Vec<TimedLine>) -> Self {
        let cues = lines
            .into_iter()
            .map(|l| Cue {
                start: l.start,
                end: l.end,
                text: l.text,
            })
            .collect();
        Self { style, cues }
    }

    pub fn canvas(&self) -> (u32, u32) {
        (self.style.play_res_x, self.style.play_res_y)
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = File::create(path).await?;

        file.write_all(b"[Script Info]\n").await?;
        file.write_all(b"ScriptType: v4.00+\n").await?;
        file.write_all(format!("PlayResX: {}\n", self.style.play_res_x).as_bytes())
            .await?;
        file.write_all(format!("PlayResY: {}\n", self.style.play_res_y).as_bytes())
            .await?;
        file.write_all(b"ScaledBorderAndShadow: yes\n").await?;
        file.write_all(b"WrapStyle: 0\n\n").await?;

        file.write_all(b"[V4+ Styles]\n").await?;
        file.write_all(format!("{}\n", STYLE_FORMAT).as_bytes()).await?;
        file.write_all(format!("{}\n\n", self.style.style_line()).as_bytes())
            .await?;

        file.write_all(b"[Events]\n").await?;
        file.write_all(format!("{}\n", EVENT_FORMAT).as_bytes()).await?;

        for cue in &self.cues {
            file.write_all(
                format!(
                    "Dialogue: 0,{},{},{},,0,0,0,,{}\n",
                    ass_time(cue.start),
                    ass_time(cue.end),
                    self.style.name,
                    ass_escape(&cue.text),
                )
                .as_bytes(),
            )
            .await?;
        }

        file.flush().await?;
        Ok(())
    }

    /// Read a track back from disk. Round-trips timing (at centisecond
    /// precision, the format's resolution), text, and canvas geometry of a
    /// document written by [`CaptionTrack::write_to`].
    pub async fn load(path: &Path) -> Result<CaptionTrack, String> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("cannot read {:?}: {}", path, e))?;

        let (res_x, res_y) =
            play_res(&content).ok_or_else(|| "missing PlayResX/PlayResY headers".to_string())?;

        let style_line = content
            .lines()
            .find(|l| l.starts_with("Style:"))
            .ok_or_else(|| "no Style line found".to_string())?;
        let mut style = parse_style_line(style_line)?;
        style.play_res_x = res_x;
        style.play_res_y = res_y;

        let mut cues = Vec::new();
        for line in content.lines().filter(|l| l.starts_with("Dialogue:")) {
            cues.push(parse_dialogue_line(line)?);
        }

        Ok(CaptionTrack { style, cues })
    }
}

fn play_res(content: &str) -> Option<(u32, u32)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?m)^PlayRes([XY]):\s*(\d+)\s*$").expect("hardcoded pattern")
    });

    let mut x = None;
    let mut y = None;
    for cap in re.captures_iter(content) {
        let value = cap[2].parse().ok()?;
        match &cap[1] {
            "X" => x = Some(value),
            _ => y = Some(value),
        }
    }
    Some((x?, y?))
}

fn parse_style_line(line: &str) -> Result<CaptionStyle, String> {
    let fields: Vec<&str> = line
        .splitn(2, ':')
        .nth(1)
        .ok_or_else(|| "malformed Style line".to_string())?
        .split(',')
        .map(|f| f.trim())
        .collect();
    if fields.len() < 23 {
        return Err(format!("Style line has {} fields, expected 23", fields.len()));
    }

    let int = |i: usize| -> Result<u32, String> {
        fields[i]
            .parse::<u32>()
            .map_err(|_| format!("non-numeric style field {}: {}", i, fields[i]))
    };

    Ok(CaptionStyle {
        name: fields[0].to_string(),
        font_name: fields[1].to_string(),
        font_size: int(2)?,
        primary_color: fields[3].to_string(),
        secondary_color: fields[4].to_string(),
        outline_color: fields[5].to_string(),
        back_color: fields[6].to_string(),
        outline: int(16)?,
        shadow: int(17)?,
        alignment: int(18)?,
        margin_l: int(19)?,
        margin_r: int(20)?,
        margin_v: int(21)?,
        play_res_x: 0,
        play_res_y: 0,
    })
}

fn parse_dialogue_line(line: &str) -> Result<Cue, String> {
    let body = line
        .splitn(2, ':')
        .nth(1)
        .ok_or_else(|| "malformed Dialogue line".to_string())?
        .trim_start();
    // Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text
    let fields: Vec<&str> = body.splitn(10, ',').collect();
    if fields.len() < 10 {
        return Err(format!("Dialogue line has {} fields, expected 10", fields.len()));
    }

    Ok(Cue {
        start: parse_ass_time(fields[1])?,
        end: parse_ass_time(fields[2])?,
        text: ass_unescape(fields[9]),
    })
}

/// Format seconds as an ASS timestamp, `H:MM:SS.CC` (centiseconds).
pub fn ass_time(seconds: f64) -> String {
    let total_cs = (seconds * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_s = total_cs / 100;
    let s = total_s % 60;
    let m = (total_s / 60) % 60;
    let h = total_s / 3600;
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

pub fn parse_ass_time(stamp: &str) -> Result<f64, String> {
    let parts: Vec<&str> = stamp.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(format!("malformed timestamp: {}", stamp));
    }
    let h: u64 = parts[0].parse().map_err(|_| format!("bad hours: {}", stamp))?;
    let m: u64 = parts[1].parse().map_err(|_| format!("bad minutes: {}", stamp))?;
    let sec_parts: Vec<&str> = parts[2].split('.').collect();
    if sec_parts.len() != 2 {
        return Err(format!("malformed seconds: {}", stamp));
    }
    let s: u64 = sec_parts[0].parse().map_err(|_| format!("bad seconds: {}", stamp))?;
    let cs: u64 = sec_parts[1].parse().map_err(|_| format!("bad centiseconds: {}", stamp))?;

    Ok((h * 3600 + m * 60 + s) as f64 + cs as f64 / 100.0)
}

pub fn ass_escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace('\n', "\\N")
}

fn ass_unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
