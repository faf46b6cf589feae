/// End padding added to every cue, in seconds.
const CUE_PADDING: f64 = 0.08;
/// Minimum gap between consecutive cues.
const MIN_GAP: f64 = 0.01;
/// Minimum cue duration.
const MIN_DURATION: f64 = 0.05;

/// One timed text segment from the transcription collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Word-level timings, when the collaborator provides them.
    pub words: Vec<WordSpan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordSpan {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// A shaped caption line, ready to become a styled cue.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedLine {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Shape transcript segments into caption lines.
///
/// Word timings, when present, are grouped into lines of at most
/// `max_chars`; otherwise the segment text is wrapped at `max_chars` and
/// timing is interpolated linearly across the segment. Each line then gets
/// end padding and overlap prevention: a line never starts before the
/// previous one ends, and never lasts less than the minimum duration.
pub fn shape_cues(segments: &[TranscriptSegment], max_chars: usize) -> Vec<TimedLine> {
    let mut shaped = Vec::new();
    let mut last_end = 0.0_f64;

    for seg in segments {
        let text = seg.text.trim();
        if text.is_empty() && seg.words.is_empty() {
            continue;
        }

        let lines = if seg.words.is_empty() {
            wrap_segment(seg, text, max_chars)
        } else {
            group_words(&seg.words, max_chars)
        };

        for line in lines {
            let mut start = line.start;
            let mut end = line.end + CUE_PADDING;

            if end - start < MIN_DURATION {
                end = start + MIN_DURATION;
            }
            if start < last_end + MIN_GAP {
                start = last_end + MIN_GAP;
                end = end.max(start + MIN_DURATION);
            }

            last_end = end;
            shaped.push(TimedLine {
                start,
                end,
                text: line.text,
            });
        }
    }

    shaped
}

/// Group word spans into lines of at most `max_chars`, keeping the first
/// word's start and the last word's end per line.
fn group_words(words: &[WordSpan], max_chars: usize) -> Vec<TimedLine> {
    let mut lines = Vec::new();
    let mut current: Vec<&WordSpan> = Vec::new();
    let mut current_len = 0usize;

    let flush = |current: &mut Vec<&WordSpan>, current_len: &mut usize, lines: &mut Vec<TimedLine>| {
        if current.is_empty() {
            return;
        }
        let text = current
            .iter()
            .map(|w| w.word.trim())
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(TimedLine {
            start: current[0].start,
            end: current[current.len() - 1].end,
            text,
        });
        current.clear();
        *current_len = 0;
    };

    for w in words {
        let word = w.word.trim();
        if word.is_empty() {
            continue;
        }
        let add_len = word.chars().count() + if current_len > 0 { 1 } else { 0 };
        if current_len + add_len <= max_chars {
            current.push(w);
            current_len += add_len;
        } else {
            flush(&mut current, &mut current_len, &mut lines);
            current.push(w);
            current_len = word.chars().count();
        }
    }
    flush(&mut current, &mut current_len, &mut lines);

    lines
}

/// Fallback for segment-only timing: wrap the text at `max_chars` and split
/// the segment duration evenly across the wrapped lines.
fn wrap_segment(seg: &TranscriptSegment, text: &str, max_chars: usize) -> Vec<TimedLine> {
    let wrapped = wrap_text(text, max_chars);
    if wrapped.is_empty() {
        return Vec::new();
    }
    let duration = (seg.end - seg.start).max(0.001);
    let slice = duration / wrapped.len() as f64;

    wrapped
        .into_iter()
        .enumerate()
        .map(|(i, line)| TimedLine {
            start: seg.start + i as f64 * slice,
            end: seg.start + (i + 1) as f64 * slice,
            text: line,
        })
        .collect()
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let add_len = word.chars().count() + if current.is_empty() { 0 } else { 1 };
        if current.chars().count() + add_len <= max_chars {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
