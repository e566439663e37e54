//! Builds the rows visible on screen around the cursor.
//!
//! Bracket state is never cached between frames. Each build re-parses a few
//! lines above the window with a fresh [`DialogueParser`] so that a quotation
//! opened off screen still colours the rows that continue it.

use crate::dialogue::{DialogueParser, Segment, Voice};
use crate::reader::Reader;
use crate::wrap::{self, char_width};

/// Lines above the window parsed only to recover bracket state.
pub const LOOKBACK: usize = 8;

const FILLER: &str = "~";

/// One physical terminal row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayRow {
    pub segments: Vec<Segment>,
    pub highlighted: bool,
}

impl DisplayRow {
    fn filler() -> Self {
        Self {
            segments: vec![Segment {
                text: FILLER.to_string(),
                voice: Voice::Narration,
            }],
            highlighted: false,
        }
    }

    #[cfg(test)]
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Keeps the current line within the upper half of the window.
pub fn clamp_shift(shift: usize, height: usize) -> usize {
    shift.min(height / 2)
}

/// Returns exactly `height` rows of wrapped, segmented text with the rows of
/// line `cursor` starting `shift` rows below the top.
pub fn build(
    lines: &[String],
    cursor: usize,
    shift: usize,
    height: usize,
    width: usize,
) -> Vec<DisplayRow> {
    let shift = clamp_shift(shift, height);
    let first = cursor as isize - (shift + LOOKBACK) as isize;
    let last = (cursor + height) as isize;

    let mut parser = DialogueParser::new();
    let mut rows = Vec::new();
    let mut current_row = None;

    for index in first..=last {
        let source = usize::try_from(index).ok().filter(|&i| i < lines.len());
        let text = source.map_or(FILLER, |i| lines[i].as_str());
        let highlighted = source == Some(cursor);
        if highlighted && current_row.is_none() {
            current_row = Some(rows.len());
        }
        for chunk in wrap::wrap(text, width) {
            rows.push(DisplayRow {
                segments: parser.parse(&chunk),
                highlighted,
            });
        }
    }

    let top = current_row.unwrap_or(0).saturating_sub(shift);
    let mut visible: Vec<DisplayRow> = rows.into_iter().skip(top).take(height).collect();
    visible.resize_with(height, DisplayRow::filler);
    visible
}

/// Contents of the status row and how much of it the progress bar covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusBar {
    pub text: String,
    /// Columns from the left edge painted as progress.
    pub progress: usize,
}

impl StatusBar {
    pub fn new(reader: &Reader, width: usize, height: usize) -> Self {
        let status = reader.status_line();
        let text = wrap::wrap(&status, width).swap_remove(0);
        let progress = progress_columns(&text, width, reader.progress(height));
        Self { text, progress }
    }

    /// Splits the row, padded to `width` columns, at the progress column.
    pub fn split(&self, width: usize) -> (String, String) {
        let mut padded = self.text.clone();
        let used = wrap::display_width(&padded);
        padded.extend(std::iter::repeat(' ').take(width.saturating_sub(used)));

        let mut head = String::new();
        let mut cols = 0;
        let mut chars = padded.chars().peekable();
        while let Some(&c) = chars.peek() {
            if cols + char_width(c) > self.progress {
                break;
            }
            cols += char_width(c);
            head.push(c);
            chars.next();
        }
        (head, chars.collect())
    }
}

/// Column where the progress highlight ends, backed off to a character
/// boundary so a wide glyph is never split in half.
pub fn progress_columns(status: &str, width: usize, ratio: f64) -> usize {
    let offset = ((width as f64 * ratio) as usize).min(width);
    let mut used = 0;
    for c in status.chars() {
        let w = char_width(c);
        if used + w == offset {
            return offset;
        }
        if used + w > offset {
            return used;
        }
        used += w;
    }
    offset
}
