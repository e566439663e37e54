use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Lines of the text being read, plus one empty sentinel line so the cursor
/// can rest just past the last real line.
#[derive(Clone, Debug)]
pub struct Document {
    path: PathBuf,
    lines: Vec<String>,
    hash: String,
}

impl Document {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let text = String::from_utf8(bytes.clone())
            .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: Self::split_lines(&text),
            hash: content_hash(&bytes),
        })
    }

    pub fn from_text(path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            lines: Self::split_lines(text),
            hash: content_hash(text.as_bytes()),
        }
    }

    fn split_lines(text: &str) -> Vec<String> {
        let mut lines: Vec<String> = text
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        lines.push(String::new());
        lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned())
    }

    /// Index of the sentinel line.
    pub fn last_index(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }
}

fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Reading speed multiplier, kept as whole tenths so repeated steps never
/// drift outside `0.1..=9.0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rate(u16);

impl Rate {
    const MIN_TENTHS: u16 = 1;
    const MAX_TENTHS: u16 = 90;

    pub fn from_f32(rate: f32) -> Self {
        if !rate.is_finite() {
            return Self::default();
        }
        let tenths = (rate * 10.0).round().clamp(
            f32::from(Self::MIN_TENTHS),
            f32::from(Self::MAX_TENTHS),
        );
        Self(tenths as u16)
    }

    /// Moves by `steps` tenths, clamped to the valid range.
    pub fn step(self, steps: i32) -> Self {
        let tenths = (i32::from(self.0) + steps)
            .clamp(i32::from(Self::MIN_TENTHS), i32::from(Self::MAX_TENTHS));
        Self(tenths as u16)
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self(10)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

/// Everything the screen shows: document, cursor position, speed and the
/// transient text on the command row.
#[derive(Debug)]
pub struct Reader {
    document: Document,
    cursor: usize,
    pub rate: Rate,
    frame: u64,
    /// Rows the current line is pushed down from the top of the text area.
    pub shift: usize,
    /// Pending `:` command, if the prompt is open.
    pub prompt: Option<String>,
    pub message: String,
}

impl Reader {
    pub fn new(document: Document, rate: Rate, shift: usize) -> Self {
        Self {
            document,
            cursor: 0,
            rate,
            frame: 0,
            shift,
            prompt: None,
            message: String::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn tick(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }

    /// Moves the cursor by `delta` lines, stopping at either end.
    pub fn move_by(&mut self, delta: isize) {
        let target = self.cursor.saturating_add_signed(delta);
        self.cursor = target.min(self.document.last_index());
    }

    /// Jumps to `index`, clamped into the document.
    pub fn jump_to(&mut self, index: usize) {
        self.cursor = index.min(self.document.last_index());
    }

    pub fn adjust_rate(&mut self, steps: i32) {
        self.rate = self.rate.step(steps);
    }

    /// Moves to the closest earlier line with text, skipping blank lines.
    pub fn skip_back(&mut self) {
        let mut index = self.cursor.saturating_sub(1);
        while index > 0 && is_blank(self.document.line(index).unwrap_or_default()) {
            index -= 1;
        }
        self.cursor = index;
    }

    pub fn at_sentinel(&self) -> bool {
        self.cursor >= self.document.last_index()
    }

    /// Status text: spinner, position, speed and file name.
    pub fn status_line(&self) -> String {
        let spinner = ['/', '-', '\\', '|'][(self.frame % 4) as usize];
        format!(
            "{spinner} {:>6}/{:<6} {}x :{}",
            self.cursor + 1,
            self.document.len(),
            self.rate,
            self.document.file_name()
        )
    }

    /// Share of the document read, nudged forward by the rows visible below
    /// the cursor so the bar reaches the end together with the text.
    pub fn progress(&self, height: usize) -> f64 {
        let len = self.document.len() as f64;
        let cursor = self.cursor as f64;
        ((cursor + cursor / len * height as f64) / len).clamp(0.0, 1.0)
    }
}

pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(text: &str) -> Reader {
        Reader::new(Document::from_text("book.txt", text), Rate::default(), 1)
    }

    #[test]
    fn document_appends_sentinel() {
        let doc = Document::from_text("a.txt", "one\ntwo\n");
        assert_eq!(doc.lines(), ["one", "two", ""]);
        assert_eq!(doc.last_index(), 2);
        assert_eq!(Document::from_text("e.txt", "").lines(), [""]);
    }

    #[test]
    fn hash_depends_on_content_only() {
        let a = Document::from_text("a.txt", "same");
        let b = Document::from_text("b.txt", "same");
        let c = Document::from_text("a.txt", "other");
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn load_reads_file_and_hashes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("novel.txt");
        fs::write(&path, "一行目\r\n二行目\n").unwrap();

        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.lines(), ["一行目", "二行目", ""]);
        assert_eq!(doc.file_name(), "novel.txt");
        assert_eq!(doc.hash(), content_hash("一行目\r\n二行目\n".as_bytes()));
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Document::load(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn cursor_stays_in_range() {
        let mut r = reader("a\nb\nc");
        for delta in [isize::MIN, -5, -1, 0, 1, 2, 7, isize::MAX, -3, 100] {
            r.move_by(delta);
            assert!(r.cursor() <= r.document().last_index());
        }
        r.move_by(isize::MIN);
        assert_eq!(r.cursor(), 0);
        r.move_by(isize::MAX);
        assert_eq!(r.cursor(), 3);
        r.jump_to(usize::MAX);
        assert_eq!(r.cursor(), 3);
        r.jump_to(1);
        assert_eq!(r.cursor(), 1);
    }

    #[test]
    fn rate_is_clamped() {
        let mut rate = Rate::default();
        for _ in 0..200 {
            rate = rate.step(1);
        }
        assert_eq!(rate.to_string(), "9.0");
        for _ in 0..200 {
            rate = rate.step(-1);
        }
        assert_eq!(rate.to_string(), "0.1");
        assert_eq!(Rate::from_f32(42.0).to_string(), "9.0");
        assert_eq!(Rate::from_f32(-1.0).to_string(), "0.1");
        assert_eq!(Rate::from_f32(f32::NAN), Rate::default());
        assert_eq!(Rate::from_f32(1.25).to_string(), "1.3");
    }

    #[test]
    fn skip_back_passes_blank_lines() {
        let mut r = reader("first\n\n  \nsecond\nthird");
        r.jump_to(3);
        r.skip_back();
        assert_eq!(r.cursor(), 0);

        r.jump_to(4);
        r.skip_back();
        assert_eq!(r.cursor(), 3);

        r.jump_to(0);
        r.skip_back();
        assert_eq!(r.cursor(), 0);
    }

    #[test]
    fn status_line_shows_position_and_rate() {
        let mut r = reader("a\nb");
        r.jump_to(1);
        r.tick();
        assert_eq!(r.status_line(), "-      2/3      1.0x :book.txt");
    }

    #[test]
    fn progress_grows_with_cursor() {
        let mut r = reader(&"line\n".repeat(99));
        assert_eq!(r.progress(10), 0.0);
        r.jump_to(50);
        let middle = r.progress(10);
        assert!(middle > 0.5 && middle < 0.6);
        r.jump_to(99);
        assert!(r.progress(10) <= 1.0);
    }
}
