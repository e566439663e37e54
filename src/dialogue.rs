//! Quotation-aware segmentation of text lines.
//!
//! A line is split into [`Segment`]s at Japanese bracket boundaries. Each
//! segment carries the [`Voice`] of the bracket it sits in, which decides
//! both its colour on screen and the pitch it is spoken with. Brackets may
//! span lines, so the parser keeps a [`BracketStack`] across calls.

/// The active quotation context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Voice {
    Narration,
    /// `「...」`
    Kagi,
    /// `『...』`
    DoubleKagi,
    /// `【...】`
    Lenticular,
}

impl Voice {
    /// Maps an opening bracket to the voice it starts.
    pub fn opened_by(c: char) -> Option<Self> {
        match c {
            '「' => Some(Self::Kagi),
            '『' => Some(Self::DoubleKagi),
            '【' => Some(Self::Lenticular),
            _ => None,
        }
    }

    pub fn closing_char(self) -> Option<char> {
        match self {
            Self::Narration => None,
            Self::Kagi => Some('」'),
            Self::DoubleKagi => Some('』'),
            Self::Lenticular => Some('】'),
        }
    }

    /// Terminal palette index; 0 is the terminal's default colour.
    pub fn color_id(self) -> u8 {
        match self {
            Self::Narration => 0,
            Self::Kagi => 5,
            Self::DoubleKagi => 1,
            Self::Lenticular => 3,
        }
    }

    pub fn pitch_offset(self) -> i32 {
        match self {
            Self::Narration => -140,
            Self::Kagi => -30,
            Self::DoubleKagi | Self::Lenticular => 40,
        }
    }
}

/// A contiguous span of a line spoken and drawn with a single voice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub voice: Voice,
}

impl Segment {
    fn new(text: String, voice: Voice) -> Self {
        Self { text, voice }
    }

    pub fn color_id(&self) -> u8 {
        self.voice.color_id()
    }

    pub fn pitch_offset(&self) -> i32 {
        self.voice.pitch_offset()
    }
}

/// Stack of open brackets. The bottom frame is always [`Voice::Narration`]
/// and is never popped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BracketStack {
    frames: Vec<Voice>,
}

impl Default for BracketStack {
    fn default() -> Self {
        Self {
            frames: vec![Voice::Narration],
        }
    }
}

impl BracketStack {
    pub fn top(&self) -> Voice {
        self.frames.last().copied().unwrap_or(Voice::Narration)
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn push(&mut self, voice: Voice) {
        self.frames.push(voice);
    }

    fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }
}

/// Splits `line` into segments starting from `stack`, returning the segments
/// together with the stack left open at the end of the line.
pub fn parse_with(stack: &BracketStack, line: &str) -> (Vec<Segment>, BracketStack) {
    let mut stack = stack.clone();
    let mut segments = Vec::new();
    let mut buf = String::new();

    for c in line.chars() {
        buf.push(c);

        let top = stack.top();
        if top.closing_char() == Some(c) {
            segments.push(Segment::new(std::mem::take(&mut buf), top));
            stack.pop();
        }

        if let Some(voice) = Voice::opened_by(c) {
            buf.pop();
            if !buf.is_empty() {
                segments.push(Segment::new(std::mem::take(&mut buf), stack.top()));
            }
            buf.clear();
            buf.push(c);
            stack.push(voice);
        }
    }

    if !buf.is_empty() {
        segments.push(Segment::new(buf, stack.top()));
    }

    (segments, stack)
}

/// Stateful parser that carries open brackets from one line to the next.
///
/// Every instance starts from plain narration.
#[derive(Debug, Default)]
pub struct DialogueParser {
    stack: BracketStack,
}

impl DialogueParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, line: &str) -> Vec<Segment> {
        let (segments, stack) = parse_with(&self.stack, line);
        self.stack = stack;
        segments
    }

    #[cfg(test)]
    pub fn stack(&self) -> &BracketStack {
        &self.stack
    }
}
