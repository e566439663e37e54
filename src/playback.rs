//! Reads lines aloud one segment at a time while staying responsive to keys.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, info, warn};

use crate::dialogue::{DialogueParser, Segment};
use crate::frontend::{Frontend, Input};
use crate::history::HistoryStore;
use crate::reader::{is_blank, Rate, Reader};
use crate::speech::{PlaybackHandle, Speech, SubstitutionTable};

/// Lines before the current one parsed to recover open brackets.
pub const LOOKBACK: usize = 5;

pub const POLL_INTERVAL: Duration = Duration::from_millis(40);

/// Stand-in for a segment that produced no audio.
pub const SKIP_PAUSE: Duration = Duration::from_millis(50);

pub const END_OF_DOCUMENT: &str = "-- end of document --";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every segment was played, or the document ran out.
    Continued,
    /// The cursor was moved back; reading goes on from there.
    SkippedBack,
    /// Reading stopped; back to browsing.
    Cancelled,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PlaybackKey {
    RateDown,
    RateUp,
    CancelSegment,
    SkipBack,
    Stop,
    Quit,
}

fn playback_key(key: KeyEvent) -> Option<PlaybackKey> {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(PlaybackKey::Quit)
        }
        KeyCode::Char('h') | KeyCode::Left => Some(PlaybackKey::RateDown),
        KeyCode::Char('l') | KeyCode::Right => Some(PlaybackKey::RateUp),
        KeyCode::Char('n') | KeyCode::Tab => Some(PlaybackKey::CancelSegment),
        KeyCode::Char('b' | 'k') | KeyCode::Up => Some(PlaybackKey::SkipBack),
        KeyCode::Char(' ') | KeyCode::Enter | KeyCode::Esc => Some(PlaybackKey::Stop),
        KeyCode::Char('q') => Some(PlaybackKey::Quit),
        _ => None,
    }
}

/// Segments of line `index`, with bracket state recovered from the
/// [`LOOKBACK`] lines before it.
pub fn segments_for(lines: &[String], index: usize) -> Vec<Segment> {
    let Some(line) = lines.get(index) else {
        return Vec::new();
    };
    let mut parser = DialogueParser::new();
    for previous in &lines[index.saturating_sub(LOOKBACK)..index] {
        parser.parse(previous);
    }
    parser.parse(line)
}

pub struct PlaybackController<S: Speech> {
    speech: S,
    substitutions: SubstitutionTable,
    poll_interval: Duration,
    skip_pause: Duration,
}

impl<S: Speech> PlaybackController<S> {
    pub fn new(speech: S, substitutions: SubstitutionTable) -> Self {
        Self {
            speech,
            substitutions,
            poll_interval: POLL_INTERVAL,
            skip_pause: SKIP_PAUSE,
        }
    }

    pub fn with_timing(mut self, poll_interval: Duration, skip_pause: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.skip_pause = skip_pause;
        self
    }

    /// Reads from the cursor to the end of the document, advancing one line
    /// after each line finishes.
    ///
    /// With `exit_at_end` the loop stops on the last real line instead of
    /// stepping onto the sentinel.
    pub fn play_document<F: Frontend>(
        &mut self,
        reader: &mut Reader,
        history: &HistoryStore,
        ui: &mut F,
        exit_at_end: bool,
    ) -> Result<Outcome> {
        loop {
            history.mark_visited(reader.document().hash(), reader.cursor());
            ui.draw(reader)?;

            match self.play_line(reader, ui)? {
                Outcome::Continued => {}
                Outcome::SkippedBack => continue,
                stopped @ (Outcome::Cancelled | Outcome::Quit) => return Ok(stopped),
            }

            if reader.at_sentinel() {
                break;
            }
            if exit_at_end && reader.cursor() + 1 == reader.document().last_index() {
                break;
            }
            reader.move_by(1);
        }

        info!(line = reader.cursor(), "finished reading");
        reader.message = END_OF_DOCUMENT.to_string();
        ui.draw(reader)?;
        Ok(Outcome::Continued)
    }

    /// Speaks every segment of the current line in order.
    pub fn play_line<F: Frontend>(&mut self, reader: &mut Reader, ui: &mut F) -> Result<Outcome> {
        let segments = segments_for(reader.document().lines(), reader.cursor());
        for segment in segments {
            let text = self.substitutions.apply(&segment.text);
            let Some(mut handle) = self.begin(&text, reader.rate, segment.pitch_offset()) else {
                thread::sleep(self.skip_pause);
                continue;
            };
            if let Some(outcome) = self.wait(&mut handle, reader, ui)? {
                return Ok(outcome);
            }
        }
        Ok(Outcome::Continued)
    }

    /// Synthesizes `text` and starts it playing. `None` means the segment
    /// is skipped.
    fn begin(&mut self, text: &str, rate: Rate, pitch: i32) -> Option<S::Handle> {
        if is_blank(text) {
            return None;
        }
        debug!(text, pitch, "speaking segment");
        if let Err(err) = self.speech.synthesize(text) {
            warn!("synthesis failed, skipping segment: {err:#}");
            return None;
        }
        match self.speech.start(rate, pitch) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!("playback failed, skipping segment: {err:#}");
                None
            }
        }
    }

    /// Polls the running segment and the keyboard until one of them ends it.
    /// Returns an outcome only when the rest of the line must be abandoned.
    fn wait<F: Frontend>(
        &mut self,
        handle: &mut S::Handle,
        reader: &mut Reader,
        ui: &mut F,
    ) -> Result<Option<Outcome>> {
        loop {
            match handle.is_running() {
                Ok(true) => {}
                Ok(false) => return Ok(None),
                Err(err) => {
                    warn!("lost track of playback, moving on: {err:#}");
                    return Ok(None);
                }
            }
            reader.tick();
            ui.draw(reader)?;

            let key = match ui.next_input(self.poll_interval)? {
                None => continue,
                Some(Input::Resize) => {
                    ui.repaint()?;
                    continue;
                }
                Some(Input::Key(key)) => key,
            };

            match playback_key(key) {
                Some(PlaybackKey::RateDown) => reader.adjust_rate(-1),
                Some(PlaybackKey::RateUp) => reader.adjust_rate(1),
                Some(PlaybackKey::CancelSegment) => {
                    stop(handle);
                    return Ok(None);
                }
                Some(PlaybackKey::SkipBack) => {
                    stop(handle);
                    reader.skip_back();
                    return Ok(Some(Outcome::SkippedBack));
                }
                Some(PlaybackKey::Stop) => {
                    stop(handle);
                    return Ok(Some(Outcome::Cancelled));
                }
                Some(PlaybackKey::Quit) => {
                    stop(handle);
                    return Ok(Some(Outcome::Quit));
                }
                None => {}
            }
        }
    }
}

fn stop<H: PlaybackHandle>(handle: &mut H) {
    if let Err(err) = handle.stop() {
        warn!("failed to stop playback: {err:#}");
    }
}
