use std::time::Duration;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::info;

use crate::frontend::{Frontend, Input};
use crate::history::HistoryStore;
use crate::playback::{Outcome, PlaybackController};
use crate::reader::Reader;
use crate::speech::Speech;

const IDLE_POLL: Duration = Duration::from_millis(120);

#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Start reading right after the first draw.
    pub auto_start: bool,
    /// Leave once the last line has been read.
    pub exit_at_end: bool,
    /// Lines to step back when resuming.
    pub context: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    LineDown,
    LineUp,
    PageDown,
    PageUp,
    RateDown,
    RateUp,
    Read,
    ReadFromContext,
    Prompt,
    Quit,
}

fn browse_action(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::Quit),
        KeyCode::Char('j') | KeyCode::Down => Some(Action::LineDown),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::LineUp),
        KeyCode::Char('J') | KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::Char('K') | KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::Char('h') | KeyCode::Left => Some(Action::RateDown),
        KeyCode::Char('l') | KeyCode::Right => Some(Action::RateUp),
        KeyCode::Char(' ') | KeyCode::Enter => Some(Action::Read),
        KeyCode::Char('r') => Some(Action::ReadFromContext),
        KeyCode::Char(':') => Some(Action::Prompt),
        KeyCode::Char('q') => Some(Action::Quit),
        _ => None,
    }
}

/// Browsing loop: moves the cursor, changes speed and hands over to the
/// playback controller when asked to read.
pub struct Session<S: Speech> {
    reader: Reader,
    history: HistoryStore,
    controller: PlaybackController<S>,
    options: SessionOptions,
}

impl<S: Speech> Session<S> {
    pub fn new(
        reader: Reader,
        history: HistoryStore,
        controller: PlaybackController<S>,
        options: SessionOptions,
    ) -> Self {
        Self {
            reader,
            history,
            controller,
            options,
        }
    }

    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    /// Places the cursor at the explicit 1-based `start_line`, or where the
    /// document was last left minus the configured context.
    pub fn resume(&mut self, start_line: Option<usize>) {
        let index = match start_line {
            Some(line) => line.saturating_sub(1),
            None => self
                .history
                .get(self.reader.document().hash())
                .saturating_sub(self.options.context),
        };
        self.reader.jump_to(index);
        info!(line = self.reader.cursor(), "resuming");
    }

    pub fn run<F: Frontend>(&mut self, ui: &mut F) -> Result<()> {
        ui.draw(&self.reader)?;

        let mut quit = self.options.auto_start && self.read(ui)?;
        while !quit {
            let Some(input) = ui.next_input(IDLE_POLL)? else {
                continue;
            };
            match input {
                Input::Resize => ui.repaint()?,
                Input::Key(key) => quit = self.handle_key(key, ui)?,
            }
            ui.draw(&self.reader)?;
        }

        info!(line = self.reader.cursor(), "session ended");
        self.history.flush();
        Ok(())
    }

    fn handle_key<F: Frontend>(&mut self, key: KeyEvent, ui: &mut F) -> Result<bool> {
        if self.reader.prompt.is_some() {
            return self.handle_prompt_key(key, ui);
        }
        match browse_action(key) {
            Some(action) => self.apply(action, ui),
            None => Ok(false),
        }
    }

    /// Returns `true` when the session should end.
    fn apply<F: Frontend>(&mut self, action: Action, ui: &mut F) -> Result<bool> {
        let page = ui.page_rows().saturating_sub(1).max(1) as isize;
        match action {
            Action::LineDown => self.reader.move_by(1),
            Action::LineUp => self.reader.move_by(-1),
            Action::PageDown => self.reader.move_by(page),
            Action::PageUp => self.reader.move_by(-page),
            Action::RateDown => self.reader.adjust_rate(-1),
            Action::RateUp => self.reader.adjust_rate(1),
            Action::Read => return self.read(ui),
            Action::ReadFromContext => {
                self.reader.move_by(-(self.options.context as isize));
                return self.read(ui);
            }
            Action::Prompt => {
                self.reader.prompt = Some(String::new());
                return Ok(false);
            }
            Action::Quit => return Ok(true),
        }
        self.mark_visited();
        Ok(false)
    }

    fn read<F: Frontend>(&mut self, ui: &mut F) -> Result<bool> {
        self.reader.message.clear();
        let outcome = self.controller.play_document(
            &mut self.reader,
            &self.history,
            ui,
            self.options.exit_at_end,
        )?;
        self.mark_visited();
        Ok(match outcome {
            Outcome::Quit => true,
            Outcome::Continued => self.options.exit_at_end,
            Outcome::Cancelled | Outcome::SkippedBack => false,
        })
    }

    fn handle_prompt_key<F: Frontend>(&mut self, key: KeyEvent, ui: &mut F) -> Result<bool> {
        let Some(input) = self.reader.prompt.as_mut() else {
            return Ok(false);
        };
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true);
            }
            KeyCode::Esc => self.reader.prompt = None,
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Char(c) => input.push(c),
            KeyCode::Enter => {
                let command = self.reader.prompt.take().unwrap_or_default();
                return self.run_command(command.trim(), ui);
            }
            _ => {}
        }
        Ok(false)
    }

    /// A number jumps to that line; a single character acts as that key.
    fn run_command<F: Frontend>(&mut self, command: &str, ui: &mut F) -> Result<bool> {
        if command.is_empty() {
            return Ok(false);
        }
        if command.chars().all(|c| c.is_ascii_digit()) {
            match command.parse::<usize>() {
                Ok(line) => {
                    self.reader.jump_to(line.saturating_sub(1));
                    self.mark_visited();
                }
                Err(_) => self.reader.message = format!("no such line: {command}"),
            }
            return Ok(false);
        }

        let mut chars = command.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            let key = KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE);
            if let Some(action) = browse_action(key) {
                return self.apply(action, ui);
            }
        }
        self.reader.message = format!("unknown command: {command}");
        Ok(false)
    }

    fn mark_visited(&self) {
        self.history
            .mark_visited(self.reader.document().hash(), self.reader.cursor());
    }
}
