use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event as CEvent, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{execute, ExecutableCommand};
use ratatui::backend::Backend;
use ratatui::layout::{Constraint, Layout};
use ratatui::prelude::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::Paragraph;
use ratatui::{Frame, Terminal};

use crate::reader::Reader;
use crate::viewport::{self, DisplayRow, StatusBar};

/// Marker column plus one space before the text.
const GUTTER: usize = 2;

const MARKER_STYLE: Style = Style::new().bg(Color::Indexed(57));
const STATUS_STYLE: Style = Style::new().fg(Color::Indexed(255)).bg(Color::Indexed(57));
const PROGRESS_STYLE: Style = Style::new().fg(Color::Indexed(245)).bg(Color::Indexed(255));

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Key(KeyEvent),
    Resize,
}

/// Where the reader is drawn and where its keys come from.
pub trait Frontend {
    /// Waits at most `timeout` for the next input.
    fn next_input(&mut self, timeout: Duration) -> Result<Option<Input>>;

    fn draw(&mut self, reader: &Reader) -> Result<()>;

    /// Forgets what is on screen so the next draw repaints every cell.
    fn repaint(&mut self) -> Result<()>;

    /// Rows of text shown at once, used for paging.
    fn page_rows(&self) -> usize;
}

pub struct TerminalGuard;

impl TerminalGuard {
    pub fn enter() -> Result<Self> {
        enable_raw_mode()?;
        io::stdout().execute(EnterAlternateScreen)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

pub struct TerminalFrontend<B: Backend> {
    terminal: Terminal<B>,
    page_rows: usize,
}

impl<B: Backend> TerminalFrontend<B> {
    pub fn new(backend: B) -> Result<Self> {
        Ok(Self {
            terminal: Terminal::new(backend)?,
            page_rows: 1,
        })
    }
}

impl<B: Backend> Frontend for TerminalFrontend<B> {
    fn next_input(&mut self, timeout: Duration) -> Result<Option<Input>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            CEvent::Key(key) if key.kind == KeyEventKind::Press => Ok(Some(Input::Key(key))),
            CEvent::Resize(..) => Ok(Some(Input::Resize)),
            _ => Ok(None),
        }
    }

    fn draw(&mut self, reader: &Reader) -> Result<()> {
        let mut rows = self.page_rows;
        self.terminal.draw(|frame| rows = render(frame, reader))?;
        self.page_rows = rows.max(1);
        Ok(())
    }

    fn repaint(&mut self) -> Result<()> {
        self.terminal.clear()?;
        Ok(())
    }

    fn page_rows(&self) -> usize {
        self.page_rows
    }
}

/// Draws status row, text and command row. Returns the number of text rows.
pub fn render(frame: &mut Frame<'_>, reader: &Reader) -> usize {
    let area = frame.size();
    let chunks = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .split(area);
    let (status_area, body, command_area) = (chunks[0], chunks[1], chunks[2]);

    let width = usize::from(area.width);
    let bar = StatusBar::new(reader, width, usize::from(area.height));
    let (done, rest) = bar.split(width);
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(done, PROGRESS_STYLE),
            Span::styled(rest, STATUS_STYLE),
        ])),
        status_area,
    );

    let height = usize::from(body.height);
    let text_width = usize::from(body.width).saturating_sub(GUTTER + 1);
    let rows = viewport::build(
        reader.document().lines(),
        reader.cursor(),
        reader.shift,
        height,
        text_width,
    );
    let lines: Vec<Line> = rows.iter().map(row_line).collect();
    frame.render_widget(Paragraph::new(Text::from(lines)), body);

    let command = match &reader.prompt {
        Some(input) => format!(":{input}"),
        None => reader.message.clone(),
    };
    frame.render_widget(Paragraph::new(command), command_area);

    height
}

fn row_line(row: &DisplayRow) -> Line<'static> {
    let marker = if row.highlighted {
        MARKER_STYLE
    } else {
        Style::default()
    };
    let mut spans = vec![Span::styled(" ", marker), Span::raw(" ")];
    for segment in &row.segments {
        let mut style = Style::default().fg(palette(segment.color_id()));
        if row.highlighted {
            style = style.add_modifier(Modifier::BOLD);
        }
        spans.push(Span::styled(segment.text.clone(), style));
    }
    Line::from(spans)
}

fn palette(color_id: u8) -> Color {
    match color_id {
        0 => Color::Reset,
        id => Color::Indexed(id),
    }
}
