mod config;
mod dialogue;
mod frontend;
mod history;
mod playback;
mod reader;
mod session;
mod speech;
mod viewport;
mod wrap;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use ratatui::backend::CrosstermBackend;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::{paths, Config};
use crate::frontend::{TerminalFrontend, TerminalGuard};
use crate::history::HistoryStore;
use crate::playback::PlaybackController;
use crate::reader::{Document, Reader};
use crate::session::{Session, SessionOptions};
use crate::speech::{ExternalSpeech, SubstitutionTable};

#[derive(Debug, Parser)]
#[command(
    name = "rodoku",
    version,
    about = "Read a text file aloud in the terminal"
)]
struct Cli {
    /// UTF-8 text file to read.
    file: PathBuf,

    /// Playback speed multiplier (0.1 to 9.0).
    #[arg(short, long)]
    rate: Option<f32>,

    /// Start at this 1-based line instead of the saved position.
    #[arg(short, long)]
    line: Option<usize>,

    /// Lines to step back from the saved position.
    #[arg(short, long)]
    context: Option<usize>,

    /// Voice passed to the synthesizer.
    #[arg(short, long)]
    voice: Option<String>,

    /// Start reading immediately.
    #[arg(short, long)]
    auto: bool,

    /// Quit after the last line has been read.
    #[arg(long)]
    exit_at_end: bool,
}

impl Cli {
    fn apply_to(&self, config: &mut Config) {
        if let Some(rate) = self.rate {
            config.rate = rate;
        }
        if let Some(context) = self.context {
            config.context = context;
        }
        if let Some(voice) = &self.voice {
            config.voice = Some(voice.clone());
        }
        config.auto |= self.auto;
        config.exit_at_end |= self.exit_at_end;
    }
}

/// Logs go to a file since the terminal belongs to the reader.
fn init_logging(home: &Path) -> WorkerGuard {
    let appender = tracing_appender::rolling::never(home, paths::LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter =
        EnvFilter::try_from_env("RODOKU_LOG").unwrap_or_else(|_| EnvFilter::new("rodoku=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    guard
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let home = paths::home()?;
    fs::create_dir_all(&home)
        .with_context(|| format!("Failed to create {}", home.display()))?;
    let _log_guard = init_logging(&home);

    let mut config = Config::load_from(&paths::config_path(&home))?;
    cli.apply_to(&mut config);

    let document = Document::load(&cli.file)?;
    info!(file = %cli.file.display(), lines = document.len(), "opened document");

    let speech = ExternalSpeech::detect(&config.speech_settings())?;
    let substitutions = SubstitutionTable::load(&paths::replace_path(&home)).unwrap_or_else(|err| {
        warn!("ignoring substitutions: {err:#}");
        SubstitutionTable::builtin()
    });

    let reader = Reader::new(document, config.rate(), config.shift);
    let history = HistoryStore::open(paths::history_path(&home));
    let controller = PlaybackController::new(speech, substitutions);
    let options = SessionOptions {
        auto_start: config.auto,
        exit_at_end: config.exit_at_end,
        context: config.context,
    };
    let mut session = Session::new(reader, history, controller, options);
    session.resume(cli.line);

    let _guard = TerminalGuard::enter()?;
    let mut ui = TerminalFrontend::new(CrosstermBackend::new(io::stdout()))?;
    session.run(&mut ui)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_override_config() {
        let cli = Cli::parse_from(["rodoku", "book.txt", "-r", "1.5", "-c", "2", "--exit-at-end"]);
        let mut config = Config {
            voice: Some("Kyoko".into()),
            ..Config::default()
        };
        cli.apply_to(&mut config);

        assert_eq!(config.rate, 1.5);
        assert_eq!(config.context, 2);
        assert_eq!(config.voice.as_deref(), Some("Kyoko"));
        assert!(config.exit_at_end);
        assert!(!config.auto);
        assert_eq!(cli.line, None);
    }

    #[test]
    fn line_flag_is_parsed() {
        let cli = Cli::parse_from(["rodoku", "-l", "12", "-a", "book.txt"]);
        assert_eq!(cli.line, Some(12));
        assert!(cli.auto);
        assert_eq!(cli.file, PathBuf::from("book.txt"));
    }
}
