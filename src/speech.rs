//! The speech synthesizer and audio player, driven as child processes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::{bail, Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::reader::Rate;

/// Patterns the synthesizer chokes on, applied after the user's table.
const BUILTIN_SUBSTITUTIONS: [(&str, &str); 4] = [
    ("[ -]", ""),
    ("-+", ""),
    ("ー。", "ー"),
    ("ー([？?！!」])", "$1"),
];

/// Ordered regex rewrites applied to every segment before synthesis.
#[derive(Debug, Default)]
pub struct SubstitutionTable {
    rules: Vec<(Regex, String)>,
}

impl SubstitutionTable {
    /// Loads `pattern<TAB>replacement` rows from `path`, followed by the
    /// built-in rules. A missing file only leaves the built-in rules.
    pub fn load(path: &Path) -> Result<Self> {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        Ok(Self::parse(&source))
    }

    pub fn parse(source: &str) -> Self {
        let mut rules = Vec::new();
        for (number, row) in source.lines().enumerate() {
            if row.trim().is_empty() {
                continue;
            }
            let (pattern, replacement) = row.split_once('\t').unwrap_or((row, ""));
            match Regex::new(pattern) {
                Ok(regex) => rules.push((regex, replacement.to_string())),
                Err(err) => warn!(line = number + 1, "skipping substitution: {err}"),
            }
        }
        let mut table = Self { rules };
        table.push_builtin();
        table
    }

    /// The built-in rules only.
    pub fn builtin() -> Self {
        let mut table = Self::default();
        table.push_builtin();
        table
    }

    fn push_builtin(&mut self) {
        for (pattern, replacement) in BUILTIN_SUBSTITUTIONS {
            if let Ok(regex) = Regex::new(pattern) {
                self.rules.push((regex, replacement.to_string()));
            }
        }
    }

    pub fn apply(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |acc, (regex, replacement)| {
                regex.replace_all(&acc, replacement.as_str()).into_owned()
            })
    }
}

/// A running playback that can be polled and stopped.
pub trait PlaybackHandle {
    fn is_running(&mut self) -> Result<bool>;
    /// Terminates the playback and reaps it.
    fn stop(&mut self) -> Result<()>;
}

/// Turns segment text into sound.
pub trait Speech {
    type Handle: PlaybackHandle;

    /// Renders `text` to audio, blocking until it is ready.
    fn synthesize(&mut self, text: &str) -> Result<()>;

    /// Starts playing the last synthesized text without waiting for it.
    fn start(&mut self, rate: Rate, pitch: i32) -> Result<Self::Handle>;
}

pub struct ChildPlayback(Child);

impl PlaybackHandle for ChildPlayback {
    fn is_running(&mut self) -> Result<bool> {
        Ok(self.0.try_wait()?.is_none())
    }

    fn stop(&mut self) -> Result<()> {
        if self.0.try_wait()?.is_none() {
            self.0.kill()?;
        }
        self.0.wait()?;
        Ok(())
    }
}

impl Drop for ChildPlayback {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[derive(Clone, Debug)]
pub struct SpeechSettings {
    pub synthesizer: String,
    pub player: String,
    pub artifact: PathBuf,
    pub voice: Option<String>,
}

enum Output {
    /// Synthesize to a file, then hand it to the player.
    Player(String),
    /// No player available: the synthesizer speaks directly.
    Speaker { pending: String },
}

/// Synthesizer and player found on `PATH`.
pub struct ExternalSpeech {
    synthesizer: String,
    voice: Option<String>,
    artifact: PathBuf,
    output: Output,
}

impl ExternalSpeech {
    /// Fails when the synthesizer is missing. A missing player falls back to
    /// letting the synthesizer play through the speaker.
    pub fn detect(settings: &SpeechSettings) -> Result<Self> {
        if !executable_in_path(&settings.synthesizer) {
            bail!(
                "speech synthesizer '{}' was not found on PATH; install it or set \
                 [speech].synthesizer in config.toml",
                settings.synthesizer
            );
        }
        let output = if executable_in_path(&settings.player) {
            Output::Player(settings.player.clone())
        } else {
            warn!(
                player = %settings.player,
                "player not found, speaking directly without rate or pitch"
            );
            Output::Speaker {
                pending: String::new(),
            }
        };
        Ok(Self {
            synthesizer: settings.synthesizer.clone(),
            voice: settings.voice.clone(),
            artifact: settings.artifact.clone(),
            output,
        })
    }

    fn synth_command(&self) -> Command {
        let mut cmd = Command::new(&self.synthesizer);
        if let Some(voice) = &self.voice {
            cmd.arg("-v").arg(voice);
        }
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        cmd
    }
}

impl Speech for ExternalSpeech {
    type Handle = ChildPlayback;

    fn synthesize(&mut self, text: &str) -> Result<()> {
        if let Output::Speaker { pending } = &mut self.output {
            *pending = text.to_string();
            return Ok(());
        }
        let status = self
            .synth_command()
            .arg("-o")
            .arg(&self.artifact)
            .arg(text)
            .status()
            .with_context(|| format!("failed to run '{}'", self.synthesizer))?;
        if !status.success() {
            bail!("'{}' exited with {status}", self.synthesizer);
        }
        Ok(())
    }

    fn start(&mut self, rate: Rate, pitch: i32) -> Result<ChildPlayback> {
        let child = match &self.output {
            Output::Player(player) => Command::new(player)
                .arg("-q")
                .arg(&self.artifact)
                .args(["tempo", "-s"])
                .arg(rate.to_string())
                .arg("pitch")
                .arg(pitch.to_string())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .with_context(|| format!("failed to launch '{player}'"))?,
            Output::Speaker { pending } => self
                .synth_command()
                .arg(pending)
                .spawn()
                .with_context(|| format!("failed to launch '{}'", self.synthesizer))?,
        };
        debug!(pid = child.id(), %rate, pitch, "playback started");
        Ok(ChildPlayback(child))
    }
}

pub fn executable_in_path(command: &str) -> bool {
    let path = Path::new(command);
    if path.components().count() > 1 {
        return path.is_file();
    }
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(command).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_rules_run_before_builtin_ones() {
        let table = SubstitutionTable::parse("猫\tねこ\n(\\d+)円\t$1えん\n");
        assert_eq!(table.apply("猫が 100円 - 拾った"), "ねこが100えん拾った");
    }

    #[test]
    fn builtin_rules_fix_long_vowel_marks() {
        let table = SubstitutionTable::builtin();
        assert_eq!(table.apply("ラーメンー。"), "ラーメンー");
        assert_eq!(table.apply("そうだー！"), "そうだ！");
        assert_eq!(table.apply("「よーし」"), "「よーし」");
        assert_eq!(table.apply("ねーー」"), "ねー」");
        assert_eq!(table.apply("a--b c"), "abc");
    }

    #[test]
    fn bad_rows_are_skipped() {
        let table = SubstitutionTable::parse("([unclosed\tx\n\nA\tB\n");
        assert_eq!(table.apply("A(["), "B([");
    }

    #[test]
    fn missing_table_uses_builtin_rules() {
        let dir = tempfile::tempdir().unwrap();
        let table = SubstitutionTable::load(&dir.path().join("replace.tsv")).unwrap();
        assert_eq!(table.apply("a b"), "ab");
    }

    #[test]
    fn table_file_is_loaded_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replace.tsv");
        fs::write(&path, "ab\tc\nc\td\n").unwrap();
        let table = SubstitutionTable::load(&path).unwrap();
        assert_eq!(table.apply("ab"), "d");
    }

    #[test]
    fn missing_player_speaks_directly() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SpeechSettings {
            synthesizer: "echo".into(),
            player: "no-such-player-binary".into(),
            artifact: dir.path().join("cache.aiff"),
            voice: None,
        };
        let mut speech = ExternalSpeech::detect(&settings).unwrap();
        assert!(matches!(speech.output, Output::Speaker { .. }));

        speech.synthesize("hello").unwrap();
        assert!(!settings.artifact.exists());

        let mut playback = speech.start(Rate::default(), -30).unwrap();
        let started = std::time::Instant::now();
        while playback.is_running().unwrap() {
            assert!(started.elapsed() < std::time::Duration::from_secs(5));
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        playback.stop().unwrap();
    }

    #[test]
    fn missing_synthesizer_is_fatal() {
        let settings = SpeechSettings {
            synthesizer: "definitely-not-a-real-synth-binary".into(),
            player: "play".into(),
            artifact: PathBuf::from("/tmp/x.aiff"),
            voice: None,
        };
        assert!(ExternalSpeech::detect(&settings).is_err());
        assert!(!executable_in_path("definitely-not-a-real-synth-binary"));
    }
}
