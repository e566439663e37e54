//! Settings read from `${RODOKU_HOME}/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::reader::Rate;
use crate::speech::SpeechSettings;

pub mod paths {
    //! Where rodoku keeps its files.
    //!
    //! The home directory is `RODOKU_HOME` when set, else `~/.config/rodoku`.

    use std::ffi::OsString;
    use std::path::{Path, PathBuf};

    use anyhow::{anyhow, Result};

    pub fn home() -> Result<PathBuf> {
        resolve(std::env::var_os("RODOKU_HOME"), dirs::home_dir())
    }

    fn resolve(overridden: Option<OsString>, user_home: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(home) = overridden.filter(|h| !h.is_empty()) {
            return Ok(PathBuf::from(home));
        }
        user_home
            .map(|h| h.join(".config").join("rodoku"))
            .ok_or_else(|| anyhow!("Could not determine home directory; set RODOKU_HOME"))
    }

    pub fn config_path(home: &Path) -> PathBuf {
        home.join("config.toml")
    }

    pub fn replace_path(home: &Path) -> PathBuf {
        home.join("replace.tsv")
    }

    pub fn history_path(home: &Path) -> PathBuf {
        home.join("history.bin")
    }

    pub const LOG_FILE: &str = "rodoku.log";

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn env_override_wins() {
            let home = resolve(Some("/srv/r".into()), Some("/home/u".into())).unwrap();
            assert_eq!(home, PathBuf::from("/srv/r"));
        }

        #[test]
        fn defaults_under_dot_config() {
            let home = resolve(Some("".into()), Some("/home/u".into())).unwrap();
            assert_eq!(home, PathBuf::from("/home/u/.config/rodoku"));
            assert!(resolve(None, None).is_err());
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Playback speed multiplier.
    pub rate: f32,
    /// Lines to step back when resuming.
    pub context: usize,
    /// Rows kept above the current line.
    pub shift: usize,
    pub voice: Option<String>,
    /// Start reading immediately.
    pub auto: bool,
    pub exit_at_end: bool,
    pub speech: SpeechConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rate: 1.0,
            context: 0,
            shift: 1,
            voice: None,
            auto: false,
            exit_at_end: false,
            speech: SpeechConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub synthesizer: String,
    pub player: String,
    /// Audio file the synthesizer writes and the player reads.
    pub artifact: PathBuf,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            synthesizer: "say".to_string(),
            player: "play".to_string(),
            artifact: PathBuf::from("/tmp/rodoku.cache.aiff"),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn rate(&self) -> Rate {
        Rate::from_f32(self.rate)
    }

    pub fn speech_settings(&self) -> SpeechSettings {
        SpeechSettings {
            synthesizer: self.speech.synthesizer.clone(),
            player: self.speech.player.clone(),
            artifact: self.speech.artifact.clone(),
            voice: self.voice.clone(),
        }
    }
}
