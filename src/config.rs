use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const BASE_URL_ENV: &str = "MINDMATE_API_BASE_URL";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    #[serde(default)]
    pub tts_enabled: bool,
    #[serde(default)]
    pub speech: SpeechConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SpeechConfig {
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Program used for speech output, e.g. `espeak-ng`. Unset disables TTS.
    #[serde(default)]
    pub synthesizer: Option<String>,
    /// Command whose stdout is the recognized utterance. Unset disables voice input.
    #[serde(default)]
    pub recognizer: Option<Vec<String>>,
}

fn default_api_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_lang() -> String {
    "en-US".to_string()
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            synthesizer: None,
            recognizer: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            download_dir: None,
            tts_enabled: false,
            speech: SpeechConfig::default(),
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "mindmate", "mindmate")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reads the config file (explicit path or the platform default) and
    /// applies the base URL environment override.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut config = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::from_toml(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            _ => Config::default(),
        };

        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_base_url = url;
            }
        }

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(|| {
                UserDirs::new().and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
            })
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
