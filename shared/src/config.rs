use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub player: PlayerConfig,
    pub transcription: TranscriptionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub notes_base_url: String,
    /// Bearer token for the Pocket Casts API. POCKETCASTS_TOKEN overrides this.
    pub token: Option<String>,
    pub history_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// External decoder binary. Must support -nodisp, -autoexit and -ss.
    pub command: String,
    pub seek_step_seconds: i64,
    pub tick_millis: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub command: String,
    pub model: String,
    pub poll_interval_millis: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub download_dir: PathBuf,
    pub transcript_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.pocketcasts.com".to_string(),
            notes_base_url: "https://cache.pocketcasts.com".to_string(),
            token: None,
            history_limit: 100,
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: "ffplay".to_string(),
            seek_step_seconds: 30,
            tick_millis: 100,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            command: "llm".to_string(),
            model: "gemini-2.5-pro-exp-03-25".to_string(),
            poll_interval_millis: 1000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("podterm");
        Self {
            download_dir: data_dir.join("mp3s"),
            transcript_dir: data_dir.join("transcripts"),
            data_dir,
        }
    }
}

impl Config {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("podterm").join("config.yaml"))
    }

    /// Load the config file if present, otherwise fall back to defaults.
    pub fn load() -> Result<Self> {
        let Some(path) = Self::config_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("no config directory available")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_yaml::to_string(self)?)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Effective API token: environment wins over the config file.
    pub fn api_token(&self) -> Option<String> {
        std::env::var("POCKETCASTS_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.sync.token.clone())
    }
}
