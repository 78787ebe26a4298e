use anyhow::Result;
use std::path::PathBuf;

use crate::config::StorageConfig;
use crate::episode::Episode;

/// All on-disk locations derive from here. The transcript path in particular
/// must be deterministic: the transcription job writes it and the player
/// polls it without any coordination beyond the path itself.
#[derive(Debug, Clone)]
pub struct Paths {
    data_dir: PathBuf,
    download_dir: PathBuf,
    transcript_dir: PathBuf,
}

impl Paths {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            data_dir: storage.data_dir.clone(),
            download_dir: storage.download_dir.clone(),
            transcript_dir: storage.transcript_dir.clone(),
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.data_dir, &self.download_dir, &self.transcript_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn episode_database(&self) -> PathBuf {
        self.data_dir.join("episodes.json")
    }

    pub fn download_path(&self, episode: &Episode) -> PathBuf {
        self.download_dir.join(episode.audio_filename())
    }

    pub fn transcript_path(&self, episode: &Episode) -> PathBuf {
        self.transcript_dir.join(episode.transcript_filename())
    }
}

/// Lowercases and collapses anything non-alphanumeric into single dashes,
/// so episode titles become safe filename stems.
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        out.push_str("episode");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_punctuation() {
        assert_eq!(sanitize_title("Ep. 42: The Answer!"), "ep-42-the-answer");
    }

    #[test]
    fn sanitize_handles_unicode_and_empty() {
        assert_eq!(sanitize_title("Héllo — wörld"), "h-llo-w-rld");
        assert_eq!(sanitize_title("???"), "episode");
    }
}
