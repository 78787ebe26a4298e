use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::paths::{sanitize_title, Paths};

/// One podcast episode as stored in the local episode database.
///
/// Immutable while a playback session runs; show notes are an explicit
/// optional field populated at sync time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub uuid: String,
    pub title: String,
    #[serde(default = "unknown_podcast")]
    pub podcast_title: String,
    #[serde(default)]
    pub podcast_uuid: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub audio_url: String,
    /// Seconds.
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub played: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub show_notes: Option<String>,
}

fn unknown_podcast() -> String {
    "Unknown Podcast".to_string()
}

impl Episode {
    /// Filename stem shared by the audio file and the transcript: sanitized
    /// title plus the first six uuid characters to disambiguate reruns.
    fn filename_stem(&self) -> String {
        let short = &self.uuid[..self.uuid.len().min(6)];
        format!("{}-{}", sanitize_title(&self.title), short)
    }

    pub fn audio_filename(&self) -> String {
        format!("{}.mp3", self.filename_stem())
    }

    pub fn transcript_filename(&self) -> String {
        format!("{}.json", self.filename_stem())
    }

    /// Downloaded means the file exists and is non-empty; a zero-byte file
    /// is a failed download and must be retried.
    pub fn downloaded(&self, paths: &Paths) -> bool {
        let path = paths.download_path(self);
        std::fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(title: &str, uuid: &str) -> Episode {
        Episode {
            uuid: uuid.to_string(),
            title: title.to_string(),
            podcast_title: "Test Podcast".to_string(),
            podcast_uuid: None,
            published_at: Utc::now(),
            audio_url: String::new(),
            duration: 600,
            starred: false,
            played: false,
            archived: false,
            show_notes: None,
        }
    }

    #[test]
    fn filenames_are_sanitized_and_disambiguated() {
        let ep = episode("My Great Show #12", "abcdef01-2345");
        assert_eq!(ep.audio_filename(), "my-great-show-12-abcdef.mp3");
        assert_eq!(ep.transcript_filename(), "my-great-show-12-abcdef.json");
    }

    #[test]
    fn short_uuid_does_not_panic() {
        let ep = episode("x", "abc");
        assert_eq!(ep.audio_filename(), "x-abc.mp3");
    }

    #[test]
    fn database_roundtrip() {
        let ep = episode("Roundtrip", "abcdef01");
        let json = serde_json::to_string(&ep).unwrap();
        let back: Episode = serde_json::from_str(&json).unwrap();
        assert_eq!(back.uuid, ep.uuid);
        assert_eq!(back.title, ep.title);
        assert_eq!(back.duration, 600);
    }
}
