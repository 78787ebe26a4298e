use anyhow::{Context, Result};
use log::debug;
use shared::{Episode, Paths};
use std::collections::HashMap;
use std::path::PathBuf;

/// Local episode database, one JSON file mapping episode uuid to metadata.
///
/// Sync merges into it instead of replacing it, so episodes that have fallen
/// out of the listening history keep their local state (show notes, flags).
pub struct EpisodeStore {
    path: PathBuf,
    episodes: HashMap<String, Episode>,
}

impl EpisodeStore {
    pub fn load(paths: &Paths) -> Result<Self> {
        let path = paths.episode_database();
        let episodes = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            HashMap::new()
        };
        debug!("loaded {} episodes from {}", episodes.len(), path.display());
        Ok(Self { path, episodes })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.episodes)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Upsert fetched episodes. Incoming metadata wins field by field, except
    /// show notes, which are fetched separately and kept if the incoming
    /// record lacks them.
    pub fn merge(&mut self, fetched: Vec<Episode>) -> usize {
        let mut added = 0;
        for mut episode in fetched {
            match self.episodes.get(&episode.uuid) {
                Some(existing) => {
                    if episode.show_notes.is_none() {
                        episode.show_notes = existing.show_notes.clone();
                    }
                }
                None => added += 1,
            }
            self.episodes.insert(episode.uuid.clone(), episode);
        }
        added
    }

    pub fn get(&self, uuid: &str) -> Option<&Episode> {
        self.episodes.get(uuid)
    }

    pub fn set_show_notes(&mut self, uuid: &str, notes: String) {
        if let Some(episode) = self.episodes.get_mut(uuid) {
            episode.show_notes = Some(notes);
        }
    }

    /// All episodes, newest first.
    pub fn all(&self) -> Vec<&Episode> {
        let mut episodes: Vec<&Episode> = self.episodes.values().collect();
        episodes.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        episodes
    }

    /// Resolve a user-supplied identifier: exact uuid, uuid prefix, or a
    /// case-insensitive title substring, in that order. Ambiguous matches
    /// are an error rather than a guess.
    pub fn resolve(&self, query: &str) -> Result<&Episode> {
        if let Some(episode) = self.episodes.get(query) {
            return Ok(episode);
        }

        let by_prefix: Vec<&Episode> = self
            .episodes
            .values()
            .filter(|e| e.uuid.starts_with(query))
            .collect();
        if by_prefix.len() == 1 {
            return Ok(by_prefix[0]);
        }
        if by_prefix.len() > 1 {
            anyhow::bail!("'{query}' matches {} episode uuids", by_prefix.len());
        }

        let needle = query.to_lowercase();
        let by_title: Vec<&Episode> = self
            .episodes
            .values()
            .filter(|e| e.title.to_lowercase().contains(&needle))
            .collect();
        match by_title.len() {
            1 => Ok(by_title[0]),
            0 => anyhow::bail!("no episode matches '{query}'; run `podterm sync` first"),
            n => anyhow::bail!("'{query}' matches {n} episode titles, be more specific"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shared::StorageConfig;

    fn test_paths(dir: &std::path::Path) -> Paths {
        Paths::new(&StorageConfig {
            data_dir: dir.to_path_buf(),
            download_dir: dir.join("mp3s"),
            transcript_dir: dir.join("transcripts"),
        })
    }

    fn episode(uuid: &str, title: &str, year: i32) -> Episode {
        Episode {
            uuid: uuid.to_string(),
            title: title.to_string(),
            podcast_title: "Test Podcast".to_string(),
            podcast_uuid: None,
            published_at: Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap(),
            audio_url: String::new(),
            duration: 600,
            starred: false,
            played: false,
            archived: false,
            show_notes: None,
        }
    }

    #[test]
    fn roundtrip_and_merge_preserve_show_notes() {
        let dir = tempfile::tempdir().unwrap();
        let paths = test_paths(dir.path());

        let mut store = EpisodeStore::load(&paths).unwrap();
        assert!(store.is_empty());

        let mut first = episode("aaaa-1111", "First", 2024);
        first.show_notes = Some("notes".to_string());
        assert_eq!(store.merge(vec![first]), 1);

        // Re-sync without notes must not erase them.
        assert_eq!(store.merge(vec![episode("aaaa-1111", "First", 2024)]), 0);
        assert_eq!(
            store.get("aaaa-1111").unwrap().show_notes.as_deref(),
            Some("notes")
        );

        store.save().unwrap();
        let reloaded = EpisodeStore::load(&paths).unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn all_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EpisodeStore::load(&test_paths(dir.path())).unwrap();
        store.merge(vec![
            episode("aaaa", "Old", 2020),
            episode("bbbb", "New", 2025),
        ]);
        let titles: Vec<&str> = store.all().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Old"]);
    }

    #[test]
    fn resolve_prefers_uuid_then_prefix_then_title() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EpisodeStore::load(&test_paths(dir.path())).unwrap();
        store.merge(vec![
            episode("abc-123", "Rust in Production", 2024),
            episode("abd-456", "Another Show", 2024),
        ]);

        assert_eq!(store.resolve("abc-123").unwrap().uuid, "abc-123");
        assert_eq!(store.resolve("abd").unwrap().uuid, "abd-456");
        assert_eq!(store.resolve("rust").unwrap().uuid, "abc-123");
        assert!(store.resolve("ab").is_err());
        assert!(store.resolve("nope").is_err());
    }
}
