use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Deserialize;
use shared::{Config, Episode};

/// Pocket Casts web API client. All endpoints want a bearer token; the
/// listing endpoints are POSTs even though they only read.
pub struct PocketcastClient {
    http: reqwest::Client,
    api_base_url: String,
    notes_base_url: String,
    token: String,
    history_limit: u32,
}

#[derive(Deserialize)]
struct EpisodeListing {
    #[serde(default)]
    episodes: Vec<ApiEpisode>,
}

/// Wire shape of one episode as the API returns it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEpisode {
    uuid: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    podcast_title: Option<String>,
    #[serde(default)]
    podcast_uuid: Option<String>,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    starred: bool,
    #[serde(default)]
    played: bool,
    #[serde(default)]
    archived: bool,
}

#[derive(Deserialize)]
struct ShowNotesResponse {
    #[serde(default)]
    show_notes: Option<String>,
}

impl ApiEpisode {
    fn into_episode(self) -> Episode {
        let published_at = self
            .published
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Episode {
            uuid: self.uuid,
            title: self.title.unwrap_or_else(|| "Unknown Title".to_string()),
            podcast_title: self
                .podcast_title
                .unwrap_or_else(|| "Unknown Podcast".to_string()),
            podcast_uuid: self.podcast_uuid,
            published_at,
            audio_url: self.url.unwrap_or_default(),
            duration: self.duration.unwrap_or(0.0).max(0.0) as u64,
            starred: self.starred,
            played: self.played,
            archived: self.archived,
            show_notes: None,
        }
    }
}

impl PocketcastClient {
    pub fn new(config: &Config) -> Result<Self> {
        let token = config.api_token().context(
            "no API token configured; set POCKETCASTS_TOKEN or sync.token in the config file",
        )?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_base_url: config.sync.api_base_url.clone(),
            notes_base_url: config.sync.notes_base_url.clone(),
            token,
            history_limit: config.sync.history_limit,
        })
    }

    /// Recently played plus starred episodes, deduplicated by uuid.
    pub async fn fetch_episodes(&self) -> Result<Vec<Episode>> {
        info!("fetching recently played episodes");
        let mut episodes = self
            .listing("user/history", serde_json::json!({ "limit": self.history_limit }))
            .await
            .context("failed to fetch listening history")?;

        info!("fetching starred episodes");
        let starred = self
            .listing("user/starred", serde_json::json!({}))
            .await
            .context("failed to fetch starred episodes")?;

        for episode in starred {
            if !episodes.iter().any(|e| e.uuid == episode.uuid) {
                episodes.push(episode);
            }
        }

        // The server inserts a placeholder for brand-new accounts.
        episodes.retain(|e| !e.title.contains("Example Episode"));
        Ok(episodes)
    }

    async fn listing(&self, endpoint: &str, body: serde_json::Value) -> Result<Vec<Episode>> {
        let url = format!("{}/{}", self.api_base_url, endpoint);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("cache-control", "no-cache")
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("request to {url} was rejected"))?;
        let listing: EpisodeListing = response.json().await?;
        Ok(listing
            .episodes
            .into_iter()
            .map(ApiEpisode::into_episode)
            .collect())
    }

    /// Show notes live on a separate cache host. A failure here is logged
    /// and swallowed; notes are decoration, not required metadata.
    pub async fn fetch_show_notes(&self, episode_uuid: &str) -> Option<String> {
        let url = format!("{}/episode/show_notes/{episode_uuid}", self.notes_base_url);
        let result: Result<ShowNotesResponse> = async {
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .header("cache-control", "no-cache")
                .send()
                .await?
                .error_for_status()?;
            Ok(response.json().await?)
        }
        .await;
        match result {
            Ok(body) => body.show_notes,
            Err(err) => {
                warn!("failed to fetch show notes for {episode_uuid}: {err:#}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_episode_maps_to_local_model() {
        let raw = r#"{
            "uuid": "abc-123",
            "title": "Deep Dive",
            "podcastTitle": "The Show",
            "podcastUuid": "pod-1",
            "published": "2025-03-01T10:00:00Z",
            "url": "https://example.com/ep.mp3",
            "duration": 1234.7,
            "starred": true
        }"#;
        let api: ApiEpisode = serde_json::from_str(raw).unwrap();
        let episode = api.into_episode();
        assert_eq!(episode.uuid, "abc-123");
        assert_eq!(episode.podcast_title, "The Show");
        assert_eq!(episode.duration, 1234);
        assert!(episode.starred);
        assert!(!episode.played);
        assert_eq!(episode.audio_url, "https://example.com/ep.mp3");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let api: ApiEpisode = serde_json::from_str(r#"{"uuid": "only-uuid"}"#).unwrap();
        let episode = api.into_episode();
        assert_eq!(episode.title, "Unknown Title");
        assert_eq!(episode.podcast_title, "Unknown Podcast");
        assert_eq!(episode.duration, 0);
        assert!(episode.audio_url.is_empty());
    }

    #[test]
    fn listing_tolerates_missing_episode_array() {
        let listing: EpisodeListing = serde_json::from_str("{}").unwrap();
        assert!(listing.episodes.is_empty());
    }
}
