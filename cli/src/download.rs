use anyhow::{Context, Result};
use log::{info, warn};
use shared::{Episode, Paths};
use std::io::Write;
use std::path::PathBuf;

/// Stream an episode's audio to disk.
///
/// The body goes to a `.tmp` sibling first and is renamed into place only
/// after it is complete and non-empty, so the playable path never holds a
/// half-written file. `on_progress` gets (received, total) byte counts as
/// chunks arrive; the total is absent when the server omits Content-Length.
pub async fn download_episode(
    http: &reqwest::Client,
    episode: &Episode,
    paths: &Paths,
    mut on_progress: impl FnMut(u64, Option<u64>),
) -> Result<PathBuf> {
    let dest = paths.download_path(episode);
    if episode.downloaded(paths) {
        info!("{} already downloaded", episode.title);
        return Ok(dest);
    }
    anyhow::ensure!(
        !episode.audio_url.is_empty(),
        "episode '{}' has no audio url",
        episode.title
    );

    paths.ensure_directories()?;
    let temp = dest.with_extension("mp3.tmp");

    let result = stream_to(http, &episode.audio_url, &temp, &mut on_progress).await;
    if let Err(err) = result {
        if let Err(cleanup) = std::fs::remove_file(&temp) {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove partial download {}: {cleanup}", temp.display());
            }
        }
        return Err(err);
    }

    std::fs::rename(&temp, &dest)
        .with_context(|| format!("failed to move download into {}", dest.display()))?;
    info!("downloaded {} to {}", episode.title, dest.display());
    Ok(dest)
}

async fn stream_to(
    http: &reqwest::Client,
    url: &str,
    temp: &std::path::Path,
    on_progress: &mut impl FnMut(u64, Option<u64>),
) -> Result<()> {
    let mut response = http
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to request {url}"))?
        .error_for_status()
        .with_context(|| format!("download of {url} was rejected"))?;

    let total = response.content_length();
    let mut file = std::fs::File::create(temp)
        .with_context(|| format!("failed to create {}", temp.display()))?;
    let mut received: u64 = 0;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)?;
        received += chunk.len() as u64;
        on_progress(received, total);
    }
    file.flush()?;

    anyhow::ensure!(received > 0, "server returned an empty body for {url}");
    Ok(())
}

/// Console variant: draws a carriage-return progress line on stderr.
pub async fn download_with_console_progress(
    http: &reqwest::Client,
    episode: &Episode,
    paths: &Paths,
) -> Result<PathBuf> {
    eprintln!("Downloading {}", episode.title);
    let path = download_episode(http, episode, paths, |received, total| {
        match total {
            Some(total) if total > 0 => {
                let percent = received * 100 / total;
                eprint!("\r  {percent:>3}% of {:.1} MiB", total as f64 / (1024.0 * 1024.0));
            }
            _ => eprint!("\r  {:.1} MiB", received as f64 / (1024.0 * 1024.0)),
        }
        let _ = std::io::stderr().flush();
    })
    .await?;
    eprintln!();
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::StorageConfig;

    fn test_setup(dir: &std::path::Path) -> (Episode, Paths) {
        let paths = Paths::new(&StorageConfig {
            data_dir: dir.to_path_buf(),
            download_dir: dir.join("mp3s"),
            transcript_dir: dir.join("transcripts"),
        });
        let episode = Episode {
            uuid: "abcdef01".to_string(),
            title: "Test".to_string(),
            podcast_title: "Pod".to_string(),
            podcast_uuid: None,
            published_at: Utc::now(),
            audio_url: String::new(),
            duration: 60,
            starred: false,
            played: false,
            archived: false,
            show_notes: None,
        };
        (episode, paths)
    }

    #[tokio::test]
    async fn already_downloaded_episode_is_not_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let (episode, paths) = test_setup(dir.path());
        paths.ensure_directories().unwrap();
        std::fs::write(paths.download_path(&episode), b"audio").unwrap();

        // No audio url: this would fail if a request were attempted.
        let http = reqwest::Client::new();
        let path = download_episode(&http, &episode, &paths, |_, _| {})
            .await
            .unwrap();
        assert_eq!(path, paths.download_path(&episode));
    }

    #[tokio::test]
    async fn missing_audio_url_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (episode, paths) = test_setup(dir.path());
        let http = reqwest::Client::new();
        let err = download_episode(&http, &episode, &paths, |_, _| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no audio url"));
    }
}
