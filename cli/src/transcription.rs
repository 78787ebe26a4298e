use anyhow::{Context, Result};
use log::{info, warn};
use podterm_player::{GroupedChild, TranscriptionSignal};
use shared::{Episode, Paths, TranscriptionConfig};
use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Schema handed to the model: one object per spoken segment.
const SEGMENT_SCHEMA: &str = "timestamp str: mm:ss of segment start, text, speaker";

/// Registry of running transcription jobs, keyed by episode uuid.
///
/// Each job is an external model CLI invocation whose stdout is the
/// transcript file itself, which is why the player can tail the file while
/// the job is still running. Jobs are killed as a group on shutdown so a
/// quit never leaves a model call running headless.
pub struct TranscriptionJobs {
    command: String,
    model: String,
    jobs: HashMap<String, GroupedChild>,
}

impl TranscriptionJobs {
    pub fn new(config: &TranscriptionConfig) -> Self {
        Self {
            command: config.command.clone(),
            model: config.model.clone(),
            jobs: HashMap::new(),
        }
    }

    /// Start a background transcription unless the transcript already exists
    /// or a job for this episode is already running.
    pub fn start(&mut self, episode: &Episode, paths: &Paths) -> Result<bool> {
        if self.in_progress(&episode.uuid) {
            return Ok(false);
        }
        let transcript_path = paths.transcript_path(episode);
        if transcript_path.exists() {
            return Ok(false);
        }

        let audio_path = paths.download_path(episode);
        anyhow::ensure!(
            episode.downloaded(paths),
            "episode '{}' is not downloaded yet",
            episode.title
        );
        paths.ensure_directories()?;

        let output = std::fs::File::create(&transcript_path)
            .with_context(|| format!("failed to create {}", transcript_path.display()))?;

        let mut command = Command::new(&self.command);
        command
            .arg("-m")
            .arg(&self.model)
            .arg("-a")
            .arg(&audio_path)
            .arg("--schema-multi")
            .arg(SEGMENT_SCHEMA)
            .arg("transcript")
            .stdin(Stdio::null())
            .stdout(Stdio::from(output))
            .stderr(Stdio::null());

        let child = GroupedChild::spawn(command)
            .with_context(|| format!("failed to start transcription via '{}'", self.command))?;
        info!(
            "transcribing {} -> {}",
            episode.title,
            transcript_path.display()
        );
        self.jobs.insert(episode.uuid.clone(), child);
        Ok(true)
    }

    /// Start a job and block until it finishes. Used by the standalone
    /// `transcribe` command; the interactive player polls instead.
    pub fn run_to_completion(&mut self, episode: &Episode, paths: &Paths) -> Result<()> {
        let path = paths.transcript_path(episode);
        if !self.start(episode, paths)? && !self.in_progress(&episode.uuid) {
            if shared::Transcript::load(&path).loaded {
                info!("transcript for {} already exists", episode.title);
                return Ok(());
            }
            // A partial file left behind by an interrupted job would
            // otherwise block re-transcription forever; redo it.
            warn!("replacing incomplete transcript {}", path.display());
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            self.start(episode, paths)?;
        }
        while self.in_progress(&episode.uuid) {
            std::thread::sleep(Duration::from_millis(500));
        }
        anyhow::ensure!(
            shared::Transcript::load(&path).loaded,
            "transcription finished but {} is not a complete transcript",
            path.display()
        );
        Ok(())
    }

    /// Kill every outstanding job. Idempotent.
    pub fn shutdown(&mut self) {
        for (uuid, mut job) in self.jobs.drain() {
            if job.is_alive() {
                warn!("stopping transcription job for {uuid}");
            }
            job.terminate();
        }
    }
}

impl TranscriptionSignal for TranscriptionJobs {
    /// Liveness check that also reaps finished jobs out of the registry.
    fn in_progress(&mut self, episode_uuid: &str) -> bool {
        let Some(job) = self.jobs.get_mut(episode_uuid) else {
            return false;
        };
        if job.is_alive() {
            true
        } else {
            self.jobs.remove(episode_uuid);
            false
        }
    }
}

impl Drop for TranscriptionJobs {
    fn drop(&mut self) {
        self.shutdown();
    }
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

    fn jobs_with_command(command: &str) -> TranscriptionJobs {
        TranscriptionJobs::new(&TranscriptionConfig {
            command: command.to_string(),
            model: "test-model".to_string(),
            poll_interval_millis: 1000,
        })
    }

    #[test]
    fn start_requires_a_downloaded_episode() {
        let dir = tempfile::tempdir().unwrap();
        let (episode, paths) = test_setup(dir.path());
        let mut jobs = jobs_with_command("sleep");
        assert!(jobs.start(&episode, &paths).is_err());
        assert!(!jobs.in_progress(&episode.uuid));
    }

    #[test]
    fn existing_transcript_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let (episode, paths) = test_setup(dir.path());
        paths.ensure_directories().unwrap();
        std::fs::write(paths.download_path(&episode), b"audio").unwrap();
        std::fs::write(paths.transcript_path(&episode), b"{\"items\":[]}").unwrap();

        let mut jobs = jobs_with_command("sleep");
        assert!(!jobs.start(&episode, &paths).unwrap());
    }

    #[test]
    fn incomplete_transcript_is_redone_not_reported_complete() {
        let dir = tempfile::tempdir().unwrap();
        let (episode, paths) = test_setup(dir.path());
        paths.ensure_directories().unwrap();
        std::fs::write(paths.download_path(&episode), b"audio").unwrap();
        // Leftover from an interrupted job: truncated mid-document.
        std::fs::write(
            paths.transcript_path(&episode),
            br#"{"items":[{"timestamp":"00:05","text":"hello"},{"timestamp":"00:1"#,
        )
        .unwrap();

        // The rerun job exits without producing a document, so completion
        // must be reported as a failure, never as success.
        let mut jobs = jobs_with_command("true");
        let err = jobs.run_to_completion(&episode, &paths).unwrap_err();
        assert!(err.to_string().contains("not a complete transcript"));

        // The stale partial was replaced by the fresh run's output.
        let raw = std::fs::read_to_string(paths.transcript_path(&episode)).unwrap();
        assert!(!raw.contains("hello"));
    }

    #[test]
    fn complete_transcript_short_circuits_run() {
        let dir = tempfile::tempdir().unwrap();
        let (episode, paths) = test_setup(dir.path());
        paths.ensure_directories().unwrap();
        std::fs::write(paths.download_path(&episode), b"audio").unwrap();
        std::fs::write(
            paths.transcript_path(&episode),
            br#"{"items":[{"timestamp":"00:05","text":"hello"}]}"#,
        )
        .unwrap();

        // "false" would fail instantly if a job were spawned.
        let mut jobs = jobs_with_command("false");
        jobs.run_to_completion(&episode, &paths).unwrap();
    }

    #[test]
    fn jobs_are_tracked_and_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let (episode, paths) = test_setup(dir.path());
        paths.ensure_directories().unwrap();
        std::fs::write(paths.download_path(&episode), b"audio").unwrap();

        // `sleep -m test-model ...` exits immediately with an error, which
        // is exactly what a dead job looks like to the registry.
        let mut jobs = jobs_with_command("sleep");
        assert!(jobs.start(&episode, &paths).unwrap());
        std::thread::sleep(Duration::from_millis(200));
        assert!(!jobs.in_progress(&episode.uuid));

        jobs.shutdown();
        jobs.shutdown();
    }
}
