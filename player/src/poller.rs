use log::debug;
use shared::Transcript;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Background task that re-derives a transcript snapshot from disk while the
/// external transcription job is still writing it.
///
/// Snapshots are published through a watch cell; the session reads the
/// latest one at the top of each tick and decides whether to adopt it. The
/// task stops on its own once a complete document parses, and is joined with
/// a bounded wait (then aborted) at teardown so it can never outlive the
/// session.
pub struct TranscriptPoller {
    rx: watch::Receiver<Transcript>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TranscriptPoller {
    pub fn spawn(path: PathBuf, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(Transcript::load(&path));
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = Transcript::load(&path);
                        let complete = snapshot.loaded;
                        if tx.send(snapshot).is_err() {
                            break;
                        }
                        if complete {
                            debug!("transcript {} fully loaded, poller idling", path.display());
                            // Keep the channel open so the final snapshot
                            // stays readable; just stop re-reading the file.
                            let _ = stop.changed().await;
                            break;
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
        });

        Self {
            rx,
            shutdown,
            handle,
        }
    }

    /// The newest snapshot since the last call, if any.
    pub fn latest(&mut self) -> Option<Transcript> {
        if self.rx.has_changed().unwrap_or(false) {
            Some(self.rx.borrow_and_update().clone())
        } else {
            None
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let mut handle = self.handle;
        if tokio::time::timeout(JOIN_TIMEOUT, &mut handle).await.is_err() {
            handle.abort();
        }
    }
}
