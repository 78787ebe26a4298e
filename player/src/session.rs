use anyhow::Result;
use log::{info, warn};
use shared::{Config, Episode, Paths, Transcript, TranscriptSegment};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::cursor::TranscriptCursor;
use crate::poller::TranscriptPoller;
use crate::position::PositionTracker;
use crate::process::PlayerProcess;

/// Keyboard-driven transitions the UI can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    TogglePlayback,
    SeekForward,
    SeekBackward,
    PreviousSegment,
    NextSegment,
    PageUp,
    PageDown,
    EnterChat,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptStatus {
    None,
    Transcribing,
    Available,
}

/// Everything the render collaborator needs for one frame. Built fresh each
/// tick after input and position recomputation, so a frame never mixes state
/// from two ticks.
pub struct SessionView<'a> {
    pub episode_title: &'a str,
    pub podcast_title: &'a str,
    pub position: u64,
    pub duration: u64,
    pub playing: bool,
    pub playback_disabled: bool,
    pub segments: &'a [TranscriptSegment],
    pub active_index: usize,
    pub scroll_offset: usize,
    pub transcript_status: TranscriptStatus,
    pub transcription_progress: u8,
    pub chat_available: bool,
    pub status_message: Option<&'a str>,
    pub debug_message: Option<&'a str>,
}

/// Render/input collaborator driven by the session's tick loop.
pub trait SessionUi {
    /// Bounded, non-blocking keypress poll; `None` when nothing is pending.
    fn poll_command(&mut self) -> Result<Option<SessionCommand>>;
    /// Rows available for transcript segments in the current layout.
    fn transcript_viewport(&self) -> usize;
    fn render(&mut self, view: &SessionView<'_>) -> Result<()>;
    /// Suspend the display and run the external chat collaborator. Playback
    /// is already paused when this is called.
    fn enter_chat(&mut self, episode: &Episode) -> Result<()>;
}

/// "Is the external transcription job still running for this episode?"
pub trait TranscriptionSignal {
    fn in_progress(&mut self, episode_uuid: &str) -> bool;
}

/// Owns the playback state machine: Stopped -> Playing <-> Paused ->
/// Stopped(final). At most one decoder process exists per session; every
/// seek is a terminate-then-spawn pair behind one method.
pub struct PlaybackSession {
    episode: Episode,
    audio_path: PathBuf,
    player_command: String,
    seek_step: i64,
    tick: Duration,
    tracker: PositionTracker,
    cursor: TranscriptCursor,
    process: Option<PlayerProcess>,
    transcript: Transcript,
    poller: Option<TranscriptPoller>,
    /// Unrecoverable setup failure; playback stays disabled but the session
    /// (and transcript view) keeps running.
    playback_disabled: Option<String>,
    status_message: Option<String>,
    debug_message: Option<String>,
    quit: bool,
}

impl PlaybackSession {
    pub fn new(episode: Episode, paths: &Paths, config: &Config) -> Self {
        let audio_path = paths.download_path(&episode);
        let transcript_path = paths.transcript_path(&episode);

        let playback_disabled = match std::fs::metadata(&audio_path) {
            Ok(meta) if meta.len() > 0 => None,
            Ok(_) => Some(format!(
                "Audio file is empty: {}. Try downloading again.",
                audio_path.display()
            )),
            Err(_) => Some(format!("Audio file not found: {}", audio_path.display())),
        };

        let transcript = Transcript::load(&transcript_path);
        let poller = Some(TranscriptPoller::spawn(
            transcript_path,
            Duration::from_millis(config.transcription.poll_interval_millis),
        ));

        Self {
            tracker: PositionTracker::new(episode.duration),
            cursor: TranscriptCursor::default(),
            audio_path,
            player_command: config.player.command.clone(),
            seek_step: config.player.seek_step_seconds,
            tick: Duration::from_millis(config.player.tick_millis),
            process: None,
            transcript,
            poller,
            playback_disabled,
            status_message: None,
            debug_message: None,
            quit: false,
            episode,
        }
    }

    pub fn playing(&self) -> bool {
        self.process.is_some()
    }

    /// Drive the tick loop until the user quits or the UI fails, then run
    /// the unconditional cleanup path either way.
    pub async fn run<U, T>(&mut self, ui: &mut U, transcription: &mut T) -> Result<()>
    where
        U: SessionUi,
        T: TranscriptionSignal,
    {
        let result = self.run_loop(ui, transcription).await;
        self.shutdown().await;
        result
    }

    async fn run_loop<U, T>(&mut self, ui: &mut U, transcription: &mut T) -> Result<()>
    where
        U: SessionUi,
        T: TranscriptionSignal,
    {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if let Some(command) = ui.poll_command()? {
                self.apply(command, ui)?;
                if self.quit {
                    return Ok(());
                }
            }

            self.tick_update(ui.transcript_viewport());

            let status = self.transcript_status(transcription);
            let view = self.view(status);
            ui.render(&view)?;

            ticker.tick().await;
        }
    }

    /// Input is applied before position/cursor recomputation; any pending
    /// status or debug line is dismissed by the keypress.
    fn apply<U: SessionUi>(&mut self, command: SessionCommand, ui: &mut U) -> Result<()> {
        self.status_message = None;
        self.debug_message = None;
        match command {
            SessionCommand::TogglePlayback => self.toggle_playback(),
            SessionCommand::SeekForward => self.seek_by(self.seek_step),
            SessionCommand::SeekBackward => self.seek_by(-self.seek_step),
            SessionCommand::PreviousSegment => {
                if let Some(timestamp) = self.cursor.previous(&self.transcript.items) {
                    self.seek_to(timestamp);
                }
            }
            SessionCommand::NextSegment => {
                if let Some(timestamp) = self.cursor.next(&self.transcript.items) {
                    self.seek_to(timestamp);
                }
            }
            SessionCommand::PageUp => self.cursor.page_up(),
            SessionCommand::PageDown => self
                .cursor
                .page_down(self.transcript.items.len(), ui.transcript_viewport()),
            SessionCommand::EnterChat => self.enter_chat(ui)?,
            SessionCommand::Quit => self.quit = true,
        }
        Ok(())
    }

    fn toggle_playback(&mut self) {
        if let Some(mut process) = self.process.take() {
            process.terminate();
            self.tracker.stop();
        } else {
            self.start_playback();
        }
    }

    fn start_playback(&mut self) {
        if let Some(reason) = &self.playback_disabled {
            self.status_message = Some(reason.clone());
            return;
        }
        let offset = self.tracker.current_position();
        match PlayerProcess::spawn(&self.player_command, &self.audio_path, offset) {
            Ok(process) => {
                self.tracker.start(offset);
                self.process = Some(process);
                self.debug_message = Some(format!("Playing via {}", self.player_command));
            }
            Err(err) => {
                warn!("failed to start playback: {err:#}");
                self.status_message = Some(format!("Failed to start playback: {err}"));
            }
        }
    }

    fn seek_by(&mut self, delta: i64) {
        let target = self.tracker.seek_by(delta);
        self.respawn_if_playing(target);
    }

    fn seek_to(&mut self, target: u64) {
        let target = self.tracker.seek_to(target);
        self.respawn_if_playing(target);
    }

    /// Seek emulation: the decoder cannot reposition a live stream, so a
    /// seek while playing is one atomic terminate-then-spawn at the new
    /// offset. A spawn failure reverts to Paused, never to a dangling state.
    fn respawn_if_playing(&mut self, offset: u64) {
        let Some(mut process) = self.process.take() else {
            return;
        };
        process.terminate();
        match PlayerProcess::spawn(&self.player_command, &self.audio_path, offset) {
            Ok(process) => {
                self.tracker.start(offset);
                self.process = Some(process);
            }
            Err(err) => {
                warn!("failed to respawn player at {offset}s: {err:#}");
                self.tracker.stop();
                self.status_message = Some(format!("Failed to restart playback: {err}"));
            }
        }
    }

    /// Playback is suspended for the duration of the chat collaborator and
    /// restored afterwards. Chat failures surface on the status line.
    fn enter_chat<U: SessionUi>(&mut self, ui: &mut U) -> Result<()> {
        if !self.transcript.loaded {
            self.status_message =
                Some("Chat unavailable - waiting for transcription to complete".to_string());
            return Ok(());
        }

        let was_playing = self.process.is_some();
        if let Some(mut process) = self.process.take() {
            process.terminate();
            self.tracker.stop();
        }

        if let Err(err) = ui.enter_chat(&self.episode) {
            warn!("chat session failed: {err:#}");
            self.status_message = Some(format!("Chat failed: {err}"));
        }

        if was_playing {
            self.start_playback();
        }
        Ok(())
    }

    fn tick_update(&mut self, viewport_height: usize) {
        self.adopt_latest_transcript();

        if self.process.is_some() && self.tracker.has_reached_end() {
            // End of media: same teardown as a user stop, position pinned
            // at the duration.
            if let Some(mut process) = self.process.take() {
                process.terminate();
            }
            self.tracker.stop();
            self.debug_message = Some("Playback finished".to_string());
        } else if let Some(process) = self.process.as_mut() {
            if !process.is_alive() {
                // The decoder exited on its own (stream ended early or the
                // process died); revert to Paused, never fatal.
                self.process = None;
                self.tracker.stop();
                self.status_message = Some("Player process exited".to_string());
            }
        }

        self.cursor.update(
            &self.transcript.items,
            self.tracker.current_position(),
            viewport_height,
        );
    }

    /// Adopt the poller's newest snapshot unless it shrank, which would mean
    /// we caught the file mid-write and parsed fewer items than we already
    /// have.
    fn adopt_latest_transcript(&mut self) {
        let Some(poller) = self.poller.as_mut() else {
            return;
        };
        if let Some(snapshot) = poller.latest() {
            self.adopt_snapshot(snapshot);
        }
    }

    fn adopt_snapshot(&mut self, snapshot: Transcript) {
        if snapshot.items.len() >= self.transcript.items.len() {
            self.transcript = snapshot;
        }
    }

    fn transcript_status<T: TranscriptionSignal>(
        &mut self,
        transcription: &mut T,
    ) -> TranscriptStatus {
        if self.transcript.loaded {
            TranscriptStatus::Available
        } else if transcription.in_progress(&self.episode.uuid) || self.transcript.started {
            TranscriptStatus::Transcribing
        } else {
            TranscriptStatus::None
        }
    }

    /// Coverage estimate: last transcribed timestamp over episode duration,
    /// capped at 99 until the document is complete.
    fn transcription_progress(&self, status: TranscriptStatus) -> u8 {
        match status {
            TranscriptStatus::Available => 100,
            TranscriptStatus::None => 0,
            TranscriptStatus::Transcribing => {
                let Some(last) = self.transcript.items.last() else {
                    return 0;
                };
                if self.episode.duration == 0 {
                    return 0;
                }
                ((last.timestamp * 100 / self.episode.duration).min(99)) as u8
            }
        }
    }

    fn view(&self, status: TranscriptStatus) -> SessionView<'_> {
        SessionView {
            episode_title: &self.episode.title,
            podcast_title: &self.episode.podcast_title,
            position: self.tracker.current_position(),
            duration: self.tracker.duration(),
            playing: self.process.is_some(),
            playback_disabled: self.playback_disabled.is_some(),
            segments: &self.transcript.items,
            active_index: self.cursor.active_index(),
            scroll_offset: self.cursor.scroll_offset(),
            transcript_status: status,
            transcription_progress: self.transcription_progress(status),
            chat_available: self.transcript.loaded,
            status_message: self.status_message.as_deref(),
            debug_message: self.debug_message.as_deref(),
        }
    }

    /// Unconditional, idempotent teardown: kill the decoder group, stop and
    /// join the poller. Safe to call on every exit path.
    pub async fn shutdown(&mut self) {
        if let Some(mut process) = self.process.take() {
            info!("terminating player for {}", self.episode.title);
            process.terminate();
        }
        self.tracker.stop();
        if let Some(poller) = self.poller.take() {
            poller.shutdown().await;
        }
    }
}
