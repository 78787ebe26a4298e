use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use podterm_player::{SessionCommand, SessionUi, SessionView, TranscriptStatus};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use shared::{Episode, Paths, TranscriptionConfig};
use std::time::Duration;

use crate::chat;
use crate::selector::format_duration;
use crate::terminal::TerminalGuard;

/// Full-screen playback view: header, seek gauge, scrolling transcript,
/// status line. Implements the session's UI seam; all state lives in the
/// session, this type only translates keys and draws frames.
pub struct PlayerScreen<'a> {
    guard: &'a mut TerminalGuard,
    transcription: TranscriptionConfig,
    paths: &'a Paths,
    /// Transcript rows in the last drawn frame; the session uses this to
    /// size its scroll window before the next draw.
    viewport: usize,
}

impl<'a> PlayerScreen<'a> {
    pub fn new(
        guard: &'a mut TerminalGuard,
        transcription: TranscriptionConfig,
        paths: &'a Paths,
    ) -> Self {
        Self {
            guard,
            transcription,
            paths,
            viewport: 16,
        }
    }
}

impl SessionUi for PlayerScreen<'_> {
    fn poll_command(&mut self) -> Result<Option<SessionCommand>> {
        // Zero timeout: the session's tick loop provides the pacing.
        if !event::poll(Duration::ZERO)? {
            return Ok(None);
        }
        let Event::Key(key) = event::read()? else {
            return Ok(None);
        };
        if key.kind != KeyEventKind::Press {
            return Ok(None);
        }
        let command = match key.code {
            KeyCode::Char(' ') => Some(SessionCommand::TogglePlayback),
            KeyCode::Right | KeyCode::Char('l') => Some(SessionCommand::SeekForward),
            KeyCode::Left | KeyCode::Char('h') => Some(SessionCommand::SeekBackward),
            KeyCode::Up | KeyCode::Char('k') => Some(SessionCommand::PreviousSegment),
            KeyCode::Down | KeyCode::Char('j') => Some(SessionCommand::NextSegment),
            KeyCode::PageUp => Some(SessionCommand::PageUp),
            KeyCode::PageDown => Some(SessionCommand::PageDown),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(SessionCommand::Quit)
            }
            KeyCode::Char('c') => Some(SessionCommand::EnterChat),
            KeyCode::Char('q') | KeyCode::Esc => Some(SessionCommand::Quit),
            _ => None,
        };
        Ok(command)
    }

    fn transcript_viewport(&self) -> usize {
        self.viewport
    }

    fn render(&mut self, view: &SessionView<'_>) -> Result<()> {
        let mut transcript_rows = self.viewport;
        self.guard.terminal().draw(|frame| {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(2),
                    Constraint::Length(3),
                    Constraint::Min(3),
                    Constraint::Length(1),
                ])
                .split(frame.area());

            draw_header(frame, rows[0], view);
            draw_gauge(frame, rows[1], view);
            transcript_rows = draw_transcript(frame, rows[2], view);
            draw_status(frame, rows[3], view);
        })?;
        self.viewport = transcript_rows;
        Ok(())
    }

    fn enter_chat(&mut self, episode: &Episode) -> Result<()> {
        self.guard.suspend()?;
        let result = chat::run(&self.transcription, episode, self.paths);
        self.guard.resume()?;
        result
    }
}

fn draw_header(frame: &mut ratatui::Frame, area: Rect, view: &SessionView<'_>) {
    let lines = vec![
        Line::from(Span::styled(
            view.episode_title.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            view.podcast_title.to_string(),
            Style::default().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(Paragraph::new(lines), area);
}

fn draw_gauge(frame: &mut ratatui::Frame, area: Rect, view: &SessionView<'_>) {
    let ratio = if view.duration > 0 {
        (view.position as f64 / view.duration as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let state = if view.playback_disabled {
        "unavailable"
    } else if view.playing {
        "playing"
    } else {
        "paused"
    };
    let label = format!(
        "{} / {}  [{state}]",
        format_duration(view.position),
        format_duration(view.duration)
    );
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Blue))
        .ratio(ratio)
        .label(label);
    frame.render_widget(gauge, area);
}

/// Returns the row count actually available for segments so the next tick's
/// scroll math matches what was drawn.
fn draw_transcript(frame: &mut ratatui::Frame, area: Rect, view: &SessionView<'_>) -> usize {
    let inner_height = area.height.saturating_sub(2) as usize;

    let title = match view.transcript_status {
        TranscriptStatus::Available => "Transcript".to_string(),
        TranscriptStatus::Transcribing => {
            format!("Transcript (transcribing {}%)", view.transcription_progress)
        }
        TranscriptStatus::None => "Transcript (none)".to_string(),
    };

    let lines: Vec<Line> = if view.segments.is_empty() {
        let placeholder = match view.transcript_status {
            TranscriptStatus::Transcribing => "Transcription in progress...",
            _ => "No transcript available. Run `podterm transcribe` to create one.",
        };
        vec![Line::from(Span::styled(
            placeholder,
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        view.segments
            .iter()
            .enumerate()
            .skip(view.scroll_offset)
            .take(inner_height.max(1))
            .map(|(i, segment)| {
                let style = if i == view.active_index {
                    Style::default()
                        .bg(Color::Blue)
                        .add_modifier(Modifier::BOLD)
                } else if i < view.active_index {
                    Style::default().fg(Color::DarkGray)
                } else {
                    Style::default()
                };
                let speaker = segment
                    .speaker
                    .as_deref()
                    .map(|s| format!("{s}: "))
                    .unwrap_or_default();
                Line::from(Span::styled(
                    format!(
                        "[{}] {speaker}{}",
                        format_duration(segment.timestamp),
                        segment.text
                    ),
                    style,
                ))
            })
            .collect()
    };

    let paragraph =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(paragraph, area);
    inner_height.max(1)
}

fn draw_status(frame: &mut ratatui::Frame, area: Rect, view: &SessionView<'_>) {
    let text = if let Some(message) = view.status_message {
        Span::styled(message.to_string(), Style::default().fg(Color::Yellow))
    } else if let Some(message) = view.debug_message {
        Span::styled(message.to_string(), Style::default().fg(Color::DarkGray))
    } else {
        let chat = if view.chat_available { "c:Chat  " } else { "" };
        Span::styled(
            format!(
                "Space:Play/Pause  \u{2190}/\u{2192}:Seek  \u{2191}/\u{2193}:Segment  PgUp/PgDn:Scroll  {chat}q:Quit"
            ),
            Style::default().fg(Color::DarkGray),
        )
    };
    frame.render_widget(Paragraph::new(Line::from(text)), area);
}
