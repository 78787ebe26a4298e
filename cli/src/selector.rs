use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use shared::{Episode, Paths};
use std::time::Duration;

use crate::terminal::Tui;

/// What the user picked; the caller owns the follow-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorOutcome {
    Play(String),
    Download(String),
    Refresh,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    All,
    Starred,
    Downloaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sort {
    DatePublished,
    Title,
    Duration,
}

/// Episode browser: list on the left, show notes for the highlighted episode
/// on the right. Filtering and sorting are view-only; the underlying episode
/// set is whatever the caller passed in.
pub struct EpisodeSelector {
    episodes: Vec<Episode>,
    downloaded: Vec<bool>,
    transcribed: Vec<bool>,
    filter: Filter,
    sort: Sort,
    search: String,
    searching: bool,
    selected: usize,
}

impl EpisodeSelector {
    pub fn new(episodes: Vec<Episode>, paths: &Paths) -> Self {
        let downloaded = episodes.iter().map(|e| e.downloaded(paths)).collect();
        let transcribed = episodes
            .iter()
            .map(|e| paths.transcript_path(e).exists())
            .collect();
        Self {
            episodes,
            downloaded,
            transcribed,
            filter: Filter::All,
            sort: Sort::DatePublished,
            search: String::new(),
            searching: false,
            selected: 0,
        }
    }

    /// Blocking select loop; returns when the user commits to an action.
    pub fn run(&mut self, terminal: &mut Tui) -> Result<SelectorOutcome> {
        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if !event::poll(Duration::from_millis(100))? {
                continue;
            }
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }

            if self.searching {
                match key.code {
                    KeyCode::Esc => {
                        self.search.clear();
                        self.searching = false;
                    }
                    KeyCode::Enter => self.searching = false,
                    KeyCode::Backspace => {
                        self.search.pop();
                        self.clamp_selection();
                    }
                    KeyCode::Char(c) => {
                        self.search.push(c);
                        self.clamp_selection();
                    }
                    _ => {}
                }
                continue;
            }

            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(SelectorOutcome::Quit),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(SelectorOutcome::Quit)
                }
                KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
                KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
                KeyCode::PageUp => self.move_selection(-10),
                KeyCode::PageDown => self.move_selection(10),
                KeyCode::Char('s') => {
                    self.filter = match self.filter {
                        Filter::All => Filter::Starred,
                        Filter::Starred => Filter::Downloaded,
                        Filter::Downloaded => Filter::All,
                    };
                    self.clamp_selection();
                }
                KeyCode::Char('t') => {
                    self.sort = match self.sort {
                        Sort::DatePublished => Sort::Title,
                        Sort::Title => Sort::Duration,
                        Sort::Duration => Sort::DatePublished,
                    };
                }
                KeyCode::Char('/') => {
                    self.search.clear();
                    self.searching = true;
                }
                KeyCode::Char('r') => return Ok(SelectorOutcome::Refresh),
                KeyCode::Char('d') => {
                    if let Some(episode) = self.current() {
                        return Ok(SelectorOutcome::Download(episode.uuid.clone()));
                    }
                }
                KeyCode::Enter => {
                    if let Some(episode) = self.current() {
                        return Ok(SelectorOutcome::Play(episode.uuid.clone()));
                    }
                }
                _ => {}
            }
        }
    }

    fn visible(&self) -> Vec<usize> {
        let needle = self.search.to_lowercase();
        let mut indices: Vec<usize> = (0..self.episodes.len())
            .filter(|&i| {
                let episode = &self.episodes[i];
                let filter_ok = match self.filter {
                    Filter::All => true,
                    Filter::Starred => episode.starred,
                    Filter::Downloaded => self.downloaded[i],
                };
                let search_ok = needle.is_empty()
                    || episode.title.to_lowercase().contains(&needle)
                    || episode.podcast_title.to_lowercase().contains(&needle);
                filter_ok && search_ok
            })
            .collect();
        match self.sort {
            Sort::DatePublished => {
                indices.sort_by(|&a, &b| {
                    self.episodes[b]
                        .published_at
                        .cmp(&self.episodes[a].published_at)
                });
            }
            Sort::Title => {
                indices.sort_by(|&a, &b| {
                    self.episodes[a]
                        .title
                        .to_lowercase()
                        .cmp(&self.episodes[b].title.to_lowercase())
                });
            }
            Sort::Duration => {
                indices.sort_by(|&a, &b| {
                    self.episodes[b].duration.cmp(&self.episodes[a].duration)
                });
            }
        }
        indices
    }

    fn current(&self) -> Option<&Episode> {
        let visible = self.visible();
        visible.get(self.selected).map(|&i| &self.episodes[i])
    }

    fn move_selection(&mut self, delta: i64) {
        let len = self.visible().len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let target = self.selected as i64 + delta;
        self.selected = target.clamp(0, len as i64 - 1) as usize;
    }

    fn clamp_selection(&mut self) {
        let len = self.visible().len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }

    fn draw(&self, frame: &mut Frame) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(3),
                Constraint::Length(1),
            ])
            .split(frame.area());

        self.draw_header(frame, rows[0]);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[1]);
        self.draw_list(frame, columns[0]);
        self.draw_notes(frame, columns[1]);

        self.draw_status(frame, rows[2]);
    }

    fn draw_header(&self, frame: &mut Frame, area: Rect) {
        let filter = if !self.search.is_empty() {
            format!("Search: {}", self.search)
        } else {
            match self.filter {
                Filter::All => "All Episodes".to_string(),
                Filter::Starred => "Starred Episodes".to_string(),
                Filter::Downloaded => "Downloaded Episodes".to_string(),
            }
        };
        let header = Paragraph::new(Line::from(Span::styled(
            filter,
            Style::default().add_modifier(Modifier::BOLD),
        )));
        frame.render_widget(header, area);
    }

    fn draw_list(&self, frame: &mut Frame, area: Rect) {
        let visible = self.visible();
        let items: Vec<ListItem> = visible
            .iter()
            .map(|&i| {
                let episode = &self.episodes[i];
                let mut flags = String::new();
                if self.downloaded[i] {
                    flags.push('D');
                }
                if self.transcribed[i] {
                    flags.push('T');
                }
                if episode.starred {
                    flags.push('*');
                }
                let line = Line::from(vec![
                    Span::styled(
                        format!("{:<4}", flags),
                        Style::default().fg(Color::Green),
                    ),
                    Span::raw(truncate(&episode.title, area.width.saturating_sub(10) as usize)),
                ]);
                ListItem::new(line)
            })
            .collect();

        let mut state = ListState::default();
        if !visible.is_empty() {
            state.select(Some(self.selected.min(visible.len() - 1)));
        }
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Episodes"))
            .highlight_style(
                Style::default()
                    .bg(Color::Blue)
                    .add_modifier(Modifier::BOLD),
            );
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_notes(&self, frame: &mut Frame, area: Rect) {
        let body = match self.current() {
            Some(episode) => {
                let mut lines = vec![
                    Line::from(Span::styled(
                        episode.title.clone(),
                        Style::default().add_modifier(Modifier::BOLD),
                    )),
                    Line::from(episode.podcast_title.clone()),
                    Line::from(format!(
                        "{}  {}",
                        format_date(&episode.published_at),
                        format_duration(episode.duration)
                    )),
                    Line::default(),
                ];
                let notes = episode
                    .show_notes
                    .as_deref()
                    .unwrap_or("No show notes available.");
                for raw in strip_html(notes).lines() {
                    lines.push(Line::from(raw.to_string()));
                }
                lines
            }
            None => vec![Line::from("No episodes match.")],
        };
        let paragraph = Paragraph::new(body)
            .block(Block::default().borders(Borders::ALL).title("Show Notes"))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect) {
        let text = if self.searching {
            format!("Search: {}_  (Enter to apply, Esc to cancel)", self.search)
        } else {
            format!(
                "Enter:Play  d:Download  r:Refresh  s:Filter  t:Sort  /:Search  q:Quit  ({} shown)",
                self.visible().len()
            )
        };
        frame.render_widget(
            Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
            area,
        );
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let seconds = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Show notes arrive as HTML fragments; keep the text, drop the tags.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}
