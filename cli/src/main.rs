use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use shared::{Config, Episode, Paths};

mod chat;
mod download;
mod player_screen;
mod pocketcast;
mod selector;
mod store;
mod terminal;
mod transcription;

use download::download_with_console_progress;
use player_screen::PlayerScreen;
use pocketcast::PocketcastClient;
use selector::{EpisodeSelector, SelectorOutcome};
use store::EpisodeStore;
use terminal::TerminalGuard;
use transcription::TranscriptionJobs;

#[derive(Parser)]
#[command(name = "podterm")]
#[command(about = "Browse, play, and transcribe podcast episodes from the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse episodes interactively (the default when no command is given)
    Select,
    /// Fetch recently played and starred episodes from Pocket Casts
    Sync,
    /// Download an episode's audio (by uuid, uuid prefix, or title)
    Download { episode: String },
    /// Play an episode in the interactive player
    Play { episode: String },
    /// Transcribe an episode and wait for completion
    Transcribe { episode: String },
    /// Chat about an episode's transcript
    Chat { episode: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = Config::load()?;
    let paths = Paths::new(&config.storage);
    paths.ensure_directories()?;

    match cli.command {
        Some(Commands::Sync) => {
            let mut store = EpisodeStore::load(&paths)?;
            sync(&config, &mut store).await?;
            Ok(())
        }
        Some(Commands::Download { episode }) => {
            let store = EpisodeStore::load(&paths)?;
            let episode = store.resolve(&episode)?.clone();
            let http = reqwest::Client::new();
            download_with_console_progress(&http, &episode, &paths).await?;
            Ok(())
        }
        Some(Commands::Play { episode }) => {
            let store = EpisodeStore::load(&paths)?;
            let episode = store.resolve(&episode)?.clone();
            ensure_downloaded(&episode, &paths).await?;
            let mut jobs = TranscriptionJobs::new(&config.transcription);
            let mut guard = TerminalGuard::init()?;
            play(&episode, &config, &paths, &mut guard, &mut jobs).await
        }
        Some(Commands::Transcribe { episode }) => {
            let store = EpisodeStore::load(&paths)?;
            let episode = store.resolve(&episode)?.clone();
            ensure_downloaded(&episode, &paths).await?;
            let mut jobs = TranscriptionJobs::new(&config.transcription);
            eprintln!("Transcribing {} ...", episode.title);
            jobs.run_to_completion(&episode, &paths)?;
            eprintln!("Transcript written to {}", paths.transcript_path(&episode).display());
            Ok(())
        }
        Some(Commands::Chat { episode }) => {
            let store = EpisodeStore::load(&paths)?;
            let episode = store.resolve(&episode)?.clone();
            chat::run(&config.transcription, &episode, &paths)
        }
        Some(Commands::Select) | None => select_loop(&config, &paths).await,
    }
}

/// Merge fresh listings into the local database and backfill show notes.
async fn sync(config: &Config, store: &mut EpisodeStore) -> Result<usize> {
    let client = PocketcastClient::new(config)?;
    let episodes = client.fetch_episodes().await?;
    let fetched = episodes.len();
    let added = store.merge(episodes);

    let missing_notes: Vec<String> = store
        .all()
        .iter()
        .filter(|e| e.show_notes.is_none())
        .map(|e| e.uuid.clone())
        .collect();
    for uuid in missing_notes {
        if let Some(notes) = client.fetch_show_notes(&uuid).await {
            store.set_show_notes(&uuid, notes);
        }
    }

    store.save()?;
    info!("synced {fetched} episodes ({added} new)");
    eprintln!("Synced {fetched} episodes ({added} new).");
    Ok(added)
}

async fn ensure_downloaded(episode: &Episode, paths: &Paths) -> Result<()> {
    if episode.downloaded(paths) {
        return Ok(());
    }
    let http = reqwest::Client::new();
    download_with_console_progress(&http, episode, paths).await?;
    Ok(())
}

/// Run one playback session. A missing transcript kicks off a background
/// transcription first, so the player fills in live as segments arrive.
async fn play(
    episode: &Episode,
    config: &Config,
    paths: &Paths,
    guard: &mut TerminalGuard,
    jobs: &mut TranscriptionJobs,
) -> Result<()> {
    if !paths.transcript_path(episode).exists() {
        if let Err(err) = jobs.start(episode, paths) {
            warn!("could not start transcription: {err:#}");
        }
    }

    let mut session = podterm_player::PlaybackSession::new(episode.clone(), paths, config);
    let mut screen = PlayerScreen::new(guard, config.transcription.clone(), paths);
    session.run(&mut screen, jobs).await
}

/// Default command: the episode browser, looping back after each playback
/// or download so the terminal stays in the picker until the user quits.
async fn select_loop(config: &Config, paths: &Paths) -> Result<()> {
    let mut store = EpisodeStore::load(paths)?;
    if store.is_empty() {
        sync(config, &mut store)
            .await
            .context("the episode database is empty and the initial sync failed")?;
    }

    let mut jobs = TranscriptionJobs::new(&config.transcription);
    let mut guard = TerminalGuard::init()?;

    loop {
        let episodes: Vec<Episode> = store.all().into_iter().cloned().collect();
        let mut selector = EpisodeSelector::new(episodes, paths);
        match selector.run(guard.terminal())? {
            SelectorOutcome::Quit => break,
            SelectorOutcome::Refresh => {
                guard.suspend()?;
                if let Err(err) = sync(config, &mut store).await {
                    eprintln!("Sync failed: {err:#}");
                }
                guard.resume()?;
            }
            SelectorOutcome::Download(uuid) => {
                let Some(episode) = store.get(&uuid).cloned() else {
                    continue;
                };
                guard.suspend()?;
                let http = reqwest::Client::new();
                if let Err(err) = download_with_console_progress(&http, &episode, paths).await {
                    eprintln!("Download failed: {err:#}");
                }
                guard.resume()?;
            }
            SelectorOutcome::Play(uuid) => {
                let Some(episode) = store.get(&uuid).cloned() else {
                    continue;
                };
                if !episode.downloaded(paths) {
                    guard.suspend()?;
                    let http = reqwest::Client::new();
                    let downloaded =
                        download_with_console_progress(&http, &episode, paths).await;
                    guard.resume()?;
                    if let Err(err) = downloaded {
                        warn!("download failed: {err:#}");
                        continue;
                    }
                }
                play(&episode, config, paths, &mut guard, &mut jobs).await?;
            }
        }
    }
    Ok(())
}
