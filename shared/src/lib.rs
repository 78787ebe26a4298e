pub mod config;
pub mod episode;
pub mod paths;
pub mod transcript;

pub use config::{Config, PlayerConfig, StorageConfig, SyncConfig, TranscriptionConfig};
pub use episode::Episode;
pub use paths::Paths;
pub use transcript::{Transcript, TranscriptSegment};
