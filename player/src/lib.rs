pub mod cursor;
pub mod poller;
pub mod position;
pub mod process;
pub mod session;

pub use cursor::TranscriptCursor;
pub use poller::TranscriptPoller;
pub use position::PositionTracker;
pub use process::{GroupedChild, PlayerProcess};
pub use session::{
    PlaybackSession, SessionCommand, SessionUi, SessionView, TranscriptStatus, TranscriptionSignal,
};
