use std::time::Instant;

/// Derives the playback offset from the moment playback last (re)started.
///
/// The decoder never reports its position; we anchor an `Instant` when it is
/// spawned at a known offset and count wall time from there, clamped to the
/// episode duration.
#[derive(Debug)]
pub struct PositionTracker {
    duration: u64,
    position: u64,
    anchor: Option<(Instant, u64)>,
    started_once: bool,
}

impl PositionTracker {
    pub fn new(duration: u64) -> Self {
        Self {
            duration,
            position: 0,
            anchor: None,
            started_once: false,
        }
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn is_running(&self) -> bool {
        self.anchor.is_some()
    }

    /// Playback (re)started at `offset`.
    pub fn start(&mut self, offset: u64) {
        let offset = offset.min(self.duration);
        self.position = offset;
        self.anchor = Some((Instant::now(), offset));
        self.started_once = true;
    }

    /// Playback stopped; freeze the position at the last tracked value.
    pub fn stop(&mut self) {
        self.position = self.current_position();
        self.anchor = None;
    }

    /// Current offset in seconds, monotonic while running, clamped to
    /// `[0, duration]`.
    pub fn current_position(&self) -> u64 {
        match self.anchor {
            Some((anchor, base)) => (base + anchor.elapsed().as_secs()).min(self.duration),
            None => self.position.min(self.duration),
        }
    }

    pub fn has_reached_end(&self) -> bool {
        self.started_once && self.current_position() >= self.duration
    }

    /// Clamp `target` and make it the current position. While running the
    /// anchor is re-based; the caller still has to respawn the decoder.
    pub fn seek_to(&mut self, target: u64) -> u64 {
        let target = target.min(self.duration);
        if self.anchor.is_some() {
            self.start(target);
        } else {
            self.position = target;
        }
        target
    }

    pub fn seek_by(&mut self, delta: i64) -> u64 {
        let current = self.current_position() as i64;
        let target = (current + delta).clamp(0, self.duration as i64) as u64;
        self.seek_to(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_then_read_returns_clamped_offset() {
        let mut tracker = PositionTracker::new(600);
        tracker.start(0);
        for offset in [0i64, 30, 599, 600, 10_000] {
            let target = tracker.seek_by(offset - tracker.current_position() as i64);
            assert_eq!(target, (offset.max(0) as u64).min(600));
            // Within tick tolerance of the requested offset.
            assert!(tracker.current_position() <= target + 1);
            assert!(tracker.current_position() >= target);
        }
    }

    #[test]
    fn seek_backward_clamps_to_zero() {
        let mut tracker = PositionTracker::new(600);
        tracker.start(10);
        assert_eq!(tracker.seek_by(-10_000), 0);
        assert_eq!(tracker.current_position(), 0);
    }

    #[test]
    fn seek_while_paused_only_moves_stored_position() {
        let mut tracker = PositionTracker::new(600);
        assert!(!tracker.is_running());
        tracker.seek_by(90);
        assert_eq!(tracker.current_position(), 90);
        assert!(!tracker.is_running());
    }

    #[test]
    fn end_is_never_reached_before_start() {
        let tracker = PositionTracker::new(0);
        assert!(!tracker.has_reached_end());
        let tracker = PositionTracker::new(600);
        assert!(!tracker.has_reached_end());
    }

    #[test]
    fn end_is_reached_at_duration() {
        let mut tracker = PositionTracker::new(600);
        tracker.start(600);
        assert!(tracker.has_reached_end());
        assert_eq!(tracker.current_position(), 600);

        let mut tracker = PositionTracker::new(600);
        tracker.start(10);
        assert!(!tracker.has_reached_end());
    }

    #[test]
    fn stop_freezes_position() {
        let mut tracker = PositionTracker::new(600);
        tracker.start(42);
        tracker.stop();
        assert!(!tracker.is_running());
        assert_eq!(tracker.current_position(), 42);
    }
}
