use shared::TranscriptSegment;

/// Rows moved by one PgUp/PgDn press.
const PAGE_STEP: usize = 10;

/// Maps the playback position onto the transcript and keeps the active
/// segment in view with a "1/3 past, 2/3 future" bias.
///
/// Derived state only: recomputed every tick, never persisted. Manual paging
/// moves the window directly and holds until the active segment changes.
#[derive(Debug, Default)]
pub struct TranscriptCursor {
    active_index: usize,
    scroll_offset: usize,
}

impl TranscriptCursor {
    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Recompute the active segment for `position`; on a change, re-bias the
    /// scroll window. The offset is always clamped so a shrunk viewport or
    /// segment list cannot leave it dangling.
    pub fn update(&mut self, segments: &[TranscriptSegment], position: u64, viewport_height: usize) {
        let new_index = Self::active_index_for(segments, position);
        if new_index != self.active_index {
            self.active_index = new_index;
            self.scroll_offset = Self::biased_scroll(new_index, segments.len(), viewport_height);
        }
        self.scroll_offset = self
            .scroll_offset
            .min(Self::max_scroll(segments.len(), viewport_height));
    }

    /// Largest index whose timestamp is not past `position`; 0 when nothing
    /// qualifies. A reverse scan keeps this correct even if partial parsing
    /// produced slightly out-of-order timestamps.
    fn active_index_for(segments: &[TranscriptSegment], position: u64) -> usize {
        segments
            .iter()
            .rposition(|segment| segment.timestamp <= position)
            .unwrap_or(0)
    }

    fn biased_scroll(active_index: usize, len: usize, viewport_height: usize) -> usize {
        let past_context = viewport_height / 3;
        active_index
            .saturating_sub(past_context)
            .min(Self::max_scroll(len, viewport_height))
    }

    fn max_scroll(len: usize, viewport_height: usize) -> usize {
        len.saturating_sub(viewport_height)
    }

    /// Step to the previous segment, returning its timestamp for the seek.
    pub fn previous(&mut self, segments: &[TranscriptSegment]) -> Option<u64> {
        if segments.is_empty() || self.active_index == 0 {
            return None;
        }
        self.active_index -= 1;
        segments.get(self.active_index).map(|s| s.timestamp)
    }

    /// Step to the next segment, returning its timestamp for the seek.
    pub fn next(&mut self, segments: &[TranscriptSegment]) -> Option<u64> {
        if self.active_index + 1 >= segments.len() {
            return None;
        }
        self.active_index += 1;
        segments.get(self.active_index).map(|s| s.timestamp)
    }

    pub fn page_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(PAGE_STEP);
    }

    pub fn page_down(&mut self, len: usize, viewport_height: usize) {
        self.scroll_offset =
            (self.scroll_offset + PAGE_STEP).min(Self::max_scroll(len, viewport_height));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(timestamps: &[u64]) -> Vec<TranscriptSegment> {
        timestamps
            .iter()
            .map(|&timestamp| TranscriptSegment {
                timestamp,
                text: format!("segment at {timestamp}"),
                speaker: None,
            })
            .collect()
    }

    #[test]
    fn active_index_is_greatest_not_past_position() {
        let segs = segments(&[0, 30, 65, 600]);
        let mut cursor = TranscriptCursor::default();
        cursor.update(&segs, 70, 9);
        assert_eq!(cursor.active_index(), 2);
        assert_eq!(cursor.scroll_offset(), 0);
    }

    #[test]
    fn empty_list_maps_to_zero() {
        let mut cursor = TranscriptCursor::default();
        cursor.update(&[], 500, 9);
        assert_eq!(cursor.active_index(), 0);
        assert_eq!(cursor.scroll_offset(), 0);
    }

    #[test]
    fn position_before_first_segment_maps_to_zero() {
        let segs = segments(&[10, 20, 30]);
        let mut cursor = TranscriptCursor::default();
        cursor.update(&segs, 5, 9);
        assert_eq!(cursor.active_index(), 0);
    }

    #[test]
    fn scroll_keeps_one_third_past_context() {
        let segs = segments(&(0..60).map(|i| i * 10).collect::<Vec<_>>());
        let mut cursor = TranscriptCursor::default();
        cursor.update(&segs, 300, 9); // active index 30
        assert_eq!(cursor.active_index(), 30);
        assert_eq!(cursor.scroll_offset(), 27); // 30 - 9/3
    }

    #[test]
    fn scroll_clamps_near_the_end() {
        let segs = segments(&(0..20).map(|i| i * 10).collect::<Vec<_>>());
        let mut cursor = TranscriptCursor::default();
        cursor.update(&segs, 10_000, 9);
        assert_eq!(cursor.active_index(), 19);
        assert_eq!(cursor.scroll_offset(), 11); // len 20 - viewport 9
    }

    #[test]
    fn navigation_is_bounded() {
        let segs = segments(&[0, 30, 65]);
        let mut cursor = TranscriptCursor::default();
        assert_eq!(cursor.previous(&segs), None);
        assert_eq!(cursor.next(&segs), Some(30));
        assert_eq!(cursor.next(&segs), Some(65));
        assert_eq!(cursor.next(&segs), None);
        assert_eq!(cursor.previous(&segs), Some(30));
    }

    #[test]
    fn manual_paging_holds_until_active_segment_changes() {
        let segs = segments(&(0..40).map(|i| i * 10).collect::<Vec<_>>());
        let mut cursor = TranscriptCursor::default();
        cursor.update(&segs, 0, 9);
        cursor.page_down(segs.len(), 9);
        assert_eq!(cursor.scroll_offset(), 10);
        // Same active segment: the manual offset survives the tick.
        cursor.update(&segs, 5, 9);
        assert_eq!(cursor.scroll_offset(), 10);
        // Active segment moved: bias reasserts itself.
        cursor.update(&segs, 10, 9);
        assert_eq!(cursor.active_index(), 1);
        assert_eq!(cursor.scroll_offset(), 0);
    }

    #[test]
    fn paging_clamps_at_both_ends() {
        let segs = segments(&[0, 10, 20]);
        let mut cursor = TranscriptCursor::default();
        cursor.page_up();
        assert_eq!(cursor.scroll_offset(), 0);
        cursor.page_down(segs.len(), 9);
        assert_eq!(cursor.scroll_offset(), 0); // list shorter than viewport
    }
}
