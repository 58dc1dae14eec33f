//! Single-slot owner for the latest background frame.

use crate::frame::VideoFrame;

#[derive(Debug)]
struct Held {
    frame: VideoFrame,
    uses: u32,
}

/// Holds at most one frame. Storing a new frame releases the previous
/// occupant first, so the slot is always the frame's only owner.
#[derive(Debug, Default)]
pub struct FrameSlot {
    held: Option<Held>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `frame`, releasing the previous occupant.
    ///
    /// Returns how many times the released frame had been drawn, or `None`
    /// if the slot was empty.
    pub fn store(&mut self, frame: VideoFrame) -> Option<u32> {
        let previous = self.held.replace(Held { frame, uses: 0 });
        previous.map(|held| {
            let uses = held.uses;
            held.frame.release();
            uses
        })
    }

    pub fn get(&self) -> Option<&VideoFrame> {
        self.held.as_ref().map(|held| &held.frame)
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_none()
    }

    /// Count one draw of the held frame. Returns the count before this draw.
    pub fn mark_drawn(&mut self) -> Option<u32> {
        self.held.as_mut().map(|held| {
            let before = held.uses;
            held.uses = held.uses.saturating_add(1);
            before
        })
    }

    /// Release the held frame, if any.
    pub fn clear(&mut self) {
        if let Some(held) = self.held.take() {
            held.frame.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameLedger;

    #[test]
    fn store_releases_previous_occupant() {
        let ledger = FrameLedger::new();
        let mut slot = FrameSlot::new();

        let first = VideoFrame::solid(1, 1, 0, [0; 4]).tracked(&ledger);
        let first_id = first.id();
        assert_eq!(slot.store(first), None);

        let second = VideoFrame::solid(1, 1, 33, [0; 4]).tracked(&ledger);
        assert_eq!(slot.store(second), Some(0));
        assert!(!ledger.is_live(first_id));
        assert_eq!(slot.get().map(|f| f.timestamp_us()), Some(33));

        slot.clear();
        assert!(slot.is_empty());
        assert!(ledger.report().is_balanced());
    }

    #[test]
    fn draw_counts_follow_the_held_frame() {
        let mut slot = FrameSlot::new();
        assert_eq!(slot.mark_drawn(), None);

        slot.store(VideoFrame::solid(1, 1, 0, [0; 4]));
        assert_eq!(slot.mark_drawn(), Some(0));
        assert_eq!(slot.mark_drawn(), Some(1));

        assert_eq!(slot.store(VideoFrame::solid(1, 1, 1, [0; 4])), Some(2));
        assert_eq!(slot.mark_drawn(), Some(0));
    }

    #[test]
    fn dropping_slot_releases_frame() {
        let ledger = FrameLedger::new();
        {
            let mut slot = FrameSlot::new();
            slot.store(VideoFrame::solid(1, 1, 0, [0; 4]).tracked(&ledger));
        }
        assert!(ledger.report().is_balanced());
    }
}
