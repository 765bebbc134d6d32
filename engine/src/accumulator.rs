use std::collections::HashSet;

use qr_capture_common::frame::Frame;

/// Deduplicating, insertion-ordered collection of the frames captured for
/// the sequence currently in progress.
///
/// Membership drives completion; the first-seen order is kept separately
/// because some decoders are order-sensitive when reconstructing. The
/// structure itself is unbounded — the session enforces the growth bound,
/// since only it knows the declared total.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    seen: HashSet<Frame>,
    ordered: Vec<Frame>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a frame. Returns `false` if it was already present — a re-scan
    /// of the same physical code — in which case nothing changes.
    pub fn insert(&mut self, frame: Frame) -> bool {
        if self.seen.insert(frame.clone()) {
            self.ordered.push(frame);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, frame: &Frame) -> bool {
        self.seen.contains(frame)
    }

    /// Number of distinct frames collected.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// The collected frames in first-seen order.
    pub fn frames(&self) -> &[Frame] {
        &self.ordered
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.ordered.clear();
    }
}
