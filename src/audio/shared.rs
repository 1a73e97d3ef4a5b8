//! Cross-thread hand-off between the capture thread and the render loop.

use std::sync::Mutex;

/// Single-slot frame buffer shared between exactly one writer (the
/// capture callback) and one reader (the render thread).
///
/// Mutation is a full-buffer replace, so the reader always observes a
/// complete frame. There is no queue: if the reader is slower than the
/// writer, intermediate frames are dropped (last-write-wins); if it is
/// faster, it re-reads the same frame. Both are fine for a perceptual
/// visualization, and queueing would only add latency.
pub struct FrameSlot {
    buf: Mutex<Vec<f32>>,
}

impl FrameSlot {
    /// Create a slot pre-filled with silence of the given length.
    pub fn new(len: usize) -> Self {
        Self {
            buf: Mutex::new(vec![0.0; len]),
        }
    }

    /// Replace the stored frame. Lock hold time is the copy itself.
    pub fn publish(&self, frame: &[f32]) {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        buf.extend_from_slice(frame);
    }

    /// Copy the latest frame into `out`, reusing its allocation.
    pub fn snapshot_into(&self, out: &mut Vec<f32>) {
        let buf = self.buf.lock().unwrap();
        out.clear();
        out.extend_from_slice(&buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_silent() {
        let slot = FrameSlot::new(8);
        let mut out = Vec::new();
        slot.snapshot_into(&mut out);
        assert_eq!(out, vec![0.0; 8]);
    }

    #[test]
    fn test_publish_replaces_whole_frame() {
        let slot = FrameSlot::new(4);
        slot.publish(&[1.0, 2.0, 3.0, 4.0]);
        slot.publish(&[5.0, 6.0, 7.0, 8.0]);

        let mut out = Vec::new();
        slot.snapshot_into(&mut out);
        // Last write wins; no blend of old and new contents.
        assert_eq!(out, vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_reader_may_observe_same_frame_twice() {
        let slot = FrameSlot::new(2);
        slot.publish(&[0.25, -0.25]);

        let mut first = Vec::new();
        let mut second = Vec::new();
        slot.snapshot_into(&mut first);
        slot.snapshot_into(&mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn test_snapshot_reuses_allocation() {
        let slot = FrameSlot::new(3);
        let mut out = vec![9.0; 64];
        slot.snapshot_into(&mut out);
        assert_eq!(out.len(), 3);
    }
}
