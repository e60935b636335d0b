use std::collections::VecDeque;

pub type FrameId = u32;

/// Least-recently-used ordering of cached frames.
///
/// Every cached frame is tracked; whether a frame may actually be evicted is
/// decided by the caller at eviction time.
#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Least recently used at the front
    order: VecDeque<FrameId>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Mark `frame_id` as the most recently used frame.
    pub fn touch(&mut self, frame_id: FrameId) {
        self.remove(frame_id);
        self.order.push_back(frame_id);
    }

    /// Stop tracking `frame_id`.
    pub fn remove(&mut self, frame_id: FrameId) {
        if let Some(pos) = self.order.iter().position(|&f| f == frame_id) {
            self.order.remove(pos);
        }
    }

    /// Remove and return the least recently used frame accepted by `evictable`.
    /// Rejected frames keep their position.
    pub fn evict(&mut self, mut evictable: impl FnMut(FrameId) -> bool) -> Option<FrameId> {
        let pos = self.order.iter().position(|&f| evictable(f))?;
        self.order.remove(pos)
    }

    pub fn size(&self) -> usize {
        self.order.len()
    }
}
