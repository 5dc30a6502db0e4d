use std::collections::VecDeque;

///Frame-versioned FIFO of staging buffers, used for both upload and readback lanes of a GPU
/// resource.
///
/// Every frame may request at most one fresh buffer (`request` is idempotent within a frame).
/// Once the GPU passed frame `f`, `end_frame(f)` retires everything requested up to that frame,
/// keeping the freshest retired buffer around as the `completed` one so readers always see the
/// latest data that actually finished.
pub struct VersionedQueue<B> {
    entries: VecDeque<(B, u64)>,
    completed: Option<B>,
    frame: u64,
}

impl<B> Default for VersionedQueue<B> {
    fn default() -> Self {
        VersionedQueue {
            entries: VecDeque::new(),
            completed: None,
            frame: 0,
        }
    }
}

impl<B> VersionedQueue<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
    }

    ///Requests a buffer for the current frame, allocating through `alloc` unless one was already
    /// requested this frame.
    pub fn request(&mut self, alloc: impl FnOnce() -> B) {
        if let Some((_, frame)) = self.entries.back() {
            if *frame == self.frame {
                return;
            }
        }

        self.entries.push_back((alloc(), self.frame));
    }

    ///Retires all buffers requested in frames up to and including `frame`. The freshest retired
    /// buffer becomes the completed one.
    pub fn end_frame(&mut self, frame: u64) {
        let mut retired = 0usize;
        while let Some((_, entry_frame)) = self.entries.front() {
            if *entry_frame > frame {
                break;
            }
            let (buffer, _) = self.entries.pop_front().unwrap();
            self.completed = Some(buffer);
            retired += 1;
        }

        #[cfg(feature = "logging")]
        if retired > 0 {
            log::trace!("Retired {} staging buffers up to frame {}", retired, frame);
        }
        let _ = retired;
    }

    ///The buffer requested in the current frame, if any.
    pub fn current(&self) -> Option<&B> {
        match self.entries.back() {
            Some((buffer, frame)) if *frame == self.frame => Some(buffer),
            _ => None,
        }
    }

    pub fn current_mut(&mut self) -> Option<&mut B> {
        match self.entries.back_mut() {
            Some((buffer, frame)) if *frame == self.frame => Some(buffer),
            _ => None,
        }
    }

    ///The freshest buffer whose frame already completed.
    pub fn completed(&self) -> Option<&B> {
        self.completed.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_on_empty_queue() {
        let mut queue = VersionedQueue::new();
        queue.begin_frame(1);
        queue.request(|| 10u32);
        assert_eq!(queue.current(), Some(&10));
    }

    #[test]
    fn request_is_idempotent_per_frame() {
        let mut allocations = 0;
        let mut queue = VersionedQueue::new();

        queue.begin_frame(5);
        queue.request(|| {
            allocations += 1;
            allocations
        });
        queue.request(|| {
            allocations += 1;
            allocations
        });

        assert_eq!(allocations, 1);
        assert_eq!(queue.current(), Some(&1));
    }

    #[test]
    fn end_frame_retires_and_keeps_freshest() {
        let mut queue = VersionedQueue::new();

        queue.begin_frame(5);
        queue.request(|| "frame5");
        queue.end_frame(5);

        //Frame 6 has no request yet, so there is no current buffer, but frame 5's data stays
        // visible as the completed one.
        queue.begin_frame(6);
        assert_eq!(queue.current(), None);
        assert_eq!(queue.completed(), Some(&"frame5"));

        queue.request(|| "frame6");
        assert_eq!(queue.current(), Some(&"frame6"));
        assert_eq!(queue.completed(), Some(&"frame5"));

        queue.end_frame(6);
        assert_eq!(queue.completed(), Some(&"frame6"));
    }

    #[test]
    fn end_frame_skips_stale_entries() {
        let mut queue = VersionedQueue::new();
        for frame in 1..=3 {
            queue.begin_frame(frame);
            queue.request(|| frame);
        }

        queue.end_frame(3);
        assert_eq!(queue.completed(), Some(&3));
        assert!(queue.current().is_none() || *queue.current().unwrap() == 3);
    }
}
