/// Maximum number of return addresses kept per capture.
pub const MAX_FRAMES: usize = 32;

/// A reusable, fixed-size snapshot of the calling thread's stack.
///
/// Frames are stored innermost first as raw instruction pointers. Capturing
/// only writes into the inline array, so a `StackTrace` set aside ahead of
/// time can be filled from a signal handler.
#[derive(Clone)]
pub struct StackTrace {
    frames: [usize; MAX_FRAMES],
    depth: usize,
}

impl StackTrace {
    pub const fn new() -> Self {
        Self {
            frames: [0; MAX_FRAMES],
            depth: 0,
        }
    }

    /// Records up to `MAX_FRAMES` return addresses of the current stack.
    ///
    /// Returns the captured depth.
    pub fn capture(&mut self) -> usize {
        let Self { frames, depth } = self;
        *depth = 0;
        backtrace::trace(|frame| {
            frames[*depth] = frame.ip() as usize;
            *depth += 1;
            *depth < MAX_FRAMES
        });
        *depth
    }

    /// Same as `capture`, without the unwinder's global lock.
    ///
    /// # Safety
    ///
    /// No other thread may be unwinding through `backtrace` at the same time.
    /// Meant for the fatal-signal path, where taking a lock the interrupted
    /// code might hold would deadlock.
    pub unsafe fn capture_unsynchronized(&mut self) -> usize {
        let Self { frames, depth } = self;
        *depth = 0;
        backtrace::trace_unsynchronized(|frame| {
            frames[*depth] = frame.ip() as usize;
            *depth += 1;
            *depth < MAX_FRAMES
        });
        *depth
    }

    /// Captured frames, most recent first.
    pub fn frames(&self) -> &[usize] {
        &self.frames[..self.depth]
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Default for StackTrace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline(never)]
    fn recurse(levels: usize, trace: &mut StackTrace) -> usize {
        if levels == 0 {
            trace.capture()
        } else {
            let depth = recurse(levels - 1, trace);
            std::hint::black_box(depth)
        }
    }

    #[test]
    fn test_capture_records_frames() {
        let mut trace = StackTrace::new();
        let depth = trace.capture();
        assert!(depth > 0);
        assert_eq!(trace.depth(), depth);
        assert_eq!(trace.frames().len(), depth);
        assert!(trace.frames().iter().all(|&ip| ip != 0));
    }

    #[test]
    fn test_capture_is_bounded() {
        let mut trace = StackTrace::new();
        let depth = recurse(MAX_FRAMES * 2, &mut trace);
        assert_eq!(depth, MAX_FRAMES);
    }

    #[test]
    fn test_capture_reuses_storage() {
        let mut trace = StackTrace::new();
        recurse(MAX_FRAMES * 2, &mut trace);
        let shallow = trace.capture();
        assert!(shallow <= MAX_FRAMES);
        assert_eq!(trace.frames().len(), shallow);
    }
}
