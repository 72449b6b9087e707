//! Fixed-capacity text buffers that every record is assembled in before it
//! reaches the sink.
//!
//! A buffer never grows and never allocates. Output that does not fit is cut
//! at the nominal capacity and a truncation marker is written into a small
//! reserved slack region behind it, so an oversized record degrades into a
//! shorter one that still says it was cut.
//!
//! A short record prefix (the timestamp) can be excluded from the capacity
//! with [`StagingBuffer::exclude_prefix`], so the budget applies to the
//! caller's text alone.

use std::fmt;
use std::io;

use crate::sink::Sink;

/// Nominal capacity of a record buffer, in bytes.
pub const BUFFER_LEN: usize = 8192;

/// Slack kept behind the nominal capacity for the truncation marker.
pub const OVERFLOW_RESERVE: usize = 64;

/// Room kept for a record prefix that does not count against the capacity.
pub const PREFIX_RESERVE: usize = 16;

/// Written once at the end of a record that did not fit.
pub const TRUNCATION_MARKER: &str = "\n[crash_logger: output buffer overflow detected]\n";

/// The buffer used by all record paths: `BUFFER_LEN` nominal bytes plus
/// the prefix room and the overflow slack.
pub type RecordBuffer = StagingBuffer<{ BUFFER_LEN + PREFIX_RESERVE + OVERFLOW_RESERVE }>;

/// A text buffer with a write cursor and overflow containment.
///
/// # Type Parameters
///
/// * `CAP` - Total size of the backing array, reserves included. The nominal
///   capacity is `CAP - PREFIX_RESERVE - OVERFLOW_RESERVE`.
///
/// # Examples
///
/// ```
/// # use crash_logger::staging_buffer::StagingBuffer;
/// let mut buffer = StagingBuffer::<144>::new();
/// buffer.append(format_args!("pid {}", 42));
/// assert_eq!(buffer.as_bytes(), b"pid 42");
/// assert!(!buffer.is_truncated());
/// ```
pub struct StagingBuffer<const CAP: usize> {
    bytes: [u8; CAP],
    cursor: usize,
    // staged bytes exempt from the capacity, at most PREFIX_RESERVE
    prefix: usize,
    truncated: bool,
}

impl<const CAP: usize> StagingBuffer<CAP> {
    const NOMINAL: usize = {
        assert!(
            CAP > PREFIX_RESERVE + OVERFLOW_RESERVE,
            "staging buffer smaller than its reserves"
        );
        assert!(TRUNCATION_MARKER.len() <= OVERFLOW_RESERVE);
        CAP - PREFIX_RESERVE - OVERFLOW_RESERVE
    };

    /// Creates an empty buffer. Usable in `const` context so buffers can live
    /// in pre-reserved memory.
    pub const fn new() -> Self {
        Self {
            bytes: [0; CAP],
            cursor: 0,
            prefix: 0,
            truncated: false,
        }
    }

    /// Number of bytes a record may use before it gets truncated.
    pub const fn capacity(&self) -> usize {
        Self::NOMINAL
    }

    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Whether the current record hit the nominal capacity (or a formatting
    /// error) and carries the truncation marker.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// The staged bytes, marker included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.cursor]
    }

    /// Formats `args` at the cursor.
    ///
    /// If the output does not fit, or a `Display` implementation reports an
    /// error, the record is truncated and marked; later appends are ignored
    /// until the buffer is flushed or reset.
    ///
    /// # Returns
    ///
    /// The number of bytes the cursor advanced, marker included.
    pub fn append(&mut self, args: fmt::Arguments<'_>) -> usize {
        let start = self.cursor;
        if self.truncated {
            return 0;
        }

        if fmt::write(self, args).is_err() {
            self.mark_truncated();
        }

        self.cursor - start
    }

    /// Copies raw bytes at the cursor with the same containment as `append`.
    ///
    /// Returns how many of `bytes` were stored (the marker is not counted).
    pub fn push_bytes(&mut self, bytes: &[u8]) -> usize {
        if self.truncated {
            return 0;
        }

        let room = (Self::NOMINAL + self.prefix).saturating_sub(self.cursor);
        let taken = room.min(bytes.len());
        self.bytes[self.cursor..self.cursor + taken].copy_from_slice(&bytes[..taken]);
        self.cursor += taken;

        if taken < bytes.len() {
            self.mark_truncated();
        }

        taken
    }

    pub fn push_byte(&mut self, byte: u8) -> usize {
        self.push_bytes(&[byte])
    }

    /// Writes the whole staged span to `sink` in a single write, then resets.
    ///
    /// The buffer is cleared even when the write fails, so nothing stale can
    /// leak into the next record. A short write is reported as
    /// `ErrorKind::WriteZero`.
    pub fn flush(&mut self, sink: &Sink) -> io::Result<()> {
        let result = sink.write_once(self.as_bytes());
        self.reset();
        result
    }

    /// Exempts everything staged so far, up to `PREFIX_RESERVE` bytes, from
    /// the capacity of the current record.
    ///
    /// Called right after writing a record prefix such as the timestamp. Has
    /// no effect on a truncated record.
    pub fn exclude_prefix(&mut self) {
        if !self.truncated {
            self.prefix = self.cursor.min(PREFIX_RESERVE);
        }
    }

    /// Zeroes the used part of the buffer and rewinds the cursor.
    pub fn reset(&mut self) {
        self.bytes[..self.cursor].fill(0);
        self.cursor = 0;
        self.prefix = 0;
        self.truncated = false;
    }

    fn mark_truncated(&mut self) {
        if self.truncated {
            return;
        }

        // cursor <= NOMINAL + PREFIX_RESERVE here, and the marker fits in the
        // overflow reserve
        let marker = TRUNCATION_MARKER.as_bytes();
        let end = self.cursor + marker.len();
        self.bytes[self.cursor..end].copy_from_slice(marker);
        self.cursor = end;
        self.truncated = true;
    }
}

impl<const CAP: usize> Default for StagingBuffer<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> fmt::Write for StagingBuffer<CAP> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_bytes(s.as_bytes());
        if self.truncated {
            // stop the formatter early, nothing else will be stored
            Err(fmt::Error)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Display;

    struct Failing;

    impl Display for Failing {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    fn marker_count(bytes: &[u8]) -> usize {
        let marker = TRUNCATION_MARKER.as_bytes();
        bytes.windows(marker.len()).filter(|w| *w == marker).count()
    }

    #[test]
    fn test_append_within_capacity() {
        let mut buffer = StagingBuffer::<144>::new();
        let written = buffer.append(format_args!("{}-{}", "a", 7));
        assert_eq!(written, 3);
        assert_eq!(buffer.as_bytes(), b"a-7");
        assert_eq!(buffer.capacity(), 64);
        assert!(!buffer.is_truncated());
    }

    #[test]
    fn test_exact_fit_is_not_truncated() {
        let mut buffer = StagingBuffer::<144>::new();
        let text = "x".repeat(64);
        buffer.append(format_args!("{}", text));
        assert_eq!(buffer.len(), 64);
        assert!(!buffer.is_truncated());
    }

    #[test]
    fn test_overflow_writes_marker_once() {
        let mut buffer = StagingBuffer::<144>::new();
        let text = "y".repeat(65);
        buffer.append(format_args!("{}", text));
        buffer.append(format_args!("ignored"));
        buffer.push_bytes(b"ignored too");

        assert!(buffer.is_truncated());
        assert_eq!(buffer.len(), 64 + TRUNCATION_MARKER.len());
        assert!(buffer.as_bytes().ends_with(TRUNCATION_MARKER.as_bytes()));
        assert_eq!(marker_count(buffer.as_bytes()), 1);
        assert!(buffer.len() <= 144);
    }

    #[test]
    fn test_overflow_across_appends() {
        let mut buffer = StagingBuffer::<112>::new();
        for _ in 0..10 {
            buffer.append(format_args!("0123456789"));
        }
        assert!(buffer.is_truncated());
        assert_eq!(&buffer.as_bytes()[..32], "0123456789".repeat(4)[..32].as_bytes());
        assert_eq!(marker_count(buffer.as_bytes()), 1);
    }

    #[test]
    fn test_formatting_error_is_contained() {
        let mut buffer = StagingBuffer::<144>::new();
        buffer.append(format_args!("before {}", Failing));
        assert!(buffer.is_truncated());
        assert!(buffer.as_bytes().starts_with(b"before "));
        assert!(buffer.as_bytes().ends_with(TRUNCATION_MARKER.as_bytes()));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut buffer = StagingBuffer::<144>::new();
        buffer.append(format_args!("{}", "z".repeat(100)));
        assert!(buffer.is_truncated());

        buffer.reset();
        assert!(buffer.is_empty());
        assert!(!buffer.is_truncated());
        assert!(buffer.bytes.iter().all(|&b| b == 0));

        buffer.push_bytes(b"fresh");
        assert_eq!(buffer.as_bytes(), b"fresh");
    }

    #[test]
    fn test_push_bytes_partial() {
        let mut buffer = StagingBuffer::<86>::new();
        assert_eq!(buffer.push_bytes(b"abcd"), 4);
        assert_eq!(buffer.push_bytes(b"efgh"), 2);
        assert!(buffer.is_truncated());
        assert!(buffer.as_bytes().starts_with(b"abcdef\n["));
    }

    #[test]
    fn test_excluded_prefix_does_not_count() {
        let mut buffer = StagingBuffer::<144>::new();
        buffer.append(format_args!("[12:00:00]"));
        buffer.exclude_prefix();

        let text = "p".repeat(64);
        buffer.append(format_args!("{}", text));
        assert!(!buffer.is_truncated());
        assert_eq!(buffer.len(), 10 + 64);

        buffer.push_byte(b'!');
        assert!(buffer.is_truncated());
        assert_eq!(buffer.len(), 10 + 64 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_prefix_exemption_is_capped_and_reset() {
        let mut buffer = StagingBuffer::<144>::new();
        buffer.push_bytes(&[b'a'; 40]);
        buffer.exclude_prefix();
        assert_eq!(buffer.push_bytes(&[b'b'; 64]), 64 - 40 + PREFIX_RESERVE);
        assert!(buffer.is_truncated());

        buffer.reset();
        assert_eq!(buffer.push_bytes(&[b'c'; 65]), 64);
        assert!(buffer.is_truncated());
    }
}
