//! Last-resort reporting for failures of the diagnostic machinery itself.
//!
//! A lock that cannot be taken, a sink that refuses a write, or a demangler
//! that breaks cannot be reported through the normal record path. The message
//! is formatted into a small stack buffer (no allocation), written to standard
//! error and to the sink file if there is one, and the process exits.

use std::fmt;
use std::io;
use std::os::unix::io::RawFd;

use crate::sink::Sink;
use crate::staging_buffer::StagingBuffer;

/// Writes `[crash_logger::panic] <what>` and `[crash_logger::errno] <detail>`
/// and terminates with `EXIT_FAILURE`.
///
/// The message always goes to standard error. `fd` is the sink; when it is a
/// file, the message is written there too so the report and its cause end up
/// side by side. Write failures are ignored, there is nowhere left to report
/// them.
pub fn fatal(fd: Option<RawFd>, what: &str, detail: &dyn fmt::Display) -> ! {
    let mut message = StagingBuffer::<576>::new();
    message.append(format_args!(
        "[crash_logger::panic] {}\n[crash_logger::errno] {}\n",
        what, detail
    ));

    let stderr = Sink::stderr();
    if let Some(fd) = fd.filter(|&fd| fd != stderr.fd()) {
        raw_write(fd, message.as_bytes());
    }
    let _ = stderr.write_once(message.as_bytes());

    unsafe { libc::_exit(libc::EXIT_FAILURE) }
}

fn raw_write(fd: RawFd, bytes: &[u8]) {
    unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
}

/// Displays an `io::Error` as `os error <n>` or its kind, without allocating.
pub struct ErrorDetail<'a>(pub &'a io::Error);

impl fmt::Display for ErrorDetail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.raw_os_error() {
            Some(code) => write!(f, "os error {}", code),
            None => write!(f, "{:?}", self.0.kind()),
        }
    }
}
