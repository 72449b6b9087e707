use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::options::Options;

/// Where records end up: the process's standard error, or a file opened at
/// initialization.
///
/// Writes go straight to the file descriptor with a single `write(2)`, which
/// keeps the sink usable from a signal handler.
#[derive(Debug)]
pub struct Sink {
    fd: RawFd,
    // keeps the descriptor open for the life of the sink
    file: Option<File>,
}

impl Sink {
    pub fn stderr() -> Self {
        Self {
            fd: libc::STDERR_FILENO,
            file: None,
        }
    }

    /// Opens `path` for appending, creating it with mode `0600`.
    ///
    /// `Options::TRUNCATE` empties an existing file first;
    /// `Options::TIME_SUFFIX` opens `<path>_<YYYY-MM-DD>_<HH:MM:SS>.log`
    /// instead of `path` itself.
    pub fn open(path: &Path, options: Options) -> io::Result<Self> {
        let path = if options.contains(Options::TIME_SUFFIX) {
            suffixed_path(path, &Local::now())
        } else {
            path.to_path_buf()
        };

        // std refuses append together with truncate, so O_TRUNC goes in raw
        let truncate = if options.contains(Options::TRUNCATE) {
            libc::O_TRUNC
        } else {
            0
        };

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .custom_flags(truncate)
            .mode(0o600)
            .open(&path)?;

        tracing::debug!(path = %path.display(), fd = file.as_raw_fd(), "opened diagnostic sink");

        Ok(Self {
            fd: file.as_raw_fd(),
            file: Some(file),
        })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn is_stderr(&self) -> bool {
        self.file.is_none()
    }

    /// Writes `bytes` with exactly one `write(2)` call.
    ///
    /// Partial output cannot be repaired, so anything short of the full span
    /// is an error.
    pub fn write_once(&self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let written = unsafe { libc::write(self.fd, bytes.as_ptr().cast(), bytes.len()) };
        if written < 0 {
            return Err(io::Error::last_os_error());
        }

        if written as usize != bytes.len() {
            return Err(io::Error::from(io::ErrorKind::WriteZero));
        }

        Ok(())
    }
}

/// Builds `<path>_<YYYY-MM-DD>_<HH:MM:SS>.log` for the given local time.
pub fn suffixed_path(path: &Path, now: &DateTime<Local>) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(now.format("_%Y-%m-%d_%H:%M:%S.log").to_string());

    tracing::debug!(path = ?name, "using time-suffixed sink path");
    PathBuf::from(name)
}
