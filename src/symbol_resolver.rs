use std::ffi::c_void;
use std::fmt::{self, Write as _};
use std::io;

use crate::stack_capture::StackTrace;
use crate::staging_buffer::StagingBuffer;

/// Outcome of a demangling attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Demangle<'a> {
    /// The readable name, stored in the destination buffer.
    Demangled(&'a str),
    /// The name is not in a scheme this demangler understands; the raw name
    /// is used as is.
    NotApplicable,
    /// The demangler could not do its job (bad arguments, no room). Treated as
    /// an unrecoverable failure of the diagnostic path.
    Failed,
}

/// Pluggable symbol-name demangling.
///
/// Implementations write the demangled name into `dest` and must not
/// allocate: they may be called from a fatal-signal handler.
///
/// # Examples
///
/// ```
/// # use crash_logger::{Demangle, NameDemangler};
/// struct Upper;
///
/// impl NameDemangler for Upper {
///     fn demangle<'a>(&self, raw: &str, dest: &'a mut [u8]) -> Demangle<'a> {
///         if raw.len() > dest.len() {
///             return Demangle::Failed;
///         }
///         let out = &mut dest[..raw.len()];
///         out.copy_from_slice(raw.as_bytes());
///         out.make_ascii_uppercase();
///         match std::str::from_utf8(out) {
///             Ok(name) => Demangle::Demangled(name),
///             Err(_) => Demangle::Failed,
///         }
///     }
/// }
///
/// let mut scratch = [0u8; 16];
/// assert_eq!(Upper.demangle("main", &mut scratch), Demangle::Demangled("MAIN"));
/// ```
pub trait NameDemangler: Send + Sync {
    fn demangle<'a>(&self, raw: &str, dest: &'a mut [u8]) -> Demangle<'a>;
}

/// Demangles Rust symbols (legacy and v0) with `rustc-demangle`, dropping the
/// trailing hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustDemangler;

impl NameDemangler for RustDemangler {
    fn demangle<'a>(&self, raw: &str, dest: &'a mut [u8]) -> Demangle<'a> {
        if dest.is_empty() {
            return Demangle::Failed;
        }

        let Ok(symbol) = rustc_demangle::try_demangle(raw) else {
            return Demangle::NotApplicable;
        };

        let mut writer = SliceWriter {
            dest: &mut *dest,
            len: 0,
        };
        if write!(writer, "{:#}", symbol).is_err() {
            return Demangle::Failed;
        }
        let len = writer.len;

        let dest: &'a [u8] = dest;
        match std::str::from_utf8(&dest[..len]) {
            Ok(name) => Demangle::Demangled(name),
            Err(_) => Demangle::Failed,
        }
    }
}

/// `fmt::Write` over a fixed slice; errors once the slice is full.
struct SliceWriter<'b> {
    dest: &'b mut [u8],
    len: usize,
}

impl fmt::Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        if end > self.dest.len() {
            return Err(fmt::Error);
        }
        self.dest[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolveMode {
    // through backtrace's global lock
    Synchronized,
    Unsynchronized,
}

/// Turns captured frames into `[<rank>] <name>()` lines.
pub struct SymbolResolver<'d> {
    demangler: Option<&'d dyn NameDemangler>,
    mode: ResolveMode,
}

impl<'d> SymbolResolver<'d> {
    pub fn new(demangler: Option<&'d dyn NameDemangler>) -> Self {
        Self {
            demangler,
            mode: ResolveMode::Synchronized,
        }
    }

    /// A resolver that symbolizes without `backtrace`'s global lock, for the
    /// fatal-signal path.
    ///
    /// # Safety
    ///
    /// While it renders, no other thread may capture or resolve through
    /// `backtrace`; see `backtrace::resolve_unsynchronized`.
    pub unsafe fn unsynchronized(demangler: Option<&'d dyn NameDemangler>) -> Self {
        Self {
            demangler,
            mode: ResolveMode::Unsynchronized,
        }
    }

    /// Appends one line per named frame of `trace` to `buffer`.
    ///
    /// The rank of frame `i` is `depth - i`, so the innermost frame carries
    /// the highest number. Frames without a symbol name are skipped. When
    /// inlining yields several symbols for one frame, only the first named one
    /// is printed.
    ///
    /// `scratch` receives demangled names; it is unused without a demangler.
    ///
    /// # Errors
    ///
    /// `ErrorKind::InvalidData` when the demangler reports
    /// `Demangle::Failed`.
    pub fn render<const CAP: usize>(
        &self,
        trace: &StackTrace,
        buffer: &mut StagingBuffer<CAP>,
        scratch: &mut [u8],
    ) -> io::Result<()> {
        let depth = trace.depth();

        for (index, &ip) in trace.frames().iter().enumerate() {
            if buffer.is_truncated() {
                break;
            }

            let rank = depth - index;
            let mut rendered = false;
            let mut outcome = Ok(());

            let mut on_symbol = |symbol: &backtrace::Symbol| {
                if rendered {
                    return;
                }
                if let Some(name) = symbol.name() {
                    rendered = true;
                    outcome = self.render_frame(rank, name.as_bytes(), buffer, scratch);
                }
            };

            match self.mode {
                ResolveMode::Synchronized => backtrace::resolve(ip as *mut c_void, &mut on_symbol),
                // exclusivity promised by the caller of `unsynchronized`
                ResolveMode::Unsynchronized => unsafe {
                    backtrace::resolve_unsynchronized(ip as *mut c_void, &mut on_symbol)
                },
            }

            outcome?;
        }

        Ok(())
    }

    fn render_frame<const CAP: usize>(
        &self,
        rank: usize,
        raw: &[u8],
        buffer: &mut StagingBuffer<CAP>,
        scratch: &mut [u8],
    ) -> io::Result<()> {
        // nothing useful to print for an empty name
        if raw.is_empty() {
            return Ok(());
        }

        if let (Some(demangler), Ok(text)) = (self.demangler, std::str::from_utf8(raw)) {
            match demangler.demangle(text, scratch) {
                Demangle::Demangled(name) => {
                    buffer.append(format_args!("[{}] {}()\n", rank, name));
                    return Ok(());
                }
                Demangle::NotApplicable => {}
                Demangle::Failed => return Err(io::Error::from(io::ErrorKind::InvalidData)),
            }
        }

        buffer.append(format_args!("[{}] ", rank));
        buffer.push_bytes(raw);
        buffer.push_bytes(b"()\n");
        Ok(())
    }
}
