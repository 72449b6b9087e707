//! The diagnostic state and its record paths.
//!
//! Normally a single instance lives for the whole process, created by
//! [`init`] and reached through the free functions of this crate. A
//! `Diagnostics` can also be built and used on its own, which is what the
//! tests do; such an instance never touches signal dispositions.

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::dump;
use crate::error::SetupError;
use crate::escalate::{self, ErrorDetail};
use crate::options::{Channel, Config, Options};
use crate::record_clock::{LocalClock, Timestamp};
use crate::signal_handler::{self, FatalWorkspace};
use crate::sink::Sink;
use crate::stack_capture::StackTrace;
use crate::staging_buffer::{RecordBuffer, BUFFER_LEN};
use crate::symbol_resolver::{NameDemangler, SymbolResolver};

/// Longest wait for the diagnostic lock before the process is terminated.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a record path writes into: the record buffer, the reusable
/// stack snapshot and, with a demangler, the scratch for demangled names.
pub(crate) struct Workspace {
    pub(crate) buffer: RecordBuffer,
    pub(crate) trace: StackTrace,
    pub(crate) scratch: Option<Box<[u8]>>,
}

impl Workspace {
    pub(crate) fn new(demangling: bool) -> Self {
        Self {
            buffer: RecordBuffer::new(),
            trace: StackTrace::new(),
            scratch: demangling.then(|| vec![0u8; BUFFER_LEN].into_boxed_slice()),
        }
    }
}

/// Process diagnostic state: the sink, the configuration, and two disjoint
/// workspaces.
///
/// The synchronous workspace is guarded by a mutex taken with a bounded wait.
/// The fatal workspace belongs to the signal handler alone, so a signal that
/// lands while the mutex is held cannot corrupt a record being built.
///
/// # Examples
///
/// ```
/// # use crash_logger::{Channel, Config, Diagnostics};
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("diag.log");
/// const NET: Channel = Channel::bit(0);
/// const DISK: Channel = Channel::bit(1);
///
/// let diagnostics = Diagnostics::new(
///     Config::new().sink_path(&path).channels(NET),
/// ).unwrap();
///
/// diagnostics.log(NET, format_args!("connected to {}", "10.0.0.1"));
/// diagnostics.log(DISK, format_args!("never written"));
///
/// assert_eq!(std::fs::read_to_string(&path).unwrap(), "connected to 10.0.0.1\n");
/// ```
pub struct Diagnostics {
    sink: Sink,
    options: Options,
    channels: Channel,
    clock: LocalClock,
    demangler: Option<Box<dyn NameDemangler>>,
    workspace: Mutex<Workspace>,
    fatal: FatalWorkspace,
}

impl Diagnostics {
    /// Opens the sink and reserves both workspaces.
    ///
    /// # Errors
    ///
    /// `SetupError::OpenSink` if the sink file cannot be opened.
    pub fn new(config: Config) -> Result<Self, SetupError> {
        let Config {
            sink_path,
            options,
            channels,
            demangler,
        } = config;

        let sink = match sink_path {
            Some(path) => Sink::open(&path, options)
                .map_err(|source| SetupError::OpenSink { path, source })?,
            None => Sink::stderr(),
        };

        let demangling = demangler.is_some();
        tracing::debug!(
            ?options,
            channels = format_args!("{:#x}", Channel::enabled(channels).bits()),
            demangling,
            stderr = sink.is_stderr(),
            "diagnostics configured"
        );

        Ok(Self {
            sink,
            options,
            channels: Channel::enabled(channels),
            clock: LocalClock::new(),
            demangler,
            workspace: Mutex::new(Workspace::new(demangling)),
            fatal: FatalWorkspace::new(Workspace::new(demangling)),
        })
    }

    pub fn options(&self) -> Options {
        self.options
    }

    /// The enabled channels; never empty.
    pub fn channels(&self) -> Channel {
        self.channels
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.channels.intersects(channel)
    }

    /// Writes one record: optional timestamp, the formatted text, a newline.
    ///
    /// Does nothing at all, not even locking, when `channel` is disabled.
    pub fn log(&self, channel: Channel, args: fmt::Arguments<'_>) {
        if !self.is_enabled(channel) {
            return;
        }

        let (mut workspace, timestamp) = self.acquire();
        let buffer = &mut workspace.buffer;
        buffer.reset();
        self.stamp(buffer, timestamp);
        buffer.append(args);
        buffer.push_byte(b'\n');
        self.flush(buffer);
    }

    /// Writes a record followed by a hexdump of `data`.
    ///
    /// The first line is `label`; then one row per 16 bytes. Same channel
    /// gating as [`Diagnostics::log`].
    pub fn hexdump(&self, channel: Channel, label: &str, data: &[u8]) {
        if !self.is_enabled(channel) {
            return;
        }

        let (mut workspace, timestamp) = self.acquire();
        let buffer = &mut workspace.buffer;
        buffer.reset();
        self.stamp(buffer, timestamp);
        buffer.append(format_args!("{}\n", label));
        dump::render_hex(buffer, data);
        self.flush(buffer);
    }

    /// Writes a record followed by a binary dump of `data`, 8 bytes a row.
    pub fn bindump(&self, channel: Channel, label: &str, data: &[u8]) {
        if !self.is_enabled(channel) {
            return;
        }

        let (mut workspace, timestamp) = self.acquire();
        let buffer = &mut workspace.buffer;
        buffer.reset();
        self.stamp(buffer, timestamp);
        buffer.append(format_args!("{}\n", label));
        dump::render_bin(buffer, data);
        self.flush(buffer);
    }

    /// Writes the message and a backtrace, then terminates the process.
    ///
    /// The lock is taken like any other record and never released. With
    /// `Options::CORE_DUMP` the process ends through `SIGABRT`, otherwise it
    /// exits with `EXIT_FAILURE`. A panic while the report is built (from a
    /// `Display` implementation in `args`, say) is escalated; it never
    /// unwinds into the caller.
    pub fn throw(&self, args: fmt::Arguments<'_>) -> ! {
        let (mut workspace, timestamp) = self.acquire();

        let rendered = panic::catch_unwind(AssertUnwindSafe(|| {
            self.render_report(&mut workspace, timestamp, args)
        }));
        match rendered {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.escalate("demangler failed", &err),
            // the guard is still held: nobody else writes from here on
            Err(_) => escalate::fatal(
                Some(self.sink.fd()),
                "throw interrupted by a panic",
                &"report abandoned",
            ),
        }

        self.flush(&mut workspace.buffer);
        signal_handler::terminate(self.options)
    }

    fn render_report(
        &self,
        workspace: &mut Workspace,
        timestamp: Timestamp,
        args: fmt::Arguments<'_>,
    ) -> io::Result<()> {
        let Workspace {
            buffer,
            trace,
            scratch,
        } = workspace;

        trace.capture();

        buffer.reset();
        self.stamp(buffer, timestamp);
        buffer.append(args);
        buffer.push_bytes(b"\n\n");

        let scratch: &mut [u8] = scratch.as_deref_mut().unwrap_or_default();
        SymbolResolver::new(self.demangler()).render(trace, buffer, scratch)
    }

    /// Takes the diagnostic lock, waiting at most [`LOCK_TIMEOUT`].
    ///
    /// The timestamp is read after the lock is held, so it orders records the
    /// same way the lock does. A timeout terminates the process.
    fn acquire(&self) -> (MutexGuard<'_, Workspace>, Timestamp) {
        match self.workspace.try_lock_for(LOCK_TIMEOUT) {
            Some(guard) => (guard, self.clock.now()),
            // shared state is off limits without the lock: stderr only
            None => escalate::fatal(
                None,
                "locking timed out",
                &format_args!("lock not acquired within {}s", LOCK_TIMEOUT.as_secs()),
            ),
        }
    }

    /// Writes the timestamp prefix, which does not count against the
    /// record's capacity.
    fn stamp(&self, buffer: &mut RecordBuffer, timestamp: Timestamp) {
        if self.options.contains(Options::TIMESTAMP) {
            buffer.append(format_args!("{}", timestamp));
            buffer.exclude_prefix();
        }
    }

    fn flush(&self, buffer: &mut RecordBuffer) {
        if let Err(err) = buffer.flush(&self.sink) {
            self.escalate("write()", &err);
        }
    }

    pub(crate) fn escalate(&self, what: &str, err: &io::Error) -> ! {
        escalate::fatal(Some(self.sink.fd()), what, &ErrorDetail(err))
    }

    pub(crate) fn demangler(&self) -> Option<&dyn NameDemangler> {
        self.demangler.as_deref()
    }

    pub(crate) fn clock(&self) -> &LocalClock {
        &self.clock
    }

    pub(crate) fn fatal_workspace(&self) -> &FatalWorkspace {
        &self.fatal
    }
}

static DIAGNOSTICS: OnceLock<Diagnostics> = OnceLock::new();

// serializes `try_init`, so a losing call never opens (or truncates) the sink
static INIT: Mutex<()> = parking_lot::const_mutex(());

/// Creates the process-wide diagnostic state.
///
/// Must run once, before any other call of this crate. Unless
/// `Options::NO_SIGNALS` is set, the calling thread gets an alternate signal
/// stack and fatal signals (`SIGABRT`, `SIGBUS`, `SIGFPE`, `SIGILL`,
/// `SIGSEGV`, `SIGSYS`, `SIGTRAP`) are routed to the crash reporter.
///
/// Any setup failure, including a second call, is reported on standard error
/// and terminates the process.
pub fn init(config: Config) -> &'static Diagnostics {
    match try_init(config) {
        Ok(diagnostics) => diagnostics,
        Err(err) => escalate::fatal(None, "initialization failed", &err),
    }
}

/// [`init`] that hands setup failures back to the caller.
///
/// A call after a successful one fails with `SetupError::AlreadyInitialized`
/// before touching the sink. The state is published only once every step has
/// succeeded; if installing the signal handlers fails part way, the handlers
/// already in place find no state and fall back to the default action.
pub fn try_init(config: Config) -> Result<&'static Diagnostics, SetupError> {
    let _init = INIT.lock();
    if DIAGNOSTICS.get().is_some() {
        return Err(SetupError::AlreadyInitialized);
    }

    let diagnostics = Diagnostics::new(config)?;
    if !diagnostics.options().contains(Options::NO_SIGNALS) {
        signal_handler::install()?;
    }

    DIAGNOSTICS
        .set(diagnostics)
        .map_err(|_| SetupError::AlreadyInitialized)?;
    let diagnostics = DIAGNOSTICS.get().ok_or(SetupError::AlreadyInitialized)?;

    tracing::info!(options = ?diagnostics.options(), "crash logger initialized");
    Ok(diagnostics)
}

/// The process-wide state, once [`init`] has run.
pub fn global() -> Option<&'static Diagnostics> {
    DIAGNOSTICS.get()
}

/// Whether a record on `channel` would be written. False before [`init`].
pub fn is_enabled(channel: Channel) -> bool {
    global().is_some_and(|diagnostics| diagnostics.is_enabled(channel))
}

/// [`Diagnostics::log`] on the process-wide state; a no-op before [`init`].
pub fn log(channel: Channel, args: fmt::Arguments<'_>) {
    if let Some(diagnostics) = global() {
        diagnostics.log(channel, args);
    }
}

/// [`Diagnostics::hexdump`] on the process-wide state; a no-op before [`init`].
pub fn hexdump(channel: Channel, label: &str, data: &[u8]) {
    if let Some(diagnostics) = global() {
        diagnostics.hexdump(channel, label, data);
    }
}

/// [`Diagnostics::bindump`] on the process-wide state; a no-op before [`init`].
pub fn bindump(channel: Channel, label: &str, data: &[u8]) {
    if let Some(diagnostics) = global() {
        diagnostics.bindump(channel, label, data);
    }
}

/// [`Diagnostics::throw`] on the process-wide state.
///
/// Before [`init`] there is no sink or backtrace machinery; the message goes
/// to standard error and the process exits.
pub fn throw(args: fmt::Arguments<'_>) -> ! {
    match global() {
        Some(diagnostics) => diagnostics.throw(args),
        None => escalate::fatal(None, "throw before init", &args),
    }
}
