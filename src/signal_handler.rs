//! Fatal-signal reporting.
//!
//! The handler runs on an alternate stack, never takes the diagnostic lock
//! and writes only into the fatal workspace, which no other path touches.
//! Its life is one-way: capture the stack, render the report, flush it and
//! terminate. Dispositions are installed with `SA_RESETHAND`, so a second
//! delivery of the same signal while reporting falls through to the default
//! action instead of re-entering the handler.

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use libc::c_int;

use crate::crash_logger::{self, Diagnostics, Workspace};
use crate::error::SetupError;
use crate::options::Options;
use crate::staging_buffer::RecordBuffer;
use crate::symbol_resolver::SymbolResolver;

/// Signals routed to the crash reporter, with their descriptions.
pub const FATAL_SIGNALS: [(c_int, &str); 7] = [
    (libc::SIGABRT, "Aborted"),
    (libc::SIGBUS, "Bus error"),
    (libc::SIGFPE, "Floating point exception"),
    (libc::SIGILL, "Illegal instruction"),
    (libc::SIGSEGV, "Segmentation fault"),
    (libc::SIGSYS, "Bad system call"),
    (libc::SIGTRAP, "Trace/breakpoint trap"),
];

/// Size of the alternate signal stack.
///
/// Symbolizing a frame parses debug info, which needs far more room than
/// `SIGSTKSZ`; the platform minimum is only the floor.
pub const ALT_STACK_SIZE: usize = {
    let floor = 256 * 1024;
    if libc::SIGSTKSZ > floor {
        libc::SIGSTKSZ
    } else {
        floor
    }
};

/// Human-readable name of `signal`, without `strsignal(3)` (not
/// async-signal-safe).
pub fn describe(signal: c_int) -> &'static str {
    FATAL_SIGNALS
        .iter()
        .find(|(number, _)| *number == signal)
        .map_or("Unknown signal", |&(_, name)| name)
}

/// The workspace reserved for the signal handler.
///
/// It is claimed at most once per process: the first faulting thread gets it,
/// any later one parks until the first has terminated the process.
pub(crate) struct FatalWorkspace {
    claimed: AtomicBool,
    workspace: UnsafeCell<Workspace>,
}

// SAFETY: the workspace is only reachable through `claim`, which hands out a
// single mutable reference for the life of the process.
unsafe impl Sync for FatalWorkspace {}

impl FatalWorkspace {
    pub(crate) fn new(workspace: Workspace) -> Self {
        Self {
            claimed: AtomicBool::new(false),
            workspace: UnsafeCell::new(workspace),
        }
    }

    /// Returns the workspace to the first caller and `None` to every other.
    ///
    /// # Safety
    ///
    /// The caller must never return control to code that could call `claim`
    /// again expecting the workspace to be free; in practice, the caller
    /// terminates the process.
    #[allow(clippy::mut_from_ref)]
    unsafe fn claim(&self) -> Option<&mut Workspace> {
        if self.claimed.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(&mut *self.workspace.get())
    }
}

/// Gives the calling thread an alternate signal stack and routes every signal
/// of [`FATAL_SIGNALS`] to the crash reporter.
pub(crate) fn install() -> Result<(), SetupError> {
    // lives until the process exits
    let stack: &'static mut [u8] = Box::leak(vec![0u8; ALT_STACK_SIZE].into_boxed_slice());
    let alt_stack = libc::stack_t {
        ss_sp: stack.as_mut_ptr().cast(),
        ss_flags: 0,
        ss_size: stack.len(),
    };

    if unsafe { libc::sigaltstack(&alt_stack, ptr::null_mut()) } != 0 {
        return Err(SetupError::AltStack(io::Error::last_os_error()));
    }

    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = handle_fatal_signal as usize;
    action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK | libc::SA_RESETHAND;
    unsafe { libc::sigemptyset(&mut action.sa_mask) };

    for (signal, _) in FATAL_SIGNALS {
        if unsafe { libc::sigaction(signal, &action, ptr::null_mut()) } != 0 {
            return Err(SetupError::SignalAction {
                signal,
                source: io::Error::last_os_error(),
            });
        }
    }

    tracing::debug!(
        stack_size = ALT_STACK_SIZE,
        signals = FATAL_SIGNALS.len(),
        "fatal signal handlers installed"
    );
    Ok(())
}

extern "C" fn handle_fatal_signal(signal: c_int, info: *mut libc::siginfo_t, _context: *mut c_void) {
    let errno = if info.is_null() {
        0
    } else {
        unsafe { (*info).si_errno }
    };

    match crash_logger::global() {
        Some(diagnostics) => report(diagnostics, signal, errno),
        None => reraise(signal),
    }
}

fn report(diagnostics: &Diagnostics, signal: c_int, errno: c_int) -> ! {
    // SAFETY: this call ends in `terminate` or `escalate`; it never returns.
    let Some(workspace) = (unsafe { diagnostics.fatal_workspace().claim() }) else {
        // another thread is already reporting and will end the process
        loop {
            unsafe { libc::pause() };
        }
    };
    let Workspace {
        buffer,
        trace,
        scratch,
    } = workspace;

    // SAFETY: the claim above makes this the only unwinder running here.
    unsafe { trace.capture_unsynchronized() };

    buffer.reset();
    if diagnostics.options().contains(Options::TIMESTAMP) {
        if let Some(timestamp) = diagnostics.clock().now_signal_safe() {
            buffer.append(format_args!("{}", timestamp));
            buffer.exclude_prefix();
        }
    }
    write_headline(buffer, signal, errno);

    let scratch: &mut [u8] = scratch.as_deref_mut().unwrap_or_default();
    // SAFETY: as for the capture, the fatal workspace is held exclusively.
    let resolver = unsafe { SymbolResolver::unsynchronized(diagnostics.demangler()) };
    if let Err(err) = resolver.render(trace, buffer, scratch) {
        diagnostics.escalate("demangler failed", &err);
    }

    if let Err(err) = buffer.flush(diagnostics.sink()) {
        diagnostics.escalate("write()", &err);
    }

    terminate(diagnostics.options())
}

/// `[crash_logger::signal] <description>[; errno <n>]` and a blank line.
fn write_headline(buffer: &mut RecordBuffer, signal: c_int, errno: c_int) {
    buffer.append(format_args!("[crash_logger::signal] {}", describe(signal)));
    if errno != 0 {
        buffer.append(format_args!("; errno {}", errno));
    }
    buffer.push_bytes(b"\n\n");
}

/// Restores the default action for `signal` and delivers it again.
fn reraise(signal: c_int) -> ! {
    unsafe {
        libc::signal(signal, libc::SIG_DFL);
        unblock(signal);
        libc::raise(signal);
        libc::_exit(libc::EXIT_FAILURE)
    }
}

/// Ends the process after a fatal report.
///
/// With `Options::CORE_DUMP`, `SIGABRT` is reset to its default action,
/// unblocked and raised so the system can write a core image. Otherwise, or
/// if that somehow returns, the process exits with `EXIT_FAILURE` without
/// running exit handlers.
pub(crate) fn terminate(options: Options) -> ! {
    if options.contains(Options::CORE_DUMP) {
        unsafe {
            libc::signal(libc::SIGABRT, libc::SIG_DFL);
            unblock(libc::SIGABRT);
            libc::raise(libc::SIGABRT);
        }
    }

    unsafe { libc::_exit(libc::EXIT_FAILURE) }
}

// a signal is blocked while its own handler runs
unsafe fn unblock(signal: c_int) {
    let mut set: libc::sigset_t = mem::zeroed();
    libc::sigemptyset(&mut set);
    libc::sigaddset(&mut set, signal);
    libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, ptr::null_mut());
}
