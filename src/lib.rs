//! # Crash Logger
//!
//! A crash-safe diagnostic logging engine for a single process:
//!
//! * **Channel-filtered records**: 64 channels chosen at startup; a record on
//!   a disabled channel costs one bit test
//! * **Serialized output**: records from concurrent threads never interleave
//! * **Fatal reports**: explicit throws, failed assertions and fatal signals
//!   write the message and a symbolized backtrace, then end the process
//! * **Bounded memory**: every record is built in a fixed buffer; oversized
//!   output is truncated and marked, never overrun
//!
//! ## Main Components
//!
//! * `Diagnostics`: the diagnostic state and its record paths
//! * `staging_buffer`: fixed-capacity record buffers with overflow containment
//! * `stack_capture` / `symbol_resolver`: backtrace capture and rendering,
//!   with a pluggable `NameDemangler`
//! * `signal_handler`: the fatal-signal reporter, running on an alternate stack
//! * `dump`: hex and binary renderings of raw memory
//! * `LogBridge`: routes the `log` facade into a channel
//!
//! ## Quick Start
//!
//! ```no_run
//! use crash_logger::{diag_assert, diag_hexdump, diag_log, Channel, Config, Options};
//!
//! const NET: Channel = Channel::bit(0);
//! const DISK: Channel = Channel::bit(1);
//!
//! crash_logger::init(
//!     Config::new()
//!         .options(Options::TIMESTAMP)
//!         .channels(NET),
//! );
//!
//! diag_log!(NET, "listening on port {}", 8080);
//! diag_log!(DISK, "filtered out, costs a bit test");
//!
//! let header = 0xdeadbeef_u32.to_be_bytes();
//! diag_hexdump!(NET, header);
//!
//! let connections = 0;
//! diag_assert!(connections == 0);
//! ```
//!
//! A record looks like `[12:04:59][NET::server(14)] listening on port 8080`.
//! A fatal report ends with a backtrace block of `[<rank>] <symbol>()` lines,
//! the innermost frame carrying the highest rank.

pub mod crash_logger;
pub mod dump;
pub mod error;
pub mod escalate;
pub mod log_bridge;
pub mod options;
pub mod record_clock;
pub mod signal_handler;
pub mod sink;
pub mod stack_capture;
pub mod staging_buffer;
pub mod symbol_resolver;

pub use crate::crash_logger::{
    bindump, global, hexdump, init, is_enabled, log, throw, try_init, Diagnostics, LOCK_TIMEOUT,
};
pub use error::SetupError;
pub use log_bridge::LogBridge;
pub use options::{Channel, Config, Options};
pub use symbol_resolver::{Demangle, NameDemangler, RustDemangler};

/// Writes a record on a channel, prefixed with `[<CHANNEL>::<module>(<line>)] `.
///
/// The core appends the newline; the format string should not end with one.
/// Everything after the channel is handed to `format_args!` as written, so
/// inline and named arguments work.
///
/// # Examples
///
/// ```no_run
/// # use crash_logger::{diag_log, Channel};
/// const NET: Channel = Channel::bit(0);
/// let peer = "10.0.0.7";
/// diag_log!(NET, "accepted {}", peer);
/// diag_log!(NET, "accepted {peer} on port {port}", port = 8080);
/// ```
#[macro_export]
macro_rules! diag_log {
    ($channel:path, $($arg:tt)+) => {
        $crate::log(
            $channel,
            format_args!(
                "[{}::{}({})] {}",
                stringify!($channel),
                module_path!(),
                line!(),
                format_args!($($arg)+)
            ),
        )
    };
}

/// Writes a fatal report with the caller's location and a backtrace, then
/// terminates the process.
///
/// ```no_run
/// # use crash_logger::diag_throw;
/// let state = 3;
/// if state > 2 {
///     diag_throw!("unexpected state {}", state);
/// }
/// ```
#[macro_export]
macro_rules! diag_throw {
    () => {
        $crate::throw(format_args!(
            "[crash_logger::throw] {}() {}:{}",
            module_path!(),
            file!(),
            line!()
        ))
    };
    ($($arg:tt)+) => {
        $crate::throw(format_args!(
            "[crash_logger::throw] {}() {}:{}: {}",
            module_path!(),
            file!(),
            line!(),
            format_args!($($arg)+)
        ))
    };
}

/// Throws with the condition text and the caller's location when the
/// condition is false.
#[macro_export]
macro_rules! diag_assert {
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::throw(format_args!(
                "[crash_logger::assert] {}\n{}() {}:{}",
                stringify!($cond),
                module_path!(),
                file!(),
                line!()
            ))
        }
    };
}

/// Hexdumps anything viewable as bytes, labeled `[<CHANNEL>::hexdump] <expr>`.
#[macro_export]
macro_rules! diag_hexdump {
    ($channel:path, $data:expr $(,)?) => {
        $crate::hexdump(
            $channel,
            concat!("[", stringify!($channel), "::hexdump] ", stringify!($data)),
            ::core::convert::AsRef::<[u8]>::as_ref(&$data),
        )
    };
}

/// Bindumps anything viewable as bytes, labeled `[<CHANNEL>::bindump] <expr>`.
#[macro_export]
macro_rules! diag_bindump {
    ($channel:path, $data:expr $(,)?) => {
        $crate::bindump(
            $channel,
            concat!("[", stringify!($channel), "::bindump] ", stringify!($data)),
            ::core::convert::AsRef::<[u8]>::as_ref(&$data),
        )
    };
}
