use std::env;

use crash_logger::{
    diag_assert, diag_bindump, diag_hexdump, diag_log, diag_throw, Channel, Config, Options,
    RustDemangler,
};
use tracing_subscriber::EnvFilter;

const FOO: Channel = Channel::bit(0);
const BAR: Channel = Channel::bit(1);
const BAZ: Channel = Channel::bit(2);

/// Demonstrates the crash logger and then dies the way the first argument
/// asks: `segv` (default), `throw`, `assert`, `abort` or `fpe`.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let ending = args.next().unwrap_or_else(|| "segv".to_owned());

    let mut config = Config::new()
        .options(Options::TIMESTAMP)
        .channels(FOO | BAZ)
        .demangler(RustDemangler);
    if let Some(path) = args.next() {
        config = config.sink_path(path);
    }
    crash_logger::init(config);

    diag_log!(FOO, "these messages only appear on enabled channels");
    diag_log!(BAR, "channel for this message is disabled so it never appears");
    diag_log!(BAZ, "baz");

    let x = 0xdeadbeef_u32.to_ne_bytes();
    diag_hexdump!(FOO, x);
    diag_bindump!(BAZ, x);

    match ending.as_str() {
        "throw" => diag_throw!("giving up on {}", "purpose"),
        "assert" => diag_assert!(x[0] == 0),
        "abort" => std::process::abort(),
        "fpe" => unsafe {
            libc::raise(libc::SIGFPE);
        },
        _ => crash(),
    }
}

#[inline(never)]
fn crash() {
    let ptr: *mut i32 = std::ptr::null_mut();
    unsafe { ptr.write_volatile(1) };
}
