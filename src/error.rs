use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while setting up the diagnostic state.
///
/// `Diagnostics::new` returns these to the caller; the process-wide `init`
/// treats every one of them as fatal.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("failed to open sink {}: {source}", .path.display())]
    OpenSink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sigaltstack() failed: {0}")]
    AltStack(#[source] io::Error),

    #[error("sigaction() failed for signal {signal}: {source}")]
    SignalAction {
        signal: i32,
        #[source]
        source: io::Error,
    },

    #[error("diagnostics already initialized")]
    AlreadyInitialized,
}
