use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::crash_logger::{self, Diagnostics};
use crate::options::Channel;

/// Routes records of the `log` facade into crash-logger channels.
///
/// Every `log::Level` maps to a channel (all to the same one by default), so
/// libraries that log through `log` share the sink, lock and channel filter of
/// the crash logger. Records are written as `[<LEVEL>::<target>] <message>`.
///
/// # Examples
///
/// ```no_run
/// # use crash_logger::{Channel, Config, LogBridge};
/// # use log::{Level, LevelFilter};
/// const DEPS: Channel = Channel::bit(10);
/// const DEPS_DEBUG: Channel = Channel::bit(11);
///
/// crash_logger::init(Config::new().channels(DEPS));
/// LogBridge::new(DEPS)
///     .with_level(Level::Debug, DEPS_DEBUG)
///     .with_level(Level::Trace, DEPS_DEBUG)
///     .install(LevelFilter::Debug)
///     .unwrap();
///
/// log::warn!("disk almost full");
/// ```
pub struct LogBridge {
    channels: [Channel; 5],
    target: Option<&'static Diagnostics>,
}

impl LogBridge {
    /// A bridge sending every level to `channel` of the process-wide state.
    pub fn new(channel: Channel) -> Self {
        Self {
            channels: [channel; 5],
            target: None,
        }
    }

    /// Sends records to `diagnostics` instead of the process-wide state.
    pub fn to(mut self, diagnostics: &'static Diagnostics) -> Self {
        self.target = Some(diagnostics);
        self
    }

    pub fn with_level(mut self, level: Level, channel: Channel) -> Self {
        self.channels[slot(level)] = channel;
        self
    }

    pub fn channel_for(&self, level: Level) -> Channel {
        self.channels[slot(level)]
    }

    /// Registers the bridge as the `log` logger.
    pub fn install(self, max_level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

fn slot(level: Level) -> usize {
    level as usize - 1
}

impl LogBridge {
    fn diagnostics(&self) -> Option<&'static Diagnostics> {
        self.target.or_else(crash_logger::global)
    }
}

impl Log for LogBridge {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        let channel = self.channel_for(metadata.level());
        self.diagnostics()
            .is_some_and(|diagnostics| diagnostics.is_enabled(channel))
    }

    fn log(&self, record: &Record<'_>) {
        let Some(diagnostics) = self.diagnostics() else {
            return;
        };

        diagnostics.log(
            self.channel_for(record.level()),
            format_args!("[{}::{}] {}", record.level(), record.target(), record.args()),
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_map_to_channels() {
        let bridge = LogBridge::new(Channel::bit(0)).with_level(Level::Trace, Channel::bit(9));
        assert_eq!(bridge.channel_for(Level::Error), Channel::bit(0));
        assert_eq!(bridge.channel_for(Level::Debug), Channel::bit(0));
        assert_eq!(bridge.channel_for(Level::Trace), Channel::bit(9));
    }

    #[test]
    fn test_disabled_without_global_state() {
        // no init in unit tests: nothing is enabled
        let bridge = LogBridge::new(Channel::ALL);
        let metadata = Metadata::builder().level(Level::Error).build();
        assert!(!bridge.enabled(&metadata));
    }
}
