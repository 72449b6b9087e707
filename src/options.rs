use std::fmt;
use std::ops::BitOr;
use std::path::PathBuf;

use bitflags::bitflags;

use crate::symbol_resolver::NameDemangler;

bitflags! {
    /// Behavior flags chosen at initialization.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Options: u32 {
        /// Prefix every record with `[HH:MM:SS]` local time.
        const TIMESTAMP = 0x1;
        /// Truncate the sink file when opening it.
        const TRUNCATE = 0x2;
        /// Open `<path>_<YYYY-MM-DD>_<HH:MM:SS>.log` instead of `<path>`.
        const TIME_SUFFIX = 0x4;
        /// Leave signal dispositions and the alternate stack alone.
        const NO_SIGNALS = 0x8;
        /// Terminate fatal paths with `SIGABRT` so the system can write a core.
        const CORE_DUMP = 0x10;
    }
}

/// A set of log channels, one bit per channel.
///
/// # Examples
///
/// ```
/// # use crash_logger::Channel;
/// const NET: Channel = Channel::bit(0);
/// const DISK: Channel = Channel::bit(5);
///
/// let enabled = NET | DISK;
/// assert!(enabled.intersects(NET));
/// assert!(!enabled.intersects(Channel::bit(1)));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel(u64);

impl Channel {
    pub const ALL: Channel = Channel(u64::MAX);
    pub const NONE: Channel = Channel(0);

    /// The channel at bit `position`.
    ///
    /// # Panics
    ///
    /// If `position` is 64 or more (at compile time when used in a `const`).
    pub const fn bit(position: u32) -> Self {
        assert!(position < 64, "channel bit out of range");
        Channel(1 << position)
    }

    pub const fn mask(mask: u64) -> Self {
        Channel(mask)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn intersects(self, other: Channel) -> bool {
        self.0 & other.0 != 0
    }

    /// Resolves a configured mask: zero means every channel.
    pub const fn enabled(mask: u64) -> Self {
        if mask == 0 {
            Self::ALL
        } else {
            Channel(mask)
        }
    }
}

impl BitOr for Channel {
    type Output = Channel;

    fn bitor(self, rhs: Channel) -> Channel {
        Channel(self.0 | rhs.0)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel({:#018x})", self.0)
    }
}

/// Initialization parameters.
///
/// Defaults: records go to standard error, no options, every channel enabled,
/// no demangler.
///
/// # Examples
///
/// ```
/// # use crash_logger::{Channel, Config, Options, RustDemangler};
/// let config = Config::new()
///     .sink_path("/tmp/service-crash")
///     .options(Options::TIMESTAMP | Options::TIME_SUFFIX)
///     .channels(Channel::bit(0) | Channel::bit(3))
///     .demangler(RustDemangler);
/// ```
#[derive(Default)]
pub struct Config {
    pub(crate) sink_path: Option<PathBuf>,
    pub(crate) options: Options,
    pub(crate) channels: u64,
    pub(crate) demangler: Option<Box<dyn NameDemangler>>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirects records from standard error to a file.
    pub fn sink_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink_path = Some(path.into());
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Enables exactly these channels. An empty set enables all of them.
    pub fn channels(mut self, channels: Channel) -> Self {
        self.channels = channels.bits();
        self
    }

    pub fn demangler(mut self, demangler: impl NameDemangler + 'static) -> Self {
        self.demangler = Some(Box::new(demangler));
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("sink_path", &self.sink_path)
            .field("options", &self.options)
            .field("channels", &Channel::mask(self.channels))
            .field("demangler", &self.demangler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_bits_are_stable() {
        assert_eq!(Options::TIMESTAMP.bits(), 0x1);
        assert_eq!(Options::TRUNCATE.bits(), 0x2);
        assert_eq!(Options::TIME_SUFFIX.bits(), 0x4);
        assert_eq!(Options::NO_SIGNALS.bits(), 0x8);
        assert_eq!(Options::CORE_DUMP.bits(), 0x10);
    }

    #[test]
    fn test_zero_mask_enables_everything() {
        assert_eq!(Channel::enabled(0), Channel::ALL);
        assert_eq!(Channel::enabled(0b100), Channel::bit(2));
        assert!(Channel::enabled(0).intersects(Channel::bit(63)));
    }

    #[test]
    fn test_channel_union() {
        let set = Channel::bit(1) | Channel::bit(4);
        assert_eq!(set.bits(), 0b10010);
        assert!(set.intersects(Channel::bit(4)));
        assert!(!set.intersects(Channel::bit(0)));
        assert!(!Channel::NONE.intersects(Channel::ALL));
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .sink_path("/tmp/x")
            .options(Options::TIMESTAMP)
            .channels(Channel::bit(7));
        assert_eq!(config.sink_path.as_deref(), Some(std::path::Path::new("/tmp/x")));
        assert_eq!(config.options, Options::TIMESTAMP);
        assert_eq!(config.channels, 1 << 7);
        assert!(config.demangler.is_none());
    }
}
