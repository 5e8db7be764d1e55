use crashmark_types::InvariantError;
use std::error::Error;
use std::fmt;

/// Failure reported by the crash tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The tracker component is not loaded or not supported on this device.
    Unavailable(&'static str),
    /// A handle was passed that the tracker does not know about.
    InvalidHandle,
    /// Any other vendor result code.
    Vendor { call: &'static str, code: u32 },
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(what) => write!(f, "crash tracker unavailable: {what}"),
            Self::InvalidHandle => write!(f, "crash tracker rejected an unknown context handle"),
            Self::Vendor { call, code } => write!(f, "{call} failed with 0x{code:08X}"),
        }
    }
}

impl Error for TrackerError {}

/// Invalid configuration, usually from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
    Invariant(InvariantError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { var, value, reason } => {
                write!(f, "invalid {var}={value:?}: {reason}")
            }
            Self::Invariant(err) => write!(f, "invalid crash monitor config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Invariant(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<InvariantError> for ConfigError {
    fn from(value: InvariantError) -> Self {
        Self::Invariant(value)
    }
}

/// Crash tracking could not be set up. Always fatal: a tracker that failed to
/// initialize cannot produce a dump for anything rendered afterwards.
#[derive(Debug)]
pub enum InitError {
    Config(ConfigError),
    EnableCrashDumps(TrackerError),
    InitializeDevice(TrackerError),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::EnableCrashDumps(err) => write!(f, "failed to enable GPU crash dumps: {err}"),
            Self::InitializeDevice(err) => {
                write!(f, "failed to initialize GPU crash tracking for device: {err}")
            }
        }
    }
}

impl Error for InitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::EnableCrashDumps(err) | Self::InitializeDevice(err) => Some(err),
        }
    }
}

impl From<ConfigError> for InitError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerError {
    /// The current frame already used every id of its ring slot.
    SlotFull { slot: usize, capacity: u64 },
    /// The marker context was released before the marker was emitted.
    ContextReleased,
    /// A device failure was already observed; no more markers are accepted.
    NotRunning,
    Tracker(TrackerError),
    Invariant(InvariantError),
}

impl fmt::Display for MarkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotFull { slot, capacity } => write!(
                f,
                "marker slot {slot} is full: a frame may record at most {capacity} markers"
            ),
            Self::ContextReleased => write!(f, "marker context was already released"),
            Self::NotRunning => write!(f, "crash monitor is no longer running"),
            Self::Tracker(err) => write!(f, "failed to set event marker: {err}"),
            Self::Invariant(err) => write!(f, "invariant violated: {err}"),
        }
    }
}

impl Error for MarkerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Tracker(err) => Some(err),
            Self::Invariant(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TrackerError> for MarkerError {
    fn from(value: TrackerError) -> Self {
        Self::Tracker(value)
    }
}

impl From<InvariantError> for MarkerError {
    fn from(value: InvariantError) -> Self {
        Self::Invariant(value)
    }
}
