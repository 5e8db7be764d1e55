use std::str::FromStr;
use std::time::Duration;

use crashmark_types::{InvariantError, MarkerMode};

use crate::ConfigError;

pub const DEFAULT_RING_SLOTS: usize = 4;
pub const DEFAULT_SLOT_CAPACITY: u64 = 10_000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_DUMP_TIMEOUT: Duration = Duration::from_secs(3);

pub const RING_SLOTS_ENV: &str = "CRASHMARK_RING_SLOTS";
pub const SLOT_CAPACITY_ENV: &str = "CRASHMARK_SLOT_CAPACITY";
pub const MARKER_MODE_ENV: &str = "CRASHMARK_MARKER_MODE";
pub const POLL_INTERVAL_ENV: &str = "CRASHMARK_POLL_INTERVAL_MS";
pub const DUMP_TIMEOUT_ENV: &str = "CRASHMARK_DUMP_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Number of frames of marker history kept in the ring.
    pub ring_slots: usize,
    /// Maximum number of markers one frame may record.
    pub slot_capacity: u64,
    pub marker_mode: MarkerMode,
    /// Delay between two crash-dump status polls after a device failure.
    pub poll_interval: Duration,
    /// Upper bound on how long a device failure waits for the dump writer.
    pub dump_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ring_slots: DEFAULT_RING_SLOTS,
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            marker_mode: MarkerMode::AppManaged,
            poll_interval: DEFAULT_POLL_INTERVAL,
            dump_timeout: DEFAULT_DUMP_TIMEOUT,
        }
    }
}

impl MonitorConfig {
    /// Defaults overridden by `CRASHMARK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`MonitorConfig::from_env`] but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(slots) = parse_var::<usize>(&lookup, RING_SLOTS_ENV)? {
            config.ring_slots = slots;
        }
        if let Some(capacity) = parse_var::<u64>(&lookup, SLOT_CAPACITY_ENV)? {
            config.slot_capacity = capacity;
        }
        if let Some(value) = lookup(MARKER_MODE_ENV) {
            config.marker_mode =
                MarkerMode::parse(&value).ok_or_else(|| ConfigError::Invalid {
                    var: MARKER_MODE_ENV,
                    value: value.clone(),
                    reason: "expected `app-managed` or `inline`",
                })?;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, POLL_INTERVAL_ENV)? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, DUMP_TIMEOUT_ENV)? {
            config.dump_timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_slots == 0 {
            return Err(InvariantError::ZeroSize("ring_slots").into());
        }
        if self.slot_capacity == 0 {
            return Err(InvariantError::ZeroSize("slot_capacity").into());
        }
        if self.poll_interval.is_zero() {
            return Err(InvariantError::ZeroSize("poll_interval").into());
        }
        // the largest id is ring_slots * slot_capacity
        (self.ring_slots as u64)
            .checked_mul(self.slot_capacity)
            .ok_or(InvariantError::IdSpaceOverflow {
                ring_slots: self.ring_slots as u64,
                slot_capacity: self.slot_capacity,
            })?;
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::Invalid {
            var,
            value,
            reason: "expected an unsigned integer",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = MonitorConfig::from_lookup(lookup_from(&[])).expect("defaults are valid");
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.ring_slots, 4);
        assert_eq!(config.slot_capacity, 10_000);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.dump_timeout, Duration::from_secs(3));
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = MonitorConfig::from_lookup(lookup_from(&[
            (RING_SLOTS_ENV, "8"),
            (SLOT_CAPACITY_ENV, "500"),
            (MARKER_MODE_ENV, "inline"),
            (POLL_INTERVAL_ENV, "10"),
            (DUMP_TIMEOUT_ENV, "750"),
        ]))
        .expect("overrides are valid");
        assert_eq!(config.ring_slots, 8);
        assert_eq!(config.slot_capacity, 500);
        assert_eq!(config.marker_mode, MarkerMode::Inline);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.dump_timeout, Duration::from_millis(750));
    }

    #[test]
    fn rejects_garbage_values() {
        let err = MonitorConfig::from_lookup(lookup_from(&[(POLL_INTERVAL_ENV, "soon")]))
            .expect_err("non-numeric interval must fail");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: POLL_INTERVAL_ENV,
                ..
            }
        ));

        let err = MonitorConfig::from_lookup(lookup_from(&[(MARKER_MODE_ENV, "copy")]))
            .expect_err("unknown mode must fail");
        assert!(err.to_string().contains("CRASHMARK_MARKER_MODE"), "{err}");
    }

    #[test]
    fn rejects_zero_sizes() {
        let err = MonitorConfig::from_lookup(lookup_from(&[(RING_SLOTS_ENV, "0")]))
            .expect_err("zero slots must fail");
        assert_eq!(
            err,
            ConfigError::Invariant(InvariantError::ZeroSize("ring_slots"))
        );

        let config = MonitorConfig {
            slot_capacity: u64::MAX,
            ..MonitorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invariant(InvariantError::IdSpaceOverflow { .. }))
        ));
    }
}
