//! Worker pool configuration
//!
//! Construction-time settings for the pool, plus loading from environment
//! variables. Configuration problems are their own error type, distinct from
//! the runtime taxonomy: they are reported once at startup, never through a
//! command's result slot.

use rcon_gateway_client::{ConnectionConfig, RetryBudget};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Budget for one shutdown phase
///
/// Distinguishes "skip the phase" from "wait forever" from "wait this long";
/// the three are easy to conflate when expressed as magic integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTimeout {
    /// Skip the phase entirely
    Disabled,
    /// Wait however long it takes
    Unbounded,
    /// Wait at most this long
    Bounded(Duration),
}

/// Configuration problems detected before the pool starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{0} has invalid value {1:?}")]
    Invalid(&'static str, String),

    #[error("worker count must be greater than zero")]
    NoWorkers,

    #[error("RCON password must not be empty")]
    EmptyPassword,
}

/// Configure the RCON worker pool behavior
///
/// Immutable once the pool is constructed.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// RCON server password
    pub password: String,
    /// RCON server port on localhost
    pub port: u16,
    /// Bound on each socket operation; `None` waits indefinitely
    pub socket_timeout: Option<Duration>,
    /// Number of concurrent workers, each with its own connection
    pub worker_count: usize,
    /// Pause between reconnection attempts
    pub reconnect_pause: Duration,
    /// Retry budget for dialing and re-dialing the server
    pub retry_attempts: RetryBudget,
    /// How long shutdown waits for queued commands to finish processing
    pub grace_period: PhaseTimeout,
    /// How long shutdown waits for workers to exit on their own
    pub await_shutdown_period: PhaseTimeout,
    /// Minimum delay between consecutive commands on a single worker,
    /// applied only after a successful send; `None` sends at full speed
    pub command_delay: Option<Duration>,
}

impl PoolConfig {
    pub const DEFAULT_PORT: u16 = 25575;
    pub const DEFAULT_WORKER_COUNT: usize = 3;
    pub const DEFAULT_RECONNECT_PAUSE: Duration = Duration::from_secs(5);

    /// A config with the given password and every other field defaulted
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            port: Self::DEFAULT_PORT,
            socket_timeout: None,
            worker_count: Self::DEFAULT_WORKER_COUNT,
            reconnect_pause: Self::DEFAULT_RECONNECT_PAUSE,
            retry_attempts: RetryBudget::Infinite,
            grace_period: PhaseTimeout::Disabled,
            await_shutdown_period: PhaseTimeout::Unbounded,
            command_delay: None,
        }
    }

    /// Load configuration from the process environment
    ///
    /// `RCON_PASSWORD` is required. `RCON_PORT`, `RCON_SOCKET_TIMEOUT`,
    /// `WORKER_COUNT`, `RECONNECT_PAUSE`, `SHUTDOWN_GRACE_PERIOD`,
    /// `SHUTDOWN_AWAIT_PERIOD`, and `COMMAND_DELAY` override their defaults
    /// when set. The shutdown periods accept `0` to skip the phase and the
    /// literal `none` to wait without bound (an environment variable has no
    /// way to be null).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let password = read(&lookup, "RCON_PASSWORD").ok_or(ConfigError::Missing("RCON_PASSWORD"))?;
        let mut config = Self::new(password);

        if let Some(port) = read_parsed::<u16>(&lookup, "RCON_PORT")? {
            config.port = port;
        }
        if let Some(secs) = read_parsed::<u64>(&lookup, "RCON_SOCKET_TIMEOUT")? {
            config.socket_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(count) = read_parsed::<usize>(&lookup, "WORKER_COUNT")? {
            config.worker_count = count;
        }
        if let Some(secs) = read_parsed::<u64>(&lookup, "RECONNECT_PAUSE")? {
            config.reconnect_pause = Duration::from_secs(secs);
        }
        config.grace_period =
            read_phase(&lookup, "SHUTDOWN_GRACE_PERIOD", PhaseTimeout::Disabled)?;
        config.await_shutdown_period =
            read_phase(&lookup, "SHUTDOWN_AWAIT_PERIOD", PhaseTimeout::Unbounded)?;
        if let Some(secs) = read_parsed::<f64>(&lookup, "COMMAND_DELAY")? {
            if secs.is_sign_negative() || !secs.is_finite() {
                return Err(ConfigError::Invalid("COMMAND_DELAY", secs.to_string()));
            }
            config.command_delay = (secs > 0.0).then(|| Duration::from_secs_f64(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pool cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.password.is_empty() {
            return Err(ConfigError::EmptyPassword);
        }
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("RCON_PORT", "0".into()));
        }
        Ok(())
    }

    /// Connection settings handed to each worker's client
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            password: self.password.clone(),
            port: self.port,
            socket_timeout: self.socket_timeout,
            reconnect_pause: self.reconnect_pause,
            retry_attempts: self.retry_attempts,
        }
    }
}

fn read(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Option<String> {
    lookup(name).filter(|value| !value.is_empty())
}

fn read_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = read(lookup, name) else {
        return Ok(None);
    };
    match raw.parse() {
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(ConfigError::Invalid(name, raw)),
    }
}

fn read_phase(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: PhaseTimeout,
) -> Result<PhaseTimeout, ConfigError> {
    let Some(raw) = read(lookup, name) else {
        return Ok(default);
    };
    if raw.eq_ignore_ascii_case("none") {
        return Ok(PhaseTimeout::Unbounded);
    }
    match raw.parse::<u64>() {
        Ok(0) => Ok(PhaseTimeout::Disabled),
        Ok(secs) => Ok(PhaseTimeout::Bounded(Duration::from_secs(secs))),
        Err(_) => Err(ConfigError::Invalid(name, raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |name| map.get(name).map(|value| value.to_string())
    }

    #[test]
    fn defaults_fill_everything_but_the_password() {
        let config = PoolConfig::from_lookup(lookup(&[("RCON_PASSWORD", "pw")])).unwrap();

        assert_eq!(config.password, "pw");
        assert_eq!(config.port, 25575);
        assert_eq!(config.socket_timeout, None);
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.reconnect_pause, Duration::from_secs(5));
        assert_eq!(config.retry_attempts, RetryBudget::Infinite);
        assert_eq!(config.grace_period, PhaseTimeout::Disabled);
        assert_eq!(config.await_shutdown_period, PhaseTimeout::Unbounded);
        assert_eq!(config.command_delay, None);
    }

    #[test]
    fn missing_password_is_an_error() {
        assert!(matches!(
            PoolConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("RCON_PASSWORD"))
        ));
    }

    #[test]
    fn overrides_are_applied() {
        let config = PoolConfig::from_lookup(lookup(&[
            ("RCON_PASSWORD", "pw"),
            ("RCON_PORT", "25566"),
            ("RCON_SOCKET_TIMEOUT", "10"),
            ("WORKER_COUNT", "5"),
            ("RECONNECT_PAUSE", "2"),
            ("SHUTDOWN_GRACE_PERIOD", "30"),
            ("SHUTDOWN_AWAIT_PERIOD", "none"),
            ("COMMAND_DELAY", "0.5"),
        ]))
        .unwrap();

        assert_eq!(config.port, 25566);
        assert_eq!(config.socket_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.reconnect_pause, Duration::from_secs(2));
        assert_eq!(config.grace_period, PhaseTimeout::Bounded(Duration::from_secs(30)));
        assert_eq!(config.await_shutdown_period, PhaseTimeout::Unbounded);
        assert_eq!(config.command_delay, Some(Duration::from_millis(500)));
    }

    #[test]
    fn shutdown_phase_sentinels_are_distinct() {
        let disabled = PoolConfig::from_lookup(lookup(&[
            ("RCON_PASSWORD", "pw"),
            ("SHUTDOWN_GRACE_PERIOD", "0"),
        ]))
        .unwrap();
        assert_eq!(disabled.grace_period, PhaseTimeout::Disabled);

        let unbounded = PoolConfig::from_lookup(lookup(&[
            ("RCON_PASSWORD", "pw"),
            ("SHUTDOWN_GRACE_PERIOD", "NONE"),
        ]))
        .unwrap();
        assert_eq!(unbounded.grace_period, PhaseTimeout::Unbounded);

        let bounded = PoolConfig::from_lookup(lookup(&[
            ("RCON_PASSWORD", "pw"),
            ("SHUTDOWN_GRACE_PERIOD", "1"),
        ]))
        .unwrap();
        assert_eq!(bounded.grace_period, PhaseTimeout::Bounded(Duration::from_secs(1)));
    }

    #[test]
    fn zero_workers_are_rejected() {
        let result = PoolConfig::from_lookup(lookup(&[
            ("RCON_PASSWORD", "pw"),
            ("WORKER_COUNT", "0"),
        ]));
        assert!(matches!(result, Err(ConfigError::NoWorkers)));
    }

    #[test]
    fn garbage_integers_are_rejected() {
        let result = PoolConfig::from_lookup(lookup(&[
            ("RCON_PASSWORD", "pw"),
            ("RCON_PORT", "not-a-port"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid("RCON_PORT", _))));
    }

    #[test]
    fn command_delay_of_zero_disables_pacing() {
        let config = PoolConfig::from_lookup(lookup(&[
            ("RCON_PASSWORD", "pw"),
            ("COMMAND_DELAY", "0"),
        ]))
        .unwrap();
        assert_eq!(config.command_delay, None);
    }
}
