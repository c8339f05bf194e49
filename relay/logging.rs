//! Logging setup for the relay and the CLI
//!
//! ```no_run
//! use dropclaim::logging::{init, LogLevel};
//!
//! // -v on the command line
//! init(LogLevel::from_verbosity(1));
//! ```
//!
//! `RUST_LOG` takes precedence over the requested level.

use core::fmt;
use core::str::FromStr;

use tracing_subscriber::EnvFilter;

use crate::error::{RelayError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// `false` -> `Info`, `true` -> `Debug`
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Self::Debug
        } else {
            Self::Info
        }
    }

    /// `0` -> `Info`, `1` -> `Debug`, `2+` -> `Trace`
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => Self::Info,
            1 => Self::Debug,
            _ => Self::Trace,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Filter directive: our crates at this level, dependencies at `warn`
    pub fn directive(&self) -> String {
        let level = self.as_str();
        if *self <= Self::Warn {
            level.to_string()
        } else {
            format!("warn,dropclaim={level},dropclaim_core={level},dropclaim_cli={level}")
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(RelayError::Configuration(format!("unknown log level {:?}", other))),
        }
    }
}

fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()))
}

/// Install the global subscriber
///
/// # Panics
///
/// Panics if a subscriber is already installed; use [`try_init`] otherwise.
pub fn init(level: LogLevel) {
    if let Err(e) = try_init(level) {
        panic!("failed to initialize logging: {}", e);
    }
}

pub fn try_init(level: LogLevel) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_target(false)
        .try_init()
        .map_err(|e| RelayError::Configuration(format!("logging: {}", e)))
}

/// Subscriber writing through the test harness
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_flags() {
        assert_eq!(LogLevel::from_verbose(false), LogLevel::Info);
        assert_eq!(LogLevel::from_verbose(true), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Info);
        assert_eq!(LogLevel::from_verbosity(1), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(7), LogLevel::Trace);
    }

    #[test]
    fn test_directive() {
        assert_eq!(LogLevel::Warn.directive(), "warn");
        assert_eq!(
            LogLevel::Debug.directive(),
            "warn,dropclaim=debug,dropclaim_core=debug,dropclaim_cli=debug"
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_init_twice_is_error() {
        init_test();
        assert!(try_init(LogLevel::Info).is_err());
    }
}
