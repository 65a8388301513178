//! Level-gated logging on top of `tracing`.
//!
//! berth logs through the ordinary `tracing` macros. This module only decides
//! what reaches the terminal. Two targets are special:
//!
//! - [`STARTUP_TARGET`]: route registration, listener binding and lifecycle
//!   messages, emitted with [`startup!`](crate::startup). Shown at
//!   [`LogLevel::Startup`] and above.
//! - [`FORCE_TARGET`]: [`force!`](crate::force) lines. Always shown, even at
//!   [`LogLevel::Silent`].

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const STARTUP_TARGET: &str = "berth::startup";
pub const FORCE_TARGET: &str = "berth::force";

/// Logs a lifecycle message, visible from [`LogLevel::Startup`] upwards.
#[macro_export]
macro_rules! startup {
    ($($arg:tt)+) => {
        ::tracing::info!(target: $crate::logging::STARTUP_TARGET, $($arg)+)
    };
}

/// Logs regardless of the configured level.
#[macro_export]
macro_rules! force {
    ($($arg:tt)+) => {
        ::tracing::error!(target: $crate::logging::FORCE_TARGET, $($arg)+)
    };
}

/// Verbosity, quietest first.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum LogLevel {
    Silent,
    /// Warnings and errors only.
    Quiet,
    #[default]
    Info,
    Startup,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Silent  => "SILENT",
            Self::Quiet   => "QUIET",
            Self::Info    => "INFO",
            Self::Startup => "STARTUP",
            Self::Debug   => "DEBUG",
            Self::Trace   => "TRACE",
        }
    }

    fn base_filter(self) -> LevelFilter {
        match self {
            Self::Silent               => LevelFilter::OFF,
            Self::Quiet                => LevelFilter::WARN,
            Self::Info | Self::Startup => LevelFilter::INFO,
            Self::Debug                => LevelFilter::DEBUG,
            Self::Trace                => LevelFilter::TRACE,
        }
    }

    /// Per-target filter implementing this level.
    pub fn targets(self) -> Targets {
        let startup = if self >= Self::Startup { LevelFilter::TRACE } else { LevelFilter::OFF };
        Targets::new()
            .with_default(self.base_filter())
            .with_target(STARTUP_TARGET, startup)
            .with_target(FORCE_TARGET, LevelFilter::TRACE)
    }
}

/// Case-insensitive. The error carries the rejected name.
impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SILENT"  => Ok(Self::Silent),
            "QUIET"   => Ok(Self::Quiet),
            "INFO"    => Ok(Self::Info),
            "STARTUP" => Ok(Self::Startup),
            "DEBUG"   => Ok(Self::Debug),
            "TRACE"   => Ok(Self::Trace),
            _         => Err(s.to_owned()),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Installs the global subscriber.
///
/// `timestamp_format` is a chrono strftime string; `None` means RFC 3339.
/// Returns `false` if a subscriber was already installed (tests, or a parent
/// service that set one up first), in which case nothing changes.
pub fn init(level: LogLevel, timestamp: bool, timestamp_format: Option<&str>) -> bool {
    let timed = timestamp.then(|| {
        let timer = match timestamp_format {
            Some(format) => ChronoUtc::new(format.to_owned()),
            None => ChronoUtc::rfc_3339(),
        };
        tracing_subscriber::fmt::layer().with_timer(timer)
    });
    let untimed = (!timestamp).then(|| tracing_subscriber::fmt::layer().without_time());

    tracing_subscriber::registry()
        .with(level.targets())
        .with(timed)
        .with(untimed)
        .try_init()
        .is_ok()
}
