//! Environment and command-line configuration.
//!
//! Every key is namespaced by the service prefix: asking a `Config` built for
//! `orders` for `http_port` reads `ORDERS_HTTP_PORT`. Values are snapshotted
//! once at construction, so a running service never observes the environment
//! changing underneath it.
//!
//! | Key | Default | Meaning |
//! |---|---|---|
//! | `LOG_LEVEL` | `INFO` | `SILENT`, `QUIET`, `INFO`, `STARTUP`, `DEBUG`, `TRACE` |
//! | `LOG_TIMESTAMP` | `N` | prefix log lines with a timestamp |
//! | `LOG_TIMESTAMP_FORMAT` | RFC 3339 | strftime format for the timestamp |
//! | `HTTP_INTERFACE` | all interfaces | host or address for the public listener |
//! | `HTTP_PORT` | `8000` | public listener port |
//! | `PRIVATE_HTTP_ENABLED` | `Y` | open the loopback-only private listener |
//! | `PRIVATE_HTTP_PORT` | `8001` | private listener port |
//! | `HTTP_KEY_FILE` / `HTTP_CERT_FILE` | unset | TLS material (see [`Settings::check_tls`]) |
//! | `ALLOW_SELF_SIGNED_CERTS` | `N` | accepted for compatibility |
//! | `HTTP_CORS` / `HTTP_CORS_ORIGIN` | `N` / `*` | CORS on the public listener |
//! | `HTTP_COMPRESSION` | `N` | gzip responses on the public listener |
//! | `HEALTHCHECK_PATH` | `/healthcheck` | health route on both listeners |
//! | `HTTP_MAX_ROWS_PER_CHUNK` | `1000` | batch threshold for chunked arrays |

use std::collections::HashMap;
use std::str::FromStr;

use clap::{Arg, Command};

use crate::chunked::DEFAULT_MAX_ROWS_PER_CHUNK;
use crate::error::Error;
use crate::logging::LogLevel;

/// Prefixed key/value configuration provider.
#[derive(Clone, Debug)]
pub struct Config {
    prefix: String,
    vars: HashMap<String, String>,
    args: Vec<String>,
}

impl Config {
    /// Snapshots the process environment and argv.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_parts(prefix, std::env::vars(), std::env::args())
    }

    /// Builds a provider from explicit variables and arguments. `args[0]` is
    /// the binary name, as in `std::env::args()`.
    pub fn from_parts<V, K, S, A, T>(prefix: &str, vars: V, args: A) -> Self
    where
        V: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: Into<String>,
        A: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            prefix: prefix.to_owned(),
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The environment variable name for `name`: `{PREFIX}_{NAME}`, upper-cased.
    pub fn key(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name).to_uppercase().replace('-', "_")
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.vars.get(&self.key(name)).map(String::as_str)
    }

    pub fn get(&self, name: &str, default: &str) -> String {
        self.lookup(name).unwrap_or(default).to_owned()
    }

    pub fn get_required(&self, name: &str) -> Result<String, Error> {
        self.lookup(name)
            .map(str::to_owned)
            .ok_or_else(|| Error::ConfigMissing { key: self.key(name) })
    }

    /// `Y`, `YES`, `TRUE`, `ON` and `1` are true; any other set value is false.
    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.lookup(name) {
            Some(v) => matches!(
                v.trim().to_ascii_uppercase().as_str(),
                "Y" | "YES" | "TRUE" | "ON" | "1"
            ),
            None => default,
        }
    }

    pub fn get_parsed<T: FromStr>(&self, name: &str, default: T) -> Result<T, Error> {
        match self.lookup(name) {
            Some(raw) => raw.trim().parse().map_err(|_| Error::InvalidConfig {
                key: self.key(name),
                value: raw.to_owned(),
            }),
            None => Ok(default),
        }
    }

    /// Reads `--name value` or `--name=value` from the command line.
    pub fn get_cli_param(&self, name: &str, default: &str) -> String {
        let flag = format!("--{name}");
        let prefixed = format!("{flag}=");

        // clap stops at the first unknown argument, so only the tokens that
        // belong to this flag are handed over.
        let mut relevant = vec![self.args.first().cloned().unwrap_or_default()];
        let mut tokens = self.args.iter().skip(1);
        while let Some(token) = tokens.next() {
            if *token == flag {
                relevant.push(token.clone());
                relevant.extend(tokens.next().cloned());
            } else if token.starts_with(&prefixed) {
                relevant.push(token.clone());
            }
        }

        Command::new("berth")
            .disable_help_flag(true)
            .disable_version_flag(true)
            .ignore_errors(true)
            .arg(
                Arg::new("value")
                    .long(name.to_owned())
                    .num_args(1)
                    .allow_hyphen_values(true),
            )
            .try_get_matches_from(relevant)
            .ok()
            .and_then(|m| m.get_one::<String>("value").cloned())
            .unwrap_or_else(|| default.to_owned())
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

/// Typed view over the keys berth itself consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub log_level: LogLevel,
    pub log_timestamp: bool,
    pub log_timestamp_format: Option<String>,
    pub http_interface: Option<String>,
    pub http_port: u16,
    pub private_http_enabled: bool,
    pub private_http_port: u16,
    pub http_key_file: Option<String>,
    pub http_cert_file: Option<String>,
    pub allow_self_signed_certs: bool,
    pub cors: bool,
    pub cors_origin: String,
    pub compression: bool,
    pub healthcheck_path: String,
    pub max_rows_per_chunk: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_timestamp: false,
            log_timestamp_format: None,
            http_interface: None,
            http_port: 8000,
            private_http_enabled: true,
            private_http_port: 8001,
            http_key_file: None,
            http_cert_file: None,
            allow_self_signed_certs: false,
            cors: false,
            cors_origin: "*".to_owned(),
            compression: false,
            healthcheck_path: "/healthcheck".to_owned(),
            max_rows_per_chunk: DEFAULT_MAX_ROWS_PER_CHUNK,
        }
    }
}

impl Settings {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let defaults = Self::default();
        let non_empty = |name: &str| {
            config
                .lookup(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };

        // Unknown level names fall back to INFO; the warning is emitted once
        // logging is up (see `Shell`).
        let log_level = config
            .lookup("LOG_LEVEL")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.log_level);

        Ok(Self {
            log_level,
            log_timestamp: config.get_bool("LOG_TIMESTAMP", defaults.log_timestamp),
            log_timestamp_format: non_empty("LOG_TIMESTAMP_FORMAT"),
            http_interface: non_empty("HTTP_INTERFACE"),
            http_port: config.get_parsed("HTTP_PORT", defaults.http_port)?,
            private_http_enabled: config
                .get_bool("PRIVATE_HTTP_ENABLED", defaults.private_http_enabled),
            private_http_port: config.get_parsed("PRIVATE_HTTP_PORT", defaults.private_http_port)?,
            http_key_file: non_empty("HTTP_KEY_FILE"),
            http_cert_file: non_empty("HTTP_CERT_FILE"),
            allow_self_signed_certs: config
                .get_bool("ALLOW_SELF_SIGNED_CERTS", defaults.allow_self_signed_certs),
            cors: config.get_bool("HTTP_CORS", defaults.cors),
            cors_origin: non_empty("HTTP_CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            compression: config.get_bool("HTTP_COMPRESSION", defaults.compression),
            healthcheck_path: non_empty("HEALTHCHECK_PATH").unwrap_or(defaults.healthcheck_path),
            max_rows_per_chunk: config
                .get_parsed("HTTP_MAX_ROWS_PER_CHUNK", defaults.max_rows_per_chunk)?
                .max(1),
        })
    }

    /// Fails when TLS material is configured. Certificates are the
    /// reverse proxy's concern; serving plaintext while the operator believes
    /// TLS is on would be worse than refusing to start.
    pub fn check_tls(&self) -> Result<(), Error> {
        match (&self.http_key_file, &self.http_cert_file) {
            (None, None) => Ok(()),
            (key, cert) => Err(Error::TlsUnsupported {
                key_file: key.clone().unwrap_or_default(),
                cert_file: cert.clone().unwrap_or_default(),
            }),
        }
    }
}
