//! Named sub-components sharing a shell's configuration and logging.

use std::future::Future;

use tracing::Instrument as _;
use tracing::instrument::Instrumented;

use crate::config::Config;
use crate::error::Error;

/// A named part of a service (a database pool, a queue consumer, …).
///
/// Reads configuration through the owning service's [`Config`] and tags its
/// log lines with `extension = <name>`.
#[derive(Clone, Debug)]
pub struct Extension {
    name: String,
    config: Config,
}

impl Extension {
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        Self { name: name.into(), config }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn config(&self) -> &Config { &self.config }

    pub fn get_cfg(&self, name: &str, default: &str) -> String {
        self.config.get(name, default)
    }

    pub fn get_required_cfg(&self, name: &str) -> Result<String, Error> {
        self.config.get_required(name)
    }

    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("extension", extension = %self.name)
    }

    /// Runs `fut` inside this extension's span.
    pub fn in_span<F: Future>(&self, fut: F) -> Instrumented<F> {
        fut.instrument(self.span())
    }
}
