//! Service bootstrap and lifecycle.
//!
//! A [`Shell`] wraps one [`Service`] and drives it through its life:
//!
//! ```text
//! read config ─► init logging ─► start ─► register routes ─► bind ─► serve
//!                                  │                                   │
//!                               failure                         SIGTERM/SIGINT
//!                                  ▼                                   ▼
//!                                stop                close public, close private
//!                                                                      ▼
//!                                                                    stop
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{Config, Settings};
use crate::error::{BoxError, Error};
use crate::health::HealthCheck;
use crate::logging::{self, LogLevel};
use crate::server::shutdown_signal;
use crate::surface::Surface;

/// The application a [`Shell`] hosts.
///
/// ```rust
/// use berth::{BoxError, Context, Error, HttpError, Route, Service, Surface};
///
/// struct Users;
///
/// async fn get_user(ctx: Context) -> Result<String, HttpError> {
///     Ok(ctx.id().unwrap_or_default().to_owned())
/// }
///
/// impl Service for Users {
///     async fn start(&self) -> Result<bool, BoxError> {
///         Ok(true)
///     }
///
///     fn routes(&self, surface: &mut Surface) -> Result<(), Error> {
///         surface.add(Route::simple_read("/users", get_user))
///     }
/// }
/// ```
pub trait Service: Send + Sync + 'static {
    /// Acquire resources. `Ok(false)` or an error aborts startup.
    fn start(&self) -> impl Future<Output = Result<bool, BoxError>> + Send;

    /// Release resources. Runs after the listeners close, and after a
    /// failed start.
    fn stop(&self) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Backs the health route on both listeners.
    fn health_check(&self) -> impl Future<Output = Result<bool, BoxError>> + Send {
        async { Ok(true) }
    }

    /// Registers the service's routes.
    fn routes(&self, surface: &mut Surface) -> Result<(), Error> {
        let _ = surface;
        Ok(())
    }
}

pub struct Shell<S> {
    name: String,
    service: Arc<S>,
    config: Config,
    testing: bool,
    http: bool,
    shutdown: CancellationToken,
}

impl<S: Service> Shell<S> {
    /// Configuration is read from `{NAME}_*` environment variables.
    pub fn new(name: &str, service: S) -> Self {
        Self {
            name: name.to_owned(),
            service: Arc::new(service),
            config: Config::from_env(name),
            testing: false,
            http: true,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// In testing mode a failed start returns an error instead of exiting
    /// the process, and no signal handlers are installed.
    pub fn testing(mut self, testing: bool) -> Self {
        self.testing = testing;
        self
    }

    /// Skip the listeners entirely.
    pub fn without_http(mut self) -> Self {
        self.http = false;
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn config(&self) -> &Config { &self.config }
    pub fn service(&self) -> &Arc<S> { &self.service }

    /// Cancelling this token shuts the shell down as a signal would.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the service until shutdown.
    pub async fn run(self) -> Result<(), Error> {
        let settings = Settings::from_config(&self.config)?;
        logging::init(
            settings.log_level,
            settings.log_timestamp,
            settings.log_timestamp_format.as_deref(),
        );
        if let Some(raw) = self.config.lookup("LOG_LEVEL") {
            if raw.parse::<LogLevel>().is_err() {
                tracing::warn!(value = raw, "unknown LOG_LEVEL, using {}", LogLevel::default());
            }
        }

        crate::startup!(service = %self.name, version = env!("CARGO_PKG_VERSION"), "starting");
        settings.check_tls()?;

        match self.service.start().await {
            Ok(true) => {}
            Ok(false) => return self.abort("start hook returned false".to_owned()).await,
            Err(e) => return self.abort(e.to_string()).await,
        }
        crate::startup!(service = %self.name, "started");

        let listening = match self.surface(&settings) {
            Ok(surface) => surface.bind().await,
            Err(e) => Err(e),
        };
        let listening = match listening {
            Ok(l) => l,
            Err(e) => {
                self.service.stop().await;
                return Err(e);
            }
        };

        if !self.testing {
            let token = self.shutdown.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                crate::startup!("shutdown signal received");
                token.cancel();
            });
        }

        listening.serve(self.shutdown.clone()).await;

        crate::startup!(service = %self.name, "stopping");
        self.service.stop().await;
        crate::startup!(service = %self.name, "stopped");
        Ok(())
    }

    fn surface(&self, settings: &Settings) -> Result<Surface, Error> {
        let service = Arc::clone(&self.service);
        let health = HealthCheck::new(move || {
            let service = Arc::clone(&service);
            async move { service.health_check().await }
        });

        let mut surface = Surface::new(settings, health)?;
        if !self.http {
            surface.disable();
        }
        self.service.routes(&mut surface)?;
        Ok(surface)
    }

    async fn abort(&self, reason: String) -> Result<(), Error> {
        crate::force!(service = %self.name, reason = %reason, "startup failed, stopping");
        self.service.stop().await;
        if !self.testing {
            std::process::exit(1);
        }
        Err(Error::StartupFailure(reason))
    }
}
