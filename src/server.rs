//! Accept loops and graceful shutdown.
//!
//! # Shutdown
//!
//! On SIGTERM (or Ctrl-C, or a cancelled [`CancellationToken`]) each listener:
//! 1. Stops `listener.accept()` and closes its socket; no new connections.
//! 2. Asks every open connection to finish its in-flight request and close.
//! 3. Waits for the connection tasks to drain.
//!
//! Timeouts, body-size limits and TLS belong to the fronting proxy.

use std::convert::Infallible;
use std::sync::Arc;

use http::HeaderValue;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, error};

use crate::config::Settings;
use crate::router::{Router, Visibility};

// ── Middleware ────────────────────────────────────────────────────────────────

/// Cross-cutting layers applied to every request on a listener.
#[derive(Clone, Debug, Default)]
pub(crate) struct Stack {
    cors: Option<CorsLayer>,
    compression: bool,
}

impl Stack {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            cors: settings.cors.then(|| cors_layer(&settings.cors_origin)),
            compression: settings.compression,
        }
    }
}

/// `*` allows any origin; otherwise a comma-separated origin list.
fn cors_layer(origin: &str) -> CorsLayer {
    if origin.trim() == "*" {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origin
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Accepts connections on `listener` until `shutdown` fires, then closes the
/// listener and returns the still-running connection tasks for draining.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    router: Arc<Router>,
    stack: Stack,
    shutdown: CancellationToken,
    side: Visibility,
) -> JoinSet<()> {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            // Check shutdown first so a SIGTERM stops accepting immediately,
            // even with connections queued.
            biased;

            () = shutdown.cancelled() => {
                crate::startup!(%side, in_flight = tasks.len(), "closing listener");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!(%side, "accept error: {e}");
                        continue;
                    }
                };

                let router = Arc::clone(&router);
                let stack = stack.clone();
                let shutdown = shutdown.clone();
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    let svc = ServiceBuilder::new()
                        .layer(CompressionLayer::new().gzip(stack.compression))
                        .option_layer(stack.cors)
                        .service_fn(move |req: http::Request<Incoming>| {
                            let router = Arc::clone(&router);
                            async move { Ok::<_, Infallible>(router.dispatch(req).await.into_inner()) }
                        });

                    let builder = ConnBuilder::new(TokioExecutor::new());
                    let conn = builder.serve_connection(io, TowerToHyperService::new(svc));
                    tokio::pin!(conn);

                    let res = tokio::select! {
                        res = conn.as_mut() => res,
                        () = shutdown.cancelled() => {
                            conn.as_mut().graceful_shutdown();
                            conn.await
                        }
                    };
                    if let Err(e) = res {
                        debug!(%peer, "connection error: {e}");
                    }
                });
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);
    tasks
}

/// Waits for every task in `tasks` to finish.
pub(crate) async fn drain(mut tasks: JoinSet<()>) {
    while tasks.join_next().await.is_some() {}
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT the process receives. On Windows
/// only Ctrl-C is available. A handler that cannot be installed is logged and
/// never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
