//! The service's network surface.
//!
//! A [`Surface`] owns two route trees:
//!
//! ```text
//!              ┌──────────────────────────────┐
//!  0.0.0.0:8000│ public  router │ healthcheck │  ← load balancer, clients
//!              ├──────────────────────────────┤
//! 127.0.0.1:8001 private router │ healthcheck │  ← sidecars, operators
//!              └──────────────────────────────┘
//! ```
//!
//! Routes are registered during setup; [`bind`](Surface::bind) freezes them
//! and opens the listeners, and [`Listening::serve`] runs until shutdown.
//! CORS and compression apply to the public listener only.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use http::Method;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::chunked::ChunkedArrayEmitter;
use crate::config::Settings;
use crate::error::Error;
use crate::health::HealthCheck;
use crate::route::{Route, normalize_path};
use crate::router::{RouteRegistrar, Router, Visibility};
use crate::server::{self, Stack};

pub struct Surface {
    public: Router,
    private: Router,
    settings: Settings,
    disabled: bool,
}

impl Surface {
    /// Both trees start out holding only the health route.
    pub fn new(settings: &Settings, health: HealthCheck) -> Result<Self, Error> {
        let emitter = ChunkedArrayEmitter::new(settings.max_rows_per_chunk);
        let mut surface = Self {
            public: Router::with_emitter(emitter),
            private: Router::with_emitter(emitter),
            settings: settings.clone(),
            disabled: false,
        };

        let path = normalize_path(&settings.healthcheck_path);
        surface.public.insert(Method::GET, &path, health.endpoint())?;
        surface.private.insert(Method::GET, &path, health.endpoint())?;
        crate::startup!(path = %path, "health check route registered");
        Ok(surface)
    }

    /// No listeners are opened. Used by services composed inside another
    /// service that already owns the network.
    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Registers `route` on the tree its visibility selects.
    pub fn add(&mut self, route: Route) -> Result<(), Error> {
        if route.get_visibility() == Visibility::Private && !self.settings.private_http_enabled {
            tracing::debug!(path = route.path(), "private listener disabled; route will not be served");
        }
        self.tree(route.get_visibility()).register(route)
    }

    fn tree(&mut self, visibility: Visibility) -> &mut Router {
        match visibility {
            Visibility::Public => &mut self.public,
            Visibility::Private => &mut self.private,
        }
    }

    pub fn public(&self) -> &Router { &self.public }
    pub fn private(&self) -> &Router { &self.private }
    pub fn settings(&self) -> &Settings { &self.settings }

    /// Opens the listeners. Port `0` picks an ephemeral port; read it back
    /// from [`Listening::public_addr`].
    pub async fn bind(self) -> Result<Listening, Error> {
        let public_stack = Stack::from_settings(&self.settings);
        if self.disabled {
            crate::startup!("HTTP disabled; no listeners opened");
            return Ok(Listening { public: None, private: None, public_stack });
        }

        let addr = resolve(self.settings.http_interface.as_deref(), self.settings.http_port).await?;
        let public = bind(addr, self.public, Visibility::Public).await?;

        let private = if self.settings.private_http_enabled {
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.settings.private_http_port));
            Some(bind(addr, self.private, Visibility::Private).await?)
        } else {
            None
        };

        Ok(Listening { public: Some(public), private, public_stack })
    }
}

impl RouteRegistrar for Surface {
    fn register(&mut self, route: Route) -> Result<(), Error> {
        self.add(route)
    }
}

async fn resolve(interface: Option<&str>, port: u16) -> Result<SocketAddr, Error> {
    let Some(host) = interface else {
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    };
    let invalid = || Error::InvalidConfig { key: "HTTP_INTERFACE".to_owned(), value: host.to_owned() };
    let mut addrs = tokio::net::lookup_host((host, port)).await.map_err(|_| invalid())?;
    addrs.next().ok_or_else(invalid)
}

async fn bind(addr: SocketAddr, router: Router, side: Visibility) -> Result<Bound, Error> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr: addr.to_string(), source })?;
    let local = listener.local_addr()?;
    crate::startup!(%side, addr = %local, "listening");
    Ok(Bound { listener, router: Arc::new(router), addr: local })
}

struct Bound {
    listener: TcpListener,
    router: Arc<Router>,
    addr: SocketAddr,
}

/// Open listeners, ready to serve.
pub struct Listening {
    public: Option<Bound>,
    private: Option<Bound>,
    public_stack: Stack,
}

impl Listening {
    pub fn public_addr(&self) -> Option<SocketAddr> {
        self.public.as_ref().map(|b| b.addr)
    }

    pub fn private_addr(&self) -> Option<SocketAddr> {
        self.private.as_ref().map(|b| b.addr)
    }

    /// Serves until `shutdown` is cancelled, then closes the public listener,
    /// then the private one, and waits for open connections to finish.
    pub async fn serve(self, shutdown: CancellationToken) {
        let Self { public, private, public_stack } = self;

        if public.is_none() && private.is_none() {
            shutdown.cancelled().await;
            return;
        }

        // One token per side so the two close in a fixed order.
        let public_side = CancellationToken::new();
        let private_side = CancellationToken::new();
        let _guards = (public_side.clone().drop_guard(), private_side.clone().drop_guard());

        let public = public.map(|b| {
            let token = public_side.clone();
            tokio::spawn(server::accept_loop(b.listener, b.router, public_stack, token, Visibility::Public))
        });
        let private = private.map(|b| {
            let token = private_side.clone();
            tokio::spawn(server::accept_loop(b.listener, b.router, Stack::default(), token, Visibility::Private))
        });

        shutdown.cancelled().await;

        let mut open = Vec::with_capacity(2);
        for (side, token, accepting) in [
            (Visibility::Public, public_side, public),
            (Visibility::Private, private_side, private),
        ] {
            token.cancel();
            let Some(accepting) = accepting else { continue };
            match accepting.await {
                Ok(tasks) => open.push(tasks),
                Err(e) => tracing::error!(%side, "accept loop failed: {e}"),
            }
        }

        for tasks in open {
            server::drain(tasks).await;
        }
        crate::startup!("listeners closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;

    fn get(path: &str) -> http::Request<Full<Bytes>> {
        http::Request::get(path).body(Full::new(Bytes::new())).unwrap()
    }

    #[tokio::test]
    async fn health_on_both_trees() {
        let settings = Settings { healthcheck_path: "status/".into(), ..Settings::default() };
        let surface = Surface::new(&settings, HealthCheck::always_healthy()).unwrap();
        assert_eq!(surface.public().dispatch(get("/status")).await.status_code(), StatusCode::OK);
        assert_eq!(surface.private().dispatch(get("/status")).await.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn disabled_surface_opens_nothing() {
        let mut surface = Surface::new(&Settings::default(), HealthCheck::default()).unwrap();
        surface.disable();
        let listening = surface.bind().await.unwrap();
        assert_eq!(listening.public_addr(), None);
        assert_eq!(listening.private_addr(), None);

        let token = CancellationToken::new();
        token.cancel();
        listening.serve(token).await;
    }

    /// Records the `side` of every "closing listener" event.
    #[derive(Clone, Default)]
    struct Closed(Arc<std::sync::Mutex<Vec<String>>>);

    #[derive(Default)]
    struct Fields {
        message: String,
        side: String,
    }

    impl tracing::field::Visit for Fields {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            match field.name() {
                "message" => self.message = format!("{value:?}"),
                "side" => self.side = format!("{value:?}"),
                _ => {}
            }
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Closed {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            let mut fields = Fields::default();
            event.record(&mut fields);
            if fields.message == "closing listener" {
                self.0.lock().unwrap().push(fields.side);
            }
        }
    }

    #[tokio::test]
    async fn public_listener_closes_before_private() {
        use tracing_subscriber::layer::SubscriberExt as _;

        let closed = Closed::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(closed.clone()));

        let settings = Settings {
            http_interface: Some("127.0.0.1".into()),
            http_port: 0,
            private_http_port: 0,
            ..Settings::default()
        };
        for _ in 0..3 {
            let listening = Surface::new(&settings, HealthCheck::always_healthy()).unwrap().bind().await.unwrap();
            let token = CancellationToken::new();
            let serving = tokio::spawn(listening.serve(token.clone()));
            tokio::task::yield_now().await;
            token.cancel();
            serving.await.unwrap();
        }

        let closed = closed.0.lock().unwrap();
        assert_eq!(closed.len(), 6);
        for pair in closed.chunks(2) {
            assert_eq!(pair, ["public", "private"]);
        }
    }

    #[tokio::test]
    async fn unresolvable_interface_is_a_config_error() {
        let err = resolve(Some("no such host.invalid"), 0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { ref key, .. } if key == "HTTP_INTERFACE"));
    }
}
