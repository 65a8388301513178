//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Each leaf holds a fully
//! assembled route pipeline, so dispatch is a tree walk plus one call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::BodyExt as _;
use hyper::body::Body;
use matchit::Router as MatchitRouter;

use crate::chunked::ChunkedArrayEmitter;
use crate::error::Error;
use crate::handler::Endpoint;
use crate::request::Request;
use crate::response::Response;
use crate::route::Route;

/// Which listener a route is served on.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Visibility {
    /// Served on the public interface.
    #[default]
    Public,
    /// Served only on the loopback management listener.
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Public => "public",
            Self::Private => "private",
        })
    }
}

/// Something routes can be registered on: a single [`Router`], or a
/// [`Surface`](crate::Surface) that picks a router by visibility.
pub trait RouteRegistrar {
    fn register(&mut self, route: Route) -> Result<(), Error>;
}

/// A route table.
///
/// Build it once at startup. Long array replies from every route registered
/// here are chunked by the router's [`ChunkedArrayEmitter`].
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Endpoint>>,
    emitter: ChunkedArrayEmitter,
}

impl Router {
    pub fn new() -> Self {
        Self::with_emitter(ChunkedArrayEmitter::default())
    }

    pub fn with_emitter(emitter: ChunkedArrayEmitter) -> Self {
        Self { routes: HashMap::new(), emitter }
    }

    pub fn emitter(&self) -> ChunkedArrayEmitter {
        self.emitter
    }

    /// Registers a route. Returns `self` for chaining.
    ///
    /// ```rust
    /// # use berth::{Context, HttpError, Route, Router};
    /// # async fn get_user(_: Context) -> Result<(), HttpError> { Ok(()) }
    /// # async fn add_user(_: Context) -> Result<(), HttpError> { Ok(()) }
    /// let router = Router::new()
    ///     .route(Route::read("/users", get_user))?
    ///     .route(Route::create("/users", add_user))?;
    /// # Ok::<(), berth::Error>(())
    /// ```
    pub fn route(mut self, route: Route) -> Result<Self, Error> {
        self.add(route)?;
        Ok(self)
    }

    /// Registers a route in place. A path clash is an error, not a panic.
    pub fn add(&mut self, route: Route) -> Result<(), Error> {
        let method = route.verb().method();
        let pattern = route.pattern();
        let verb = route.verb();
        let endpoint = route.into_endpoint(self.emitter);
        self.insert(method.clone(), &pattern, endpoint)?;
        crate::startup!(method = %method, path = %pattern, %verb, "route registered");
        Ok(())
    }

    pub(crate) fn insert(&mut self, method: Method, path: &str, endpoint: Endpoint) -> Result<(), Error> {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, endpoint)
            .map_err(|e| Error::InvalidRoute { path: path.to_owned(), reason: e.to_string() })
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<(Endpoint, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let endpoint = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((endpoint, params))
    }

    /// Routes one request and produces one response. Unknown paths are `404`;
    /// a body that fails to arrive is `400`.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> Response
    where
        B: Body<Data = Bytes>,
        B::Error: fmt::Display,
    {
        let (parts, body) = req.into_parts();
        let Some((endpoint, params)) = self.lookup(&parts.method, parts.uri.path()) else {
            tracing::debug!(method = %parts.method, path = parts.uri.path(), "no route");
            return Response::status(StatusCode::NOT_FOUND);
        };

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::debug!(error = %e, "failed to read request body");
                return Response::status(StatusCode::BAD_REQUEST);
            }
        };

        endpoint(Request::new(parts.method, parts.uri, parts.headers, body, params)).await
    }
}

impl RouteRegistrar for Router {
    fn register(&mut self, route: Route) -> Result<(), Error> {
        self.add(route)
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, HttpError};
    use http_body_util::Full;

    async fn echo_id(ctx: Context) -> Result<String, HttpError> {
        Ok(ctx.id().unwrap_or_default().to_owned())
    }

    fn get(path: &str) -> http::Request<Full<Bytes>> {
        http::Request::get(path).body(Full::new(Bytes::new())).unwrap()
    }

    #[test]
    fn duplicate_routes_are_rejected() {
        let mut router = Router::new();
        router.add(Route::read("/users", echo_id)).unwrap();
        let err = router.add(Route::read("/users/", echo_id)).unwrap_err();
        assert!(matches!(err, Error::InvalidRoute { ref path, .. } if path == "/users/{id}"));
    }

    #[test]
    fn same_path_different_methods() {
        let router = Router::new()
            .route(Route::read("/users", echo_id)).unwrap()
            .route(Route::update("/users", echo_id)).unwrap()
            .route(Route::delete("/users", echo_id)).unwrap();
        assert!(router.lookup(&Method::GET, "/users/1").is_some());
        assert!(router.lookup(&Method::PUT, "/users/1").is_some());
        assert!(router.lookup(&Method::DELETE, "/users/1").is_some());
        assert!(router.lookup(&Method::POST, "/users/1").is_none());
    }

    #[test]
    fn params_are_extracted() {
        let router = Router::new().route(Route::read("/orgs/{org}/users", echo_id)).unwrap();
        let (_, params) = router.lookup(&Method::GET, "/orgs/acme/users/7").unwrap();
        assert_eq!(params["org"], "acme");
        assert_eq!(params["id"], "7");
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let router = Router::new();
        assert_eq!(router.dispatch(get("/nothing")).await.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dispatch_reaches_handler() {
        let router = Router::new().route(Route::simple_read("/users", echo_id)).unwrap();
        let res = router.dispatch(get("/users/42")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let body = res.into_inner().into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"\"42\"");
    }
}
