//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! A route owns exactly one handler, but routes of every kind live side by
//! side in the routers, so the concrete handler type has to disappear behind
//! a trait object:
//!
//! ```text
//! async fn get_user(ctx: Context) -> Result<Value, HttpError> { … }  ← user writes this
//!        ↓ Route::read("/users", get_user)
//! get_user.into_boxed_handler()                ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(get_user))                ← stored as BoxedHandler
//!        ↓
//! handler.call(ctx)  at request time           ← one vtable dispatch
//!        ↓
//! Box::pin(async { get_user(ctx).await.map(Into::into) })   ← HandlerFuture
//! ```
//!
//! The `Ok` value is normalised to a [`Reply`] right here, so the route
//! pipeline only ever matches on one type.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::HttpError;
use crate::reply::Reply;
use crate::request::{Context, Request};
use crate::response::Response;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased handler outcome.
pub(crate) type HandlerFuture = Pin<Box<dyn Future<Output = Result<Reply, HttpError>> + Send + 'static>>;

/// A type-erased future producing a finished [`Response`].
pub(crate) type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// What the routers store per path: a fully assembled request pipeline.
pub(crate) type Endpoint = Arc<dyn Fn(Request) -> ResponseFuture + Send + Sync + 'static>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> HandlerFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// Satisfied automatically by any function or closure of the shape
///
/// ```text
/// async fn name(ctx: Context) -> Result<impl Into<Reply>, HttpError>
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HttpError>> + Send + 'static,
    R: Into<Reply> + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HttpError>> + Send + 'static,
    R: Into<Reply> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` into the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, HttpError>> + Send + 'static,
    R: Into<Reply> + Send + 'static,
{
    fn call(&self, ctx: Context) -> HandlerFuture {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.map(Into::into) })
    }
}
