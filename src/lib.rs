//! # berth
//!
//! A small framework for network services that sit behind a reverse proxy.
//!
//! ## The contract
//!
//! The proxy owns TLS, rate limiting, slow clients and body-size limits.
//! berth owns what changes between services: how a route validates its
//! input, who may call it, what representation it answers with, and which
//! listener it lives on.
//!
//! - Declarative routes: [`Route::create`], [`Route::read`],
//!   [`Route::simple_read`], [`Route::update`], [`Route::delete`],
//!   [`Route::fixed`], plus single-file uploads with [`Route::upload`]
//! - Body validation against a [`schema::Schema`]
//! - Header-based authorization with [`authz::Requirement`]
//! - `Accept` negotiation between JSON and XLSX
//! - Chunked streaming of long JSON arrays
//! - A public and a loopback-only private listener, both with a health route
//! - Graceful shutdown on SIGTERM / Ctrl-C
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use berth::{BoxError, Context, Error, HttpError, Route, Service, Shell, Surface};
//! use berth::schema::{Field, Schema};
//! use serde_json::{json, Value};
//!
//! struct Users;
//!
//! impl Service for Users {
//!     async fn start(&self) -> Result<bool, BoxError> { Ok(true) }
//!
//!     fn routes(&self, surface: &mut Surface) -> Result<(), Error> {
//!         surface.add(Route::read("/users", get_user))?;
//!         surface.add(
//!             Route::create("/users", add_user)
//!                 .schema(Schema::new().field("name", Field::string().required())),
//!         )
//!     }
//! }
//!
//! async fn get_user(ctx: Context) -> Result<Value, HttpError> {
//!     match ctx.id() {
//!         Some("1") => Ok(json!({"id": 1, "name": "kim"})),
//!         _ => Err(HttpError::not_found("no such user")),
//!     }
//! }
//!
//! async fn add_user(_ctx: Context) -> Result<String, HttpError> {
//!     Ok("2".to_owned()) // 201, Location: …/users/2
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     Shell::new("users", Users).run().await
//! }
//! ```

mod error;
mod extension;
mod handler;
mod health;
mod reply;
mod request;
mod response;
mod route;
mod router;
mod server;
mod shell;
mod surface;
mod upload;

pub mod authz;
pub mod chunked;
pub mod config;
pub mod logging;
pub mod negotiate;
pub mod schema;

pub use config::{Config, Settings};
pub use error::{BoxError, Error, HttpError};
pub use extension::Extension;
pub use handler::Handler;
pub use health::HealthCheck;
pub use logging::LogLevel;
pub use negotiate::MediaType;
pub use reply::{Attachment, Content, Redirect, Reply};
pub use request::{BasicAuth, Context, Request};
pub use response::{ContentType, Response, ResponseBuilder, ResponseBody};
pub use route::{ID_PARAM, Route, Verb};
pub use router::{RouteRegistrar, Router, Visibility};
pub use server::shutdown_signal;
pub use shell::{Service, Shell};
pub use surface::{Listening, Surface};
pub use upload::{DEFAULT_MAX_FILE_SIZE, Upload};
