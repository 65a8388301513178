//! A small user service: validated create, negotiated read, a private admin
//! route and a health check.
//!
//! Run with:
//!   USERS_LOG_LEVEL=startup cargo run --example basic
//!
//! Try:
//!   curl -i -X POST http://localhost:8000/users \
//!        -H 'content-type: application/json' -d '{"name":"alice","role":"admin"}'
//!   curl http://localhost:8000/users/1
//!   curl -H 'accept: application/vnd.openxmlformats-officedocument.spreadsheetml.sheet' \
//!        http://localhost:8000/users/1 -o users.xlsx
//!   curl http://localhost:8000/users
//!   curl -F avatar=@me.png http://localhost:8000/avatars
//!   curl -X DELETE -H 'x-admin-key: let-me-in' http://127.0.0.1:8001/users/1
//!   curl http://127.0.0.1:8001/healthcheck

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use berth::authz::Requirement;
use berth::schema::{Field, Schema};
use berth::{
    Attachment, BoxError, Context, Error, HttpError, MediaType, Reply, Route, Service, Shell,
    Surface,
};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Store(Arc<Mutex<BTreeMap<u64, Value>>>);

impl Store {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<u64, Value>>, HttpError> {
        self.0.lock().map_err(|_| HttpError::internal("store poisoned"))
    }
}

struct Users {
    store: Store,
}

impl Service for Users {
    async fn start(&self) -> Result<bool, BoxError> {
        tracing::info!("user store ready");
        Ok(true)
    }

    async fn stop(&self) {
        tracing::info!("user store closed");
    }

    fn routes(&self, surface: &mut Surface) -> Result<(), Error> {
        let user = Schema::new()
            .field("name", Field::string().required())
            .field("role", Field::string().allowed(["admin", "member"]).default("member"));

        let store = self.store.clone();
        surface.add(
            Route::create("/users", move |ctx: Context| {
                let store = store.clone();
                async move {
                    let mut users = store.lock()?;
                    let id = users.keys().next_back().map_or(1, |last| last + 1);
                    users.insert(id, ctx.into_body());
                    Ok::<_, HttpError>(id.to_string())
                }
            })
            .schema(user),
        )?;

        let store = self.store.clone();
        surface.add(Route::read("/users", move |ctx: Context| {
            let store = store.clone();
            async move {
                let id: u64 = ctx
                    .id()
                    .and_then(|id| id.parse().ok())
                    .ok_or_else(|| HttpError::not_found("no such user"))?;
                let user = store
                    .lock()?
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| HttpError::not_found("no such user"))?;
                let reply = match ctx.accepts() {
                    // A real service would render a workbook here.
                    Some(MediaType::Spreadsheet) => {
                        Reply::from(Attachment::new(format!("user-{id}.xlsx"), Vec::<u8>::new()))
                    }
                    _ => Reply::from(user),
                };
                Ok::<_, HttpError>(reply)
            }
        }))?;

        let store = self.store.clone();
        surface.add(
            Route::simple_read("/users", move |_ctx: Context| {
                let store = store.clone();
                async move { Ok::<_, HttpError>(Value::Array(store.lock()?.values().cloned().collect())) }
            })
            .with_id(false),
        )?;

        let store = self.store.clone();
        surface.add(
            Route::delete("/users", move |ctx: Context| {
                let store = store.clone();
                async move {
                    let id: u64 = ctx.id().and_then(|id| id.parse().ok()).unwrap_or_default();
                    store.lock()?.remove(&id);
                    Ok::<_, HttpError>(())
                }
            })
            .private()
            .authz(Requirement::new().header("x-admin-key", ["let-me-in"])),
        )?;

        surface.add(
            Route::upload("/avatars", "avatar", |ctx: Context| async move {
                let upload = ctx.upload().ok_or_else(|| HttpError::bad_request("no avatar"))?;
                Ok::<_, HttpError>(json!({"stored": upload.path, "bytes": upload.size}))
            })
            .max_file_size(512 * 1024),
        )?;

        surface.add(Route::fixed("/version", &json!({"version": env!("CARGO_PKG_VERSION")})))
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    Shell::new("users", Users { store: Store::default() }).run().await
}
