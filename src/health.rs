//! The health-check route.
//!
//! Every surface answers `GET {healthcheck_path}` on both listeners, so a
//! load balancer can probe the public side and an orchestrator the private
//! side. The answer is decided by a [`HealthCheck`] probe:
//!
//! | Probe result | Response |
//! |---|---|
//! | `Ok(true)` | `200 OK`, empty body |
//! | `Ok(false)` | `503 Service Unavailable` |
//! | `Err(_)` | `503 Service Unavailable`, error logged |

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;

use crate::error::BoxError;
use crate::handler::Endpoint;
use crate::response::Response;

type ProbeFuture = Pin<Box<dyn Future<Output = Result<bool, BoxError>> + Send + 'static>>;

/// A shareable health probe.
#[derive(Clone)]
pub struct HealthCheck(Arc<dyn Fn() -> ProbeFuture + Send + Sync + 'static>);

impl HealthCheck {
    pub fn new<F, Fut>(probe: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, BoxError>> + Send + 'static,
    {
        Self(Arc::new(move || Box::pin(probe())))
    }

    pub fn always_healthy() -> Self {
        Self::new(|| async { Ok::<_, BoxError>(true) })
    }

    pub async fn probe(&self) -> StatusCode {
        match (self.0)().await {
            Ok(true) => StatusCode::OK,
            Ok(false) => {
                tracing::debug!("health check reported unhealthy");
                StatusCode::SERVICE_UNAVAILABLE
            }
            Err(e) => {
                tracing::error!(error = %e, "health check failed");
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    pub(crate) fn endpoint(&self) -> Endpoint {
        let check = self.clone();
        Arc::new(move |_req| {
            let check = check.clone();
            Box::pin(async move { Response::status(check.probe().await) })
        })
    }
}

impl Default for HealthCheck {
    fn default() -> Self { Self::always_healthy() }
}

impl std::fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HealthCheck")
    }
}
