//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Build the axum Router: health endpoint plus the proxy mounted under its
//!   configured prefix
//! - Wire up middleware (panic recovery, tracing, timeout, tenant
//!   validation, request IDs)
//! - Start the reload coordinator before accepting traffic
//! - On a termination signal, drain connections and stop the coordinator
//!   under a hard deadline

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{middleware, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::proxy::coordinator::{Coordinator, CoordinatorError};
use crate::proxy::rewrite::ProxyError;

/// Ceiling on a single proxied request, distinct from the shutdown deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

/// Application state injected into the proxy handler.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

/// HTTP server owning the coordinator's lifecycle.
pub struct LifecycleServer {
    settings: Arc<Settings>,
    coordinator: Arc<Coordinator>,
    shutdown: Arc<Shutdown>,
}

impl LifecycleServer {
    pub fn new(
        settings: Arc<Settings>,
        coordinator: Arc<Coordinator>,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            settings,
            coordinator,
            shutdown,
        }
    }

    /// Build the router: `/health` outside the tenant guard, everything
    /// under the proxy prefix behind it.
    pub fn router(&self) -> Router {
        let state = AppState {
            coordinator: self.coordinator.clone(),
        };

        let proxy_routes = Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(
                self.settings.clone(),
                crate::http::middleware::tenant_guard,
            ));

        Router::new()
            .route("/health", get(health))
            .nest(&self.settings.proxy.prefix, proxy_routes)
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(middleware::from_fn(crate::http::middleware::request_id))
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::new())
    }

    /// Start the coordinator, serve until a shutdown signal, then drain and
    /// stop within the grace deadline. If the deadline elapses first, exit
    /// anyway.
    pub async fn run(self, listener: TcpListener) -> Result<(), ServerError> {
        let address = listener.local_addr()?;
        tracing::info!(address = %address, "HTTP server starting");

        self.coordinator.start().await?;

        let app = self.router();
        let mut drain_signal = self.shutdown.subscribe();
        let serve_future = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = drain_signal.recv().await;
                tracing::info!("shutdown signal received, draining connections");
            })
            .into_future();
        tokio::pin!(serve_future);

        let mut signal = self.shutdown.subscribe();
        let coordinator = self.coordinator.clone();
        let grace = Duration::from_secs(self.settings.server.shutdown_grace_secs);

        tokio::select! {
            result = &mut serve_future => {
                // Listener failed before any signal; still stop the
                // coordinator so the overlay session is not leaked.
                release_and_finish(&coordinator, grace, result).await?;
            }
            _ = signal.recv() => {
                let teardown = async {
                    if let Err(error) = (&mut serve_future).await {
                        tracing::error!(error = %error, "server error during drain");
                    }
                    if let Err(error) = coordinator.stop().await {
                        tracing::error!(error = %error, "failed to stop coordinator");
                    }
                };
                if tokio::time::timeout(grace, teardown).await.is_err() {
                    tracing::error!(
                        grace_secs = grace.as_secs(),
                        "shutdown deadline elapsed, exiting without full drain"
                    );
                }
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Stop the coordinator under the grace deadline, then surface the serve
/// result. The stop runs first: a failed listener must still release the
/// overlay session.
async fn release_and_finish(
    coordinator: &Arc<Coordinator>,
    grace: Duration,
    served: std::io::Result<()>,
) -> Result<(), ServerError> {
    bounded_stop(coordinator, grace).await;
    Ok(served?)
}

async fn bounded_stop(coordinator: &Arc<Coordinator>, grace: Duration) {
    match tokio::time::timeout(grace, coordinator.stop()).await {
        Ok(Err(error)) => tracing::error!(error = %error, "failed to stop coordinator"),
        Err(_) => tracing::error!("coordinator stop timed out"),
        Ok(Ok(())) => {}
    }
}

async fn health() -> &'static str {
    "OK"
}

/// Forward one request through the coordinator's current triple.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    match state.coordinator.handle(request).await {
        Ok(response) => {
            metrics::record_request(method.as_str(), response.status().as_u16(), start);
            response
        }
        Err(ProxyError::NotReady) => {
            metrics::record_request(method.as_str(), 503, start);
            (StatusCode::SERVICE_UNAVAILABLE, "gateway not ready").into_response()
        }
        Err(error) => {
            tracing::error!(error = %error, "proxy request failed");
            metrics::record_request(method.as_str(), 502, start);
            (StatusCode::BAD_GATEWAY, "upstream request failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::extract::Path;
    use tokio::net::{TcpListener, TcpStream};

    use crate::config::schema::{AgentSettings, ProxySettings, ReloadSettings};
    use crate::config::CredentialStore;
    use crate::overlay::{Dialer, Opener, OverlayError, Session};
    use crate::proxy::rewrite::RewriteRules;

    struct CountingSession {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Dialer for CountingSession {
        async fn dial(&self, _host: &str, _port: u16) -> std::io::Result<TcpStream> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no backend"))
        }
    }

    #[async_trait]
    impl Session for CountingSession {
        async fn close(&self) -> Result<(), OverlayError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingOpener {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Opener for CountingOpener {
        async fn open(
            &self,
            _client_id: &str,
            _client_secret: &str,
        ) -> Result<Arc<dyn Session>, OverlayError> {
            Ok(Arc::new(CountingSession {
                closes: self.closes.clone(),
            }))
        }
    }

    /// Agent stub answering every profile request with a decodable value.
    async fn profile_agent() -> String {
        let app = Router::new().route(
            "/applications/{app}/environments/{env}/configurations/{profile}",
            get(
                |Path((_, _, profile)): Path<(String, String, String)>| async move {
                    match profile.as_str() {
                        "overlay-oauth-client" => r#"{"id":"client","secret":"s"}"#.to_string(),
                        "server-overlay-uri" => "http://printserver.internal/".to_string(),
                        other => other.to_string(),
                    }
                },
            ),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{address}")
    }

    #[tokio::test]
    async fn listener_failure_still_releases_overlay_session() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut agent = AgentSettings::default();
        agent.base_url = profile_agent().await;

        let coordinator = Coordinator::new(
            CredentialStore::new(agent),
            Arc::new(CountingOpener {
                closes: closes.clone(),
            }),
            RewriteRules::from(&ProxySettings::default()),
            ReloadSettings {
                interval_secs: 3600,
                tick_timeout_secs: 5,
            },
        );
        coordinator.start().await.unwrap();

        let served = Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "accept failed",
        ));
        let result = release_and_finish(&coordinator, Duration::from_secs(2), served).await;

        // The error still surfaces, but only after the session was closed.
        assert!(matches!(result, Err(ServerError::Io(_))));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
