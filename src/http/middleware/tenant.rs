//! Tenant validation middleware.
//!
//! The platform router fronts every tenant gateway; requests that did not
//! come through it for this tenant are rejected before they reach the proxy
//! core. Two checks: the forwarded host must match this tenant's API domain,
//! and the shared router secret must match.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::Settings;

pub async fn tenant_guard(
    State(settings): State<Arc<Settings>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let expected_host = settings.expected_forwarded_host();
    let forwarded_host = request
        .headers()
        .get("x-forwarded-host")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if forwarded_host != expected_host {
        tracing::warn!(
            expected = %expected_host,
            received = %forwarded_host,
            "forwarded host mismatch"
        );
        return (StatusCode::FORBIDDEN, "forbidden").into_response();
    }

    let received_secret = request
        .headers()
        .get(settings.tenant.secret_header.as_str())
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if received_secret != settings.tenant.secret {
        tracing::warn!("router secret mismatch");
        return (StatusCode::FORBIDDEN, "forbidden").into_response();
    }

    next.run(request).await
}
