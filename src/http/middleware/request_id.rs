//! Request ID propagation.
//!
//! Ensures every request entering the proxy carries an `x-request-id`,
//! generating one when the caller did not supply it. The same id travels to
//! the backend because the rewriter copies request headers through.

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub async fn request_id(mut request: Request<Body>, next: Next) -> Response {
    if !request.headers().contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
            request.headers_mut().insert("x-request-id", value);
        }
    }
    next.run(request).await
}
