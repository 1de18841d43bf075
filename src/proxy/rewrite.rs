//! Request rewriting and forwarding.
//!
//! A [`RequestRewriter`] is an immutable pairing of one configuration
//! snapshot with one overlay session's dial capability. It is replaced
//! wholesale on every reload that detects change; nothing here mutates after
//! construction.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::uri::Scheme;
use axum::http::{header, HeaderValue, Method, Request, Response, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::schema::ProxySettings;
use crate::config::snapshot::ConfigSnapshot;
use crate::observability::metrics;
use crate::overlay::Session;
use crate::proxy::inject::inject_auth_token;

/// Largest body buffered for injection. Larger qualifying bodies fail the
/// request rather than exhaust memory.
const MAX_INJECT_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Request headers that must not cross the proxy boundary.
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("gateway not started")]
    NotReady,

    #[error("target url has no host")]
    MissingHost,

    #[error("invalid outbound request: {0}")]
    Rewrite(#[from] axum::http::Error),

    #[error("failed to buffer request body: {0}")]
    Body(axum::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

/// Injection rules, fixed at startup.
#[derive(Debug, Clone)]
pub struct RewriteRules {
    /// Web-services endpoint path that qualifies for injection.
    pub web_services_path: String,

    /// Inbound header whose truthy value requests injection.
    pub trigger_header: String,
}

impl From<&ProxySettings> for RewriteRules {
    fn from(settings: &ProxySettings) -> Self {
        Self {
            web_services_path: settings.web_services_path.clone(),
            trigger_header: settings.trigger_header.clone(),
        }
    }
}

/// Connector that routes every outbound connection through one overlay
/// session's dial capability.
#[derive(Clone)]
pub struct OverlayConnector {
    session: Arc<dyn Session>,
}

impl OverlayConnector {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }
}

impl tower::Service<Uri> for OverlayConnector {
    type Response = TokioIo<TcpStream>;
    type Error = std::io::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let session = self.session.clone();
        Box::pin(async move {
            let host = uri.host().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "uri has no host")
            })?;
            let port = uri.port_u16().unwrap_or_else(|| {
                if uri.scheme_str() == Some("https") {
                    443
                } else {
                    80
                }
            });
            let stream = session.dial(host, port).await?;
            Ok(TokioIo::new(stream))
        })
    }
}

/// Rewrites inbound requests against one snapshot and forwards them over one
/// overlay session.
pub struct RequestRewriter {
    snapshot: Arc<ConfigSnapshot>,
    rules: RewriteRules,
    client: Client<OverlayConnector, Body>,
}

impl RequestRewriter {
    pub fn new(
        snapshot: Arc<ConfigSnapshot>,
        session: Arc<dyn Session>,
        rules: RewriteRules,
    ) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(OverlayConnector::new(session));
        Self {
            snapshot,
            rules,
            client,
        }
    }

    /// Rewrite `inbound` into an outbound request, inject the auth token if
    /// the call qualifies, and forward it to the backend.
    pub async fn forward(&self, inbound: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let (parts, body) = inbound.into_parts();
        let target = &self.snapshot.target;

        let path = join_paths(target.path(), parts.uri.path());
        let query = merge_queries(target.query(), parts.uri.query());
        let path_and_query = match &query {
            Some(query) => format!("{path}?{query}"),
            None => path.clone(),
        };

        let host = target.host_str().ok_or(ProxyError::MissingHost)?;
        let authority = match target.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let uri = Uri::builder()
            .scheme(Scheme::try_from(target.scheme()).map_err(axum::http::Error::from)?)
            .authority(authority.as_str())
            .path_and_query(path_and_query.as_str())
            .build()?;

        let mut builder = Request::builder()
            .method(parts.method.clone())
            .uri(uri)
            .version(axum::http::Version::HTTP_11);

        if let Some(headers) = builder.headers_mut() {
            for (name, value) in parts.headers.iter() {
                let lowered = name.as_str();
                if lowered == "host" || HOP_BY_HOP_HEADERS.contains(&lowered) {
                    continue;
                }
                headers.insert(name.clone(), value.clone());
            }
        }

        let body = if self.should_inject(&parts, &path) {
            let bytes = axum::body::to_bytes(body, MAX_INJECT_BODY_BYTES)
                .await
                .map_err(ProxyError::Body)?;
            match inject_auth_token(&bytes, &self.snapshot.auth_token) {
                Ok(injected) => {
                    if let Some(headers) = builder.headers_mut() {
                        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(injected.len()));
                    }
                    Body::from(injected)
                }
                Err(error) => {
                    // Injection failure is non-fatal: the call proceeds with
                    // its original body and the backend decides.
                    tracing::warn!(
                        error = %error,
                        "auth token injection failed, forwarding original body"
                    );
                    metrics::record_injection_failure();
                    if let Some(headers) = builder.headers_mut() {
                        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
                    }
                    Body::from(bytes)
                }
            }
        } else {
            body
        };

        let outbound = builder.body(body)?;
        let response = self.client.request(outbound).await?;
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }

    fn should_inject(&self, parts: &axum::http::request::Parts, outbound_path: &str) -> bool {
        if parts.method != Method::POST {
            return false;
        }

        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if !is_xml_content_type(content_type) {
            return false;
        }

        let resolved = outbound_path.trim().trim_end_matches('/');
        let expected = self.rules.web_services_path.trim().trim_end_matches('/');
        if !resolved.eq_ignore_ascii_case(expected) {
            return false;
        }

        let trigger = parts
            .headers
            .get(self.rules.trigger_header.as_str())
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        is_truthy(trigger)
    }
}

fn is_xml_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    essence.eq_ignore_ascii_case("application/xml") || essence.eq_ignore_ascii_case("text/xml")
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Join the target's base path with the inbound path, reconciling the slash
/// at the boundary: a doubled slash collapses, a missing one is inserted.
pub fn join_paths(base: &str, path: &str) -> String {
    let base_slash = base.ends_with('/');
    let path_slash = path.starts_with('/');
    match (base_slash, path_slash) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Concatenate the target's fixed query with the inbound query, `&`-joined
/// only when both are non-empty.
pub fn merge_queries(target: Option<&str>, inbound: Option<&str>) -> Option<String> {
    match (target.unwrap_or(""), inbound.unwrap_or("")) {
        ("", "") => None,
        (target, "") => Some(target.to_string()),
        ("", inbound) => Some(inbound.to_string()),
        (target, inbound) => Some(format!("{target}&{inbound}")),
    }
}
