//! Shared fixtures for integration tests: a mock configuration agent, a
//! capturing backend, and fake overlay sessions.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::{TcpListener, TcpStream};

use tailgate::config::schema::AgentSettings;
use tailgate::overlay::{Dialer, Opener, OverlayError, Session};

pub const AGENT_TOKEN: &str = "agent-token";

/// Mock configuration agent serving named profiles over the real wire shape.
pub struct MockAgent {
    pub addr: SocketAddr,
    profiles: Arc<RwLock<HashMap<String, String>>>,
}

#[derive(Clone)]
struct AgentState {
    token: String,
    profiles: Arc<RwLock<HashMap<String, String>>>,
}

impl MockAgent {
    pub async fn start() -> Self {
        let profiles = Arc::new(RwLock::new(HashMap::new()));
        let state = AgentState {
            token: AGENT_TOKEN.to_string(),
            profiles: profiles.clone(),
        };
        let app = Router::new()
            .route(
                "/applications/{app}/environments/{env}/configurations/{profile}",
                get(profile_handler),
            )
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, profiles }
    }

    pub fn set(&self, profile: &str, value: &str) {
        self.profiles
            .write()
            .unwrap()
            .insert(profile.to_string(), value.to_string());
    }

    pub fn remove(&self, profile: &str) {
        self.profiles.write().unwrap().remove(profile);
    }

    /// Agent settings pointing a CredentialStore at this mock.
    pub fn agent_settings(&self) -> AgentSettings {
        let mut settings = AgentSettings::default();
        settings.base_url = format!("http://{}", self.addr);
        settings.access_token = AGENT_TOKEN.to_string();
        settings
    }

    /// Seed the three standard profiles under their default names.
    pub fn seed(&self, target: &str, auth_token: &str, client_id: &str, client_secret: &str) {
        self.set("server-overlay-uri", target);
        self.set("server-auth-token", auth_token);
        self.set(
            "overlay-oauth-client",
            &format!(r#"{{"id":"{client_id}","secret":"{client_secret}"}}"#),
        );
    }
}

async fn profile_handler(
    Path((_app, _env, profile)): Path<(String, String, String)>,
    State(state): State<AgentState>,
    headers: HeaderMap,
) -> Response {
    let authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if authorization != format!("Bearer {}", state.token) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match state.profiles.read().unwrap().get(&profile) {
        Some(value) => value.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// One request observed by the capturing backend.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Start a backend that records every request and answers 200 with a fixed
/// body.
pub async fn start_capturing_backend(
    response_body: &'static str,
) -> (SocketAddr, Arc<Mutex<Vec<Captured>>>) {
    let captured: Arc<Mutex<Vec<Captured>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();

    let app = Router::new().fallback(move |request: Request<Body>| {
        let sink = sink.clone();
        async move {
            let (parts, body) = request.into_parts();
            let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
            sink.lock().unwrap().push(Captured {
                method: parts.method.to_string(),
                path: parts.uri.path().to_string(),
                query: parts.uri.query().map(str::to_string),
                content_type: parts
                    .headers
                    .get("content-type")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string),
                body: bytes.to_vec(),
            });
            response_body
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, captured)
}

/// Fake overlay session dialing straight to a local backend.
pub struct FakeSession {
    backend: SocketAddr,
    closes: Arc<AtomicUsize>,
    hang_close: Arc<AtomicBool>,
}

#[async_trait]
impl Dialer for FakeSession {
    async fn dial(&self, _host: &str, _port: u16) -> std::io::Result<TcpStream> {
        TcpStream::connect(self.backend).await
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn close(&self) -> Result<(), OverlayError> {
        if self.hang_close.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fake opener recording every opened session and its close count. Flipping
/// `hang_close` makes every session's close stall, including ones already
/// handed out.
pub struct FakeOpener {
    backend: SocketAddr,
    pub fail: AtomicBool,
    pub hang_close: Arc<AtomicBool>,
    sessions: Mutex<Vec<(String, Arc<AtomicUsize>)>>,
}

impl FakeOpener {
    pub fn new(backend: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            backend,
            fail: AtomicBool::new(false),
            hang_close: Arc::new(AtomicBool::new(false)),
            sessions: Mutex::new(Vec::new()),
        })
    }

    /// (client_id, close count) per opened session, in open order.
    pub fn close_counts(&self) -> Vec<(String, usize)> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .map(|(id, closes)| (id.clone(), closes.load(Ordering::SeqCst)))
            .collect()
    }

    pub fn opened(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl Opener for FakeOpener {
    async fn open(
        &self,
        client_id: &str,
        _client_secret: &str,
    ) -> Result<Arc<dyn Session>, OverlayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OverlayError::TokenExchange(500));
        }
        let closes = Arc::new(AtomicUsize::new(0));
        self.sessions
            .lock()
            .unwrap()
            .push((client_id.to_string(), closes.clone()));
        Ok(Arc::new(FakeSession {
            backend: self.backend,
            closes,
            hang_close: self.hang_close.clone(),
        }))
    }
}
