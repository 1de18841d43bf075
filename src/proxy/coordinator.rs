//! Hot-swap coordination between the reload loop and the request path.
//!
//! The single shared mutable cell is `current`: a pointer to an immutable
//! (snapshot, session, rewriter) triple behind a read/write lock. The swap
//! installs a fully-constructed replacement under a write lock held only for
//! the pointer replacement, so readers always observe a complete triple.
//! Superseded sessions are closed asynchronously, exactly once, and only
//! from here.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::schema::ReloadSettings;
use crate::config::snapshot::ConfigSnapshot;
use crate::config::store::CredentialStore;
use crate::config::ConfigError;
use crate::observability::metrics;
use crate::overlay::{Opener, OverlayError, Session};
use crate::proxy::rewrite::{ProxyError, RequestRewriter, RewriteRules};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordinator already started")]
    AlreadyStarted,

    #[error("coordinator not started")]
    NotStarted,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),
}

/// Outcome of one reload tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Fetched snapshot was identical to the active one.
    Unchanged,
    /// A new triple was installed.
    Swapped,
}

/// The currently-active (snapshot, session, rewriter) triple.
pub struct Active {
    pub snapshot: Arc<ConfigSnapshot>,
    pub session: Arc<dyn Session>,
    pub rewriter: Arc<RequestRewriter>,
}

/// One-shot lifecycle: idle until started, running while the reload loop is
/// alive, stopped for good afterwards.
enum Lifecycle {
    Idle,
    Running {
        stop_tx: watch::Sender<bool>,
        loop_handle: JoinHandle<()>,
    },
    Stopped,
}

/// Owns the active triple and the reload loop that replaces it.
pub struct Coordinator {
    store: CredentialStore,
    opener: Arc<dyn Opener>,
    rules: RewriteRules,
    reload: ReloadSettings,
    lifecycle: Mutex<Lifecycle>,
    current: RwLock<Option<Arc<Active>>>,
}

impl Coordinator {
    pub fn new(
        store: CredentialStore,
        opener: Arc<dyn Opener>,
        rules: RewriteRules,
        reload: ReloadSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            opener,
            rules,
            reload,
            lifecycle: Mutex::new(Lifecycle::Idle),
            current: RwLock::new(None),
        })
    }

    /// Build the initial triple and launch the periodic reload loop. A
    /// failure here is fatal to startup.
    pub async fn start(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return Err(CoordinatorError::AlreadyStarted);
        }

        let snapshot = Arc::new(self.store.fetch().await?);
        let session = self
            .opener
            .open(&snapshot.overlay_client_id, &snapshot.overlay_client_secret)
            .await?;
        let rewriter = Arc::new(RequestRewriter::new(
            snapshot.clone(),
            session.clone(),
            self.rules.clone(),
        ));
        *self.current.write().await = Some(Arc::new(Active {
            snapshot,
            session,
            rewriter,
        }));

        let (stop_tx, stop_rx) = watch::channel(false);
        let coordinator = Arc::clone(self);
        let loop_handle = tokio::spawn(async move {
            coordinator.reload_loop(stop_rx).await;
        });

        *lifecycle = Lifecycle::Running {
            stop_tx,
            loop_handle,
        };

        tracing::info!(
            interval_secs = self.reload.interval_secs,
            "coordinator started"
        );

        Ok(())
    }

    /// Signal the reload loop to exit, wait for it, then close the active
    /// session and clear state.
    pub async fn stop(&self) -> Result<(), CoordinatorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let state = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);
        let (stop_tx, loop_handle) = match state {
            Lifecycle::Running {
                stop_tx,
                loop_handle,
            } => (stop_tx, loop_handle),
            other => {
                *lifecycle = other;
                return Err(CoordinatorError::NotStarted);
            }
        };

        let _ = stop_tx.send(true);
        if let Err(error) = loop_handle.await {
            tracing::error!(error = %error, "reload loop terminated abnormally");
        }

        let active = self.current.write().await.take();
        if let Some(active) = active {
            if let Err(error) = active.session.close().await {
                tracing::warn!(error = %error, "failed to close overlay session");
            }
        }

        tracing::info!("coordinator stopped");
        Ok(())
    }

    /// Forward one request through the current triple. The read lock is held
    /// only for the pointer copy, never across the proxied call.
    pub async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let active = { self.current.read().await.clone() };
        let active = active.ok_or(ProxyError::NotReady)?;
        active.rewriter.forward(request).await
    }

    /// The currently-installed triple, if any.
    pub async fn current(&self) -> Option<Arc<Active>> {
        self.current.read().await.clone()
    }

    async fn reload_loop(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.reload.interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; startup already built the
        // initial triple.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    tracing::debug!("reload loop exiting");
                    return;
                }
                _ = interval.tick() => {
                    let tick_timeout = Duration::from_secs(self.reload.tick_timeout_secs);
                    match tokio::time::timeout(tick_timeout, self.reload_now()).await {
                        Ok(Ok(ReloadOutcome::Swapped)) => {
                            tracing::info!("configuration change detected, new triple installed");
                            metrics::record_reload("swapped");
                        }
                        Ok(Ok(ReloadOutcome::Unchanged)) => {
                            metrics::record_reload("unchanged");
                        }
                        Ok(Err(error)) => {
                            tracing::warn!(
                                error = %error,
                                "reload tick failed, keeping current configuration"
                            );
                            metrics::record_reload("failed");
                        }
                        Err(_) => {
                            tracing::warn!("reload tick timed out, keeping current configuration");
                            metrics::record_reload("failed");
                        }
                    }
                }
            }
        }
    }

    /// Run one reload cycle: fetch, diff, and swap if anything changed.
    pub async fn reload_now(&self) -> Result<ReloadOutcome, CoordinatorError> {
        let next = self.store.fetch().await?;

        let active = self
            .current
            .read()
            .await
            .clone()
            .ok_or(CoordinatorError::NotStarted)?;

        if *active.snapshot == next {
            return Ok(ReloadOutcome::Unchanged);
        }

        // A rotated credential pair invalidates the node identity; anything
        // else can keep riding the existing session.
        let session_replaced = active.snapshot.overlay_credentials_changed(&next);
        let session = if session_replaced {
            self.opener
                .open(&next.overlay_client_id, &next.overlay_client_secret)
                .await?
        } else {
            active.session.clone()
        };

        let snapshot = Arc::new(next);
        let rewriter = Arc::new(RequestRewriter::new(
            snapshot.clone(),
            session.clone(),
            self.rules.clone(),
        ));
        let replacement = Arc::new(Active {
            snapshot,
            session,
            rewriter,
        });

        let previous = {
            let mut current = self.current.write().await;
            current.replace(replacement)
        };

        if session_replaced {
            if let Some(previous) = previous {
                let superseded = previous.session.clone();
                tokio::spawn(async move {
                    if let Err(error) = superseded.close().await {
                        tracing::warn!(error = %error, "failed to close superseded overlay session");
                    }
                });
            }
        }

        Ok(ReloadOutcome::Swapped)
    }
}
