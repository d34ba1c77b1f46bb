// ── Credential session ──
//
// Owns the bearer token pair. Readers take a cheap snapshot of the
// current token through `ArcSwapOption` and never wait on a refresh;
// writers (login / refresh) are serialized by a single async gate.
// A refresh that finds the gate taken is dropped, not queued.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use solarweb_api::{Credentials, SessionTokens, SolarWebClient};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::error::CoreError;
use crate::store::{NodePath, NodeSpec, ScalarType, ScalarValue, StateSink};

/// Path of the connectivity flag in the state tree.
pub const CONNECTION_PATH: &str = "info.connection";

/// A live token pair.
#[derive(Debug)]
pub struct Session {
    pub tokens: SessionTokens,
    pub issued_at: DateTime<Utc>,
}

/// What a call to [`CredentialSession::refresh`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The token pair was renewed.
    Renewed,
    /// No session existed, so a fresh login was performed.
    LoggedIn,
    /// Another login or refresh held the gate; nothing was done.
    AlreadyInFlight,
}

/// Login / refresh lifecycle of the account's bearer token.
pub struct CredentialSession {
    client: SolarWebClient,
    credentials: Credentials,
    sink: Arc<dyn StateSink>,
    current: ArcSwapOption<Session>,
    connected: watch::Sender<bool>,
    gate: Mutex<()>,
}

impl CredentialSession {
    pub fn new(client: SolarWebClient, credentials: Credentials, sink: Arc<dyn StateSink>) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            client,
            credentials,
            sink,
            current: ArcSwapOption::empty(),
            connected,
            gate: Mutex::new(()),
        }
    }

    // ── Readers ──────────────────────────────────────────────────────

    /// The bearer token to use right now, if logged in.
    pub fn access_token(&self) -> Option<SecretString> {
        self.current
            .load()
            .as_ref()
            .map(|s| s.tokens.access_token.clone())
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.current.load().as_ref().map(|s| s.issued_at)
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Exchange the account credentials for a new session.
    ///
    /// Waits for an in-flight refresh to finish first. On failure the
    /// previous session (if any) is discarded.
    pub async fn login(&self) -> Result<(), CoreError> {
        let _gate = self.gate.lock().await;
        self.login_locked().await
    }

    /// Renew the token pair. Falls back to a full login when no session
    /// exists. Returns [`RefreshOutcome::AlreadyInFlight`] without doing
    /// anything if another login or refresh is running.
    pub async fn refresh(&self) -> Result<RefreshOutcome, CoreError> {
        let Ok(_gate) = self.gate.try_lock() else {
            debug!("token refresh already in flight, dropping request");
            return Ok(RefreshOutcome::AlreadyInFlight);
        };

        let Some(current) = self.current.load_full() else {
            debug!("no session to refresh, logging in");
            self.login_locked().await?;
            return Ok(RefreshOutcome::LoggedIn);
        };

        match self.client.refresh(&current.tokens).await {
            Ok(tokens) => {
                self.install(tokens);
                info!("session token refreshed");
                Ok(RefreshOutcome::Renewed)
            }
            Err(e) => {
                self.current.store(None);
                self.set_connected(false);
                warn!(error = %e, "token refresh failed, session dropped");
                Err(e.into())
            }
        }
    }

    /// Mark the mirror offline, e.g. on shutdown. The session is kept.
    pub fn mark_disconnected(&self) {
        self.set_connected(false);
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn login_locked(&self) -> Result<(), CoreError> {
        match self.client.login(&self.credentials).await {
            Ok(tokens) => {
                self.install(tokens);
                info!(user = %self.credentials.username, "logged in");
                Ok(())
            }
            Err(e) => {
                self.current.store(None);
                self.set_connected(false);
                error!(user = %self.credentials.username, error = %e, "login failed");
                Err(e.into())
            }
        }
    }

    fn install(&self, tokens: SessionTokens) {
        self.current.store(Some(Arc::new(Session {
            tokens,
            issued_at: Utc::now(),
        })));
        self.set_connected(true);
    }

    fn set_connected(&self, connected: bool) {
        self.connected.send_replace(connected);
        let path = NodePath::parse(CONNECTION_PATH);
        self.sink.ensure_node(
            &path,
            &NodeSpec::leaf("Device or service connected", ScalarType::Boolean),
        );
        self.sink.set_value(&path, ScalarValue::Bool(connected), true);
    }
}
