//! Client for the identity service's password sign-in flow, with the
//! session persisted between runs.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::{
    domain::SessionInfo,
    error::{ApiErrorEnvelope, AuthError},
    protocol::{PasswordSignInRequest, PasswordSignInResponse},
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{AccessTokenSource, IdentityProvider};

pub const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com";
const SESSION_CHANNEL_CAPACITY: usize = 16;

#[derive(Clone)]
pub struct PasswordCredentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for PasswordCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub base_url: String,
    pub api_key: String,
    pub credentials: Option<PasswordCredentials>,
    pub session_file: Option<PathBuf>,
}

impl IdentityConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_IDENTITY_URL.to_string(),
            api_key: api_key.into(),
            credentials: None,
            session_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSession {
    session: SessionInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    /// When `id_token` stops being accepted by the document service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl PersistedSession {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct SignedInState {
    session: Option<SessionInfo>,
    id_token: Option<String>,
}

pub struct IdentityToolkitProvider {
    http: Client,
    config: IdentityConfig,
    state: Mutex<SignedInState>,
    events: broadcast::Sender<Option<SessionInfo>>,
}

impl IdentityToolkitProvider {
    /// Builds the provider and restores the session left by a previous run,
    /// if the session file holds one whose token has not expired.
    pub async fn open(http: Client, config: IdentityConfig) -> Self {
        let restored = match &config.session_file {
            Some(path) => load_session(path, Utc::now()).await,
            None => None,
        };
        let (events, _) = broadcast::channel(SESSION_CHANNEL_CAPACITY);
        let state = restored
            .map(|persisted| SignedInState {
                session: Some(persisted.session),
                id_token: persisted.id_token,
            })
            .unwrap_or_default();

        Self {
            http,
            config,
            state: Mutex::new(state),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, SignedInState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, session: Option<SessionInfo>) {
        // Fails only while nobody is subscribed.
        let _ = self.events.send(session);
    }

    async fn request_sign_in(
        &self,
        credentials: &PasswordCredentials,
    ) -> Result<PasswordSignInResponse, AuthError> {
        let url = format!(
            "{}/v1/accounts:signInWithPassword",
            self.config.base_url.trim_end_matches('/')
        );
        let res = self
            .http
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&PasswordSignInRequest {
                email: credentials.email.clone(),
                password: credentials.password.clone(),
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|err| {
                AuthError::interactive_with_code("network_request_failed", err.to_string())
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ApiErrorEnvelope>(&body) {
                Ok(envelope) => AuthError::from(envelope.error),
                Err(_) => AuthError::interactive(format!("identity service returned {status}")),
            });
        }

        res.json::<PasswordSignInResponse>()
            .await
            .map_err(|err| AuthError::interactive(format!("invalid sign-in response: {err}")))
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitProvider {
    async fn sign_in_interactive(&self) -> Result<SessionInfo, AuthError> {
        let Some(credentials) = self.config.credentials.as_ref() else {
            return Err(AuthError::interactive_with_code(
                "missing_credentials",
                "no credentials configured for sign-in",
            ));
        };

        let response = self.request_sign_in(credentials).await?;
        let now = Utc::now();
        let id_token = response.id_token.clone();
        let refresh_token = response.refresh_token.clone();
        let expires_at = response
            .expires_in
            .as_deref()
            .and_then(|secs| secs.trim().parse::<i64>().ok())
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl));
        let mut session = response.into_session_info();
        session.signed_in_at = Some(now);

        if let Some(path) = &self.config.session_file {
            let persisted = PersistedSession {
                session: session.clone(),
                id_token: id_token.clone(),
                refresh_token,
                expires_at,
            };
            if let Err(err) = store_session(path, &persisted).await {
                warn!(path = %path.display(), error = %err, "failed to persist session");
            }
        }

        {
            let mut state = self.state();
            state.session = Some(session.clone());
            state.id_token = id_token;
        }
        info!(identity_key = %session.identity_key, "identity service accepted credentials");
        self.publish(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(path) = &self.config.session_file {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(AuthError::sign_out(format!(
                        "failed to remove session file '{}': {err}",
                        path.display()
                    )))
                }
            }
        }

        let was_signed_in = {
            let mut state = self.state();
            state.id_token = None;
            state.session.take().is_some()
        };
        if was_signed_in {
            self.publish(None);
        } else {
            debug!("sign-out while already signed out");
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Option<SessionInfo>> {
        self.events.subscribe()
    }

    fn current(&self) -> Option<SessionInfo> {
        self.state().session.clone()
    }
}

impl AccessTokenSource for IdentityToolkitProvider {
    fn access_token(&self) -> Option<String> {
        self.state().id_token.clone()
    }
}

async fn load_session(path: &Path, now: DateTime<Utc>) -> Option<PersistedSession> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read session file");
            return None;
        }
    };
    match serde_json::from_str::<PersistedSession>(&raw) {
        Ok(persisted) if persisted.is_expired(now) => {
            info!(
                path = %path.display(),
                expires_at = ?persisted.expires_at,
                "persisted session expired; sign in again"
            );
            if let Err(err) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %err, "failed to remove expired session file");
            }
            None
        }
        Ok(persisted) => {
            debug!(path = %path.display(), "restored persisted session");
            Some(persisted)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring malformed session file");
            None
        }
    }
}

async fn store_session(path: &Path, persisted: &PersistedSession) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let raw = serde_json::to_vec_pretty(persisted)?;
    tokio::fs::write(path, raw).await
}

#[cfg(test)]
#[path = "tests/identity_tests.rs"]
mod tests;
