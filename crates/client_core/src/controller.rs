//! Projects session transitions into the view and drops fetch results that
//! arrive after the session has moved on.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::{
    domain::{welcome_greeting, Epoch, Panel, Record, Session, SessionInfo, TableRow},
    error::{AuthError, FetchError},
};
use tokio::{sync::broadcast::error::RecvError, task::JoinSet};
use tracing::{debug, error, info, warn};

use crate::{DocumentStore, IdentityProvider, UserNotifier, ViewPort};

/// A fetch issued on entry into `SignedIn`, tagged with the epoch it
/// belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub epoch: Epoch,
    pub collection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied { rows: usize },
    Discarded { issued: Epoch, current: Epoch },
}

struct Projection {
    view: Box<dyn ViewPort>,
    epoch: Epoch,
    session: Session,
}

#[derive(Clone)]
pub struct SessionViewController {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn UserNotifier>,
    collection: String,
    projection: Arc<Mutex<Projection>>,
}

impl SessionViewController {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn UserNotifier>,
        view: Box<dyn ViewPort>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            store,
            notifier,
            collection: collection.into(),
            projection: Arc::new(Mutex::new(Projection {
                view,
                epoch: Epoch::default(),
                session: Session::SignedOut,
            })),
        }
    }

    fn projection(&self) -> MutexGuard<'_, Projection> {
        self.projection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn epoch(&self) -> Epoch {
        self.projection().epoch
    }

    pub fn session(&self) -> Session {
        self.projection().session.clone()
    }

    /// Applies a session reported by the identity provider. The view is
    /// updated before this returns; a ticket is handed back when a fetch
    /// has to follow.
    pub fn on_session_change(&self, session: Session) -> Option<FetchTicket> {
        let mut projection = self.projection();
        projection.epoch = projection.epoch.next();
        let epoch = projection.epoch;

        let ticket = match &session {
            Session::SignedOut => {
                info!(%epoch, "session changed: signed out");
                projection.view.set_panel(Panel::SignedOut);
                projection.view.set_greeting(None);
                projection.view.set_rows(&[]);
                None
            }
            Session::SignedIn(info) => {
                info!(%epoch, identity_key = %info.identity_key, "session changed: signed in");
                projection.view.set_panel(Panel::SignedIn);
                projection
                    .view
                    .set_greeting(Some(&welcome_greeting(&info.display_name)));
                projection.view.set_rows(&[]);
                Some(FetchTicket {
                    epoch,
                    collection: self.collection.clone(),
                })
            }
        };

        projection.session = session;
        ticket
    }

    /// Runs the fetch for `ticket` and renders the result if the session is
    /// still the one that issued it.
    pub async fn complete_fetch(&self, ticket: FetchTicket) -> Result<FetchOutcome, FetchError> {
        let result = self.store.fetch_collection(&ticket.collection).await;

        let mut projection = self.projection();
        let current = projection.epoch;
        if current != ticket.epoch {
            match &result {
                Ok(records) => debug!(
                    issued = %ticket.epoch,
                    %current,
                    records = records.len(),
                    "discarding stale fetch result"
                ),
                Err(err) => debug!(
                    issued = %ticket.epoch,
                    %current,
                    error = %err,
                    "stale fetch failed"
                ),
            }
            return result.map(|_| FetchOutcome::Discarded {
                issued: ticket.epoch,
                current,
            });
        }

        let records = match result {
            Ok(records) => records,
            Err(err) => {
                error!(epoch = %current, error = %err, "error fetching collection");
                return Err(err);
            }
        };

        let rows: Vec<TableRow> = records.iter().map(Record::to_row).collect();
        projection.view.set_rows(&rows);
        debug!(epoch = %current, rows = rows.len(), collection = %ticket.collection, "rendered collection");
        Ok(FetchOutcome::Applied { rows: rows.len() })
    }

    /// The resulting session arrives through the provider's subscription,
    /// not through the returned value.
    pub async fn request_sign_in(&self) -> Result<SessionInfo, AuthError> {
        debug!("sign-in requested");
        match self.identity.sign_in_interactive().await {
            Ok(info) => {
                info!(identity_key = %info.identity_key, "user signed in");
                Ok(info)
            }
            Err(err) => {
                error!(error = %err, code = ?err.code(), "error during sign-in");
                self.notifier
                    .alert(&format!("Sign-in failed: {}", err.message()));
                Err(err)
            }
        }
    }

    pub async fn request_sign_out(&self) -> Result<(), AuthError> {
        debug!("sign-out requested");
        match self.identity.sign_out().await {
            Ok(()) => {
                info!("user signed out");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "error during sign-out");
                Err(err)
            }
        }
    }

    /// Feeds every session the provider reports into the controller,
    /// starting with the restored one. Fetches run as separate tasks so a
    /// slow one never holds back the next transition. Returns once the
    /// provider's channel closes and in-flight fetches have settled.
    pub async fn run_session_loop(self) {
        let mut sessions = self.identity.subscribe();
        let mut fetches = JoinSet::new();

        let initial = Session::from(self.identity.current());
        self.apply_session(&mut fetches, initial);

        loop {
            tokio::select! {
                received = sessions.recv() => match received {
                    Ok(session) => self.apply_session(&mut fetches, Session::from(session)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session listener lagged behind provider");
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(_) = fetches.join_next(), if !fetches.is_empty() => {}
            }
        }

        while fetches.join_next().await.is_some() {}
        debug!("session loop finished");
    }

    fn apply_session(&self, fetches: &mut JoinSet<()>, session: Session) {
        if let Some(ticket) = self.on_session_change(session) {
            let controller = self.clone();
            fetches.spawn(async move {
                // Failures are already logged inside complete_fetch.
                let _ = controller.complete_fetch(ticket).await;
            });
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
