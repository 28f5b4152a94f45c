use async_trait::async_trait;
use shared::{
    domain::{Panel, Record, SessionInfo, TableRow},
    error::{AuthError, FetchError},
};
use tokio::sync::broadcast;

pub mod controller;
pub mod identity;
pub mod store;

pub use controller::{FetchOutcome, FetchTicket, SessionViewController};
pub use identity::{IdentityConfig, IdentityToolkitProvider, PasswordCredentials};
pub use store::{FirestoreConfig, FirestoreStore};

/// External identity service. Session changes are pushed through
/// [`IdentityProvider::subscribe`]; `None` means signed out.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_interactive(&self) -> Result<SessionInfo, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    fn subscribe(&self) -> broadcast::Receiver<Option<SessionInfo>>;
    /// Session restored by the provider, reported as the first state.
    fn current(&self) -> Option<SessionInfo>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch_collection(&self, name: &str) -> Result<Vec<Record>, FetchError>;
}

/// Bearer token for requests made on behalf of the signed-in user.
pub trait AccessTokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// The UI regions the controller projects into.
pub trait ViewPort: Send {
    fn set_panel(&mut self, panel: Panel);
    fn set_greeting(&mut self, greeting: Option<&str>);
    fn set_rows(&mut self, rows: &[TableRow]);
}

/// User-visible notification, blocking where the surface allows it.
/// `apps/viewer` prints without waiting; see `TerminalNotifier`.
pub trait UserNotifier: Send + Sync {
    fn alert(&self, message: &str);
}
