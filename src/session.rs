//! Session-gate seam: who owns the records the engine is looking at.
//!
//! The engine never reads ambient session state. It is constructed with an
//! explicit identity and updated through explicit change notifications, either
//! directly via [`Reconciler::set_identity`] or by following a gate with
//! [`Reconciler::follow`].
//!
//! [`Reconciler::set_identity`]: crate::engine::Reconciler::set_identity
//! [`Reconciler::follow`]: crate::engine::Reconciler::follow

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use tokio::sync::watch;

/// Opaque owner identity scoping every store query and feed subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Resolves the signed-in identity and announces sign-in/sign-out events.
///
/// The authentication UI itself is an external collaborator; this trait is
/// only the contract the engine consumes.
#[async_trait::async_trait]
pub trait SessionGate: Send + Sync {
    /// The currently signed-in identity, or `None` when signed out.
    async fn current_identity(&self) -> Option<Identity>;

    /// A receiver that observes every identity change.
    fn identity_changes(&self) -> watch::Receiver<Option<Identity>>;
}

/// A gate whose identity is set programmatically.
///
/// Hosts that resolve authentication elsewhere (a token exchange, a desktop
/// keychain) push the outcome here; tests drive sign-in/sign-out directly.
pub struct StaticSession {
    tx: watch::Sender<Option<Identity>>,
}

impl StaticSession {
    pub fn new(initial: Option<Identity>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn sign_in(&self, identity: Identity) {
        self.tx.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(None);
    }
}

#[async_trait::async_trait]
impl SessionGate for StaticSession {
    async fn current_identity(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_session_announces_changes() {
        let gate = StaticSession::new(None);
        let mut changes = gate.identity_changes();
        assert_eq!(gate.current_identity().await, None);

        gate.sign_in(Identity::from("user-1"));
        changes.changed().await.unwrap();
        assert_eq!(
            changes.borrow_and_update().clone(),
            Some(Identity::from("user-1"))
        );
        assert_eq!(gate.current_identity().await, Some(Identity::from("user-1")));

        gate.sign_out();
        changes.changed().await.unwrap();
        assert_eq!(changes.borrow_and_update().clone(), None);
    }
}
