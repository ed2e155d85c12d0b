//! Signed-in identity as seen by the scheduler.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// A signed-in learner and the bearer token for the remote store.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub access_token: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Current identity plus sign-in/out notifications.
///
/// Cloning gives another handle onto the same channel.
#[derive(Clone)]
pub struct IdentityHandle {
    sender: Arc<watch::Sender<Option<Identity>>>,
}

impl IdentityHandle {
    /// Start signed out.
    pub fn new() -> Self {
        Self::with_identity(None)
    }

    pub fn with_identity(identity: Option<Identity>) -> Self {
        let (sender, _) = watch::channel(identity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> Option<Identity> {
        self.sender.borrow().clone()
    }

    pub fn sign_in(&self, identity: Identity) {
        self.sender.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        self.sender.send_replace(None);
    }

    /// Receiver notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.sender.subscribe()
    }
}

impl Default for IdentityHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_not_printed() {
        let identity = Identity::new("learner-7", "s3cret");
        let printed = format!("{:?}", identity);
        assert!(printed.contains("learner-7"));
        assert!(!printed.contains("s3cret"));
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let handle = IdentityHandle::new();
        let mut rx = handle.subscribe();
        assert_eq!(handle.current(), None);

        handle.sign_in(Identity::new("a", "t"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().map(|i| i.id.as_str()), Some("a"));

        handle.sign_out();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_none());
        assert_eq!(handle.current(), None);
    }
}
