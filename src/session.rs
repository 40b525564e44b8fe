//! Principal context passed to every layer call

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use listshare_auth::{AuthSession, AuthStateChange, Principal};
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// An authenticated principal plus every live query started on its behalf.
///
/// Cloning a `Session` shares the same registry, so ending any clone ends
/// them all.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    principal: Principal,
    ended: AtomicBool,
    live: Mutex<Vec<AbortHandle>>,
}

impl Session {
    pub fn new(principal: Principal) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                principal,
                ended: AtomicBool::new(false),
                live: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Build a session for the user an auth session was issued to.
    pub fn from_auth(session: &AuthSession) -> Result<Self> {
        Ok(Self::new(session.user.principal()?))
    }

    pub fn principal(&self) -> &Principal {
        &self.inner.principal
    }

    /// Normalized email of the principal
    pub fn email(&self) -> &str {
        &self.inner.principal.email
    }

    pub fn user_id(&self) -> &str {
        &self.inner.principal.id
    }

    pub fn is_active(&self) -> bool {
        !self.inner.ended.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_active(&self) -> Result<&Principal> {
        if self.is_active() {
            Ok(&self.inner.principal)
        } else {
            Err(Error::Unauthenticated)
        }
    }

    /// Track a background task so [`Session::end`] can stop it. A task
    /// registered on an ended session is aborted immediately.
    pub(crate) fn register(&self, handle: AbortHandle) {
        let mut live = self.inner.live.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_active() {
            handle.abort();
            return;
        }
        live.retain(|h| !h.is_finished());
        live.push(handle);
    }

    /// Number of background tasks still running under this session.
    pub fn live_query_count(&self) -> usize {
        let live = self.inner.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.iter().filter(|h| !h.is_finished()).count()
    }

    /// Run `f` only if the session is still active, holding off [`Session::end`]
    /// until it returns.
    pub(crate) fn while_active<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let _live = self.inner.live.lock().unwrap_or_else(PoisonError::into_inner);
        self.is_active().then(f)
    }

    /// Stop every live query rooted at this session. Later layer calls fail
    /// with [`Error::Unauthenticated`].
    ///
    /// Once this returns no live query of the session publishes another
    /// state, even if its task is still mid-poll on another worker thread.
    pub fn end(&self) {
        let mut live = self.inner.live.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        for handle in live.drain(..) {
            handle.abort();
        }
        info!(email = %self.email(), "session ended");
    }

    /// End this session as soon as the identity provider reports a sign-out.
    pub fn end_on_sign_out(&self, mut changes: broadcast::Receiver<AuthStateChange>) {
        let session = self.clone();
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(AuthStateChange::SignedOut) | Err(broadcast::error::RecvError::Closed) => {
                        session.end();
                        return;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "auth state listener lagged");
                    }
                }
            }
        });
        self.register(task.abort_handle());
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("principal", &self.inner.principal)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_end_aborts_registered_tasks() {
        let session = Session::new(Principal::new("u1", "Alice@X.com"));
        assert_eq!(session.email(), "alice@x.com");

        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        session.register(task.abort_handle());
        assert_eq!(session.live_query_count(), 1);

        session.end();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!session.is_active());
        assert!(matches!(session.ensure_active(), Err(Error::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_register_after_end_aborts() {
        let session = Session::new(Principal::new("u1", "alice@x.com"));
        session.end();
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        session.register(task.abort_handle());
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_while_active_stops_after_end() {
        let session = Session::new(Principal::new("u1", "alice@x.com"));
        assert_eq!(session.while_active(|| 1), Some(1));
        session.end();
        assert_eq!(session.while_active(|| 1), None);
    }

    #[tokio::test]
    async fn test_sign_out_event_ends_session() {
        let (tx, rx) = broadcast::channel(4);
        let session = Session::new(Principal::new("u1", "alice@x.com"));
        session.end_on_sign_out(rx);
        tx.send(AuthStateChange::SignedOut).unwrap();

        for _ in 0..50 {
            if !session.is_active() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!session.is_active());
    }
}
