//! Registry of open console sessions.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::SessionId;
use crate::error::ConsoleError;
use crate::Result;

/// Handle used to observe and force-close one session from outside it.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    peer: Option<SocketAddr>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Create a handle that signals `cancel` on force-close.
    pub fn new(id: SessionId, cancel: CancellationToken) -> Self {
        Self {
            id,
            peer: None,
            cancel,
        }
    }

    /// Attach the remote address of the connection.
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Ask the session to stop. Its pending or next read returns end of
    /// stream. Does not wait for the session to exit.
    pub fn force_close(&self) {
        self.cancel.cancel();
    }

    /// Check whether a force-close has been requested.
    pub fn is_closing(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Thread-safe index of the sessions whose loop has started but not exited.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    live: watch::Sender<usize>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            live: watch::Sender::new(0),
        }
    }

    /// Register a session and return the guard that deregisters it on drop.
    pub fn register(self: &Arc<Self>, handle: SessionHandle) -> Result<Registration> {
        let id = handle.id();
        self.insert(handle)?;
        Ok(Registration {
            id,
            registry: Arc::clone(self),
        })
    }

    /// Insert a handle without a guard.
    ///
    /// Fails with [`ConsoleError::DuplicateSession`] if the ID is present.
    pub fn insert(&self, handle: SessionHandle) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| ConsoleError::LockPoisoned)?;

        if sessions.contains_key(&handle.id) {
            return Err(ConsoleError::DuplicateSession(handle.id));
        }

        trace!(session = %handle.id, "registered");
        sessions.insert(handle.id, handle);
        self.live.send_replace(sessions.len());
        Ok(())
    }

    /// Remove a session. Removing an absent ID is a no-op.
    ///
    /// Returns whether an entry was removed. Runs on every session exit
    /// path, so a poisoned lock is recovered rather than reported.
    pub fn deregister(&self, id: &SessionId) -> bool {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let removed = sessions.remove(id).is_some();
        if removed {
            trace!(session = %id, "deregistered");
            self.live.send_replace(sessions.len());
        }
        removed
    }

    /// Apply `action` to a snapshot of the registered handles.
    ///
    /// The lock is released before `action` runs, so sessions may
    /// deregister concurrently. Returns the number of handles visited.
    pub fn for_each<F>(&self, mut action: F) -> Result<usize>
    where
        F: FnMut(&SessionHandle),
    {
        let snapshot: Vec<SessionHandle> = {
            let sessions = self
                .sessions
                .read()
                .map_err(|_| ConsoleError::LockPoisoned)?;
            sessions.values().cloned().collect()
        };

        for handle in &snapshot {
            action(handle);
        }
        Ok(snapshot.len())
    }

    /// Force-close every registered session.
    pub fn close_all(&self) -> Result<usize> {
        self.for_each(|handle| {
            debug!(session = %handle.id(), "closing");
            handle.force_close();
        })
    }

    /// Registered IDs in ascending order.
    pub fn ids(&self) -> Result<Vec<SessionId>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| ConsoleError::LockPoisoned)?;
        let mut ids: Vec<SessionId> = sessions.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    /// Number of registered sessions.
    pub fn count(&self) -> usize {
        *self.live.borrow()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Resolve once no sessions are registered.
    pub async fn wait_empty(&self) {
        let mut live = self.live.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = live.wait_for(|&count| count == 0).await;
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry membership of one session. Dropping it deregisters the session.
#[must_use = "dropping a Registration deregisters the session immediately"]
#[derive(Debug)]
pub struct Registration {
    id: SessionId,
    registry: Arc<SessionRegistry>,
}

impl Registration {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.deregister(&self.id);
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("count", &self.count())
            .finish()
    }
}
