//! Session lookup by user
//!
//! The map lock is only held long enough to find or insert a session;
//! work on a session happens under that session's own lock.

use crate::session::{Session, UserId};
use crate::storage::StorageArea;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tracing::debug;

pub type SessionHandle = Arc<Mutex<Session>>;

pub trait SessionStore: Send + Sync {
    /// The user's session, created empty on first use
    fn get_or_create(&self, user: UserId) -> SessionHandle;

    /// Reset the user's session if it exists; returns whether one existed
    fn reset(&self, user: UserId, storage: &dyn StorageArea) -> bool;

    fn remove(&self, user: UserId) -> Option<SessionHandle>;

    /// Drop sessions holding nothing that nobody is using; returns how many
    fn evict_idle(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<UserId, SessionHandle>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<UserId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for InMemorySessionStore {
    fn get_or_create(&self, user: UserId) -> SessionHandle {
        self.map()
            .entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(user))))
            .clone()
    }

    fn reset(&self, user: UserId, storage: &dyn StorageArea) -> bool {
        let Some(handle) = self.map().get(&user).cloned() else {
            return false;
        };
        lock(&handle).reset(storage);
        true
    }

    fn remove(&self, user: UserId) -> Option<SessionHandle> {
        self.map().remove(&user)
    }

    fn evict_idle(&self) -> usize {
        let mut sessions = self.map();
        let before = sessions.len();
        sessions.retain(|_, handle| !is_idle(handle));
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    fn len(&self) -> usize {
        self.map().len()
    }
}

/// Only the store holds the handle and the session is pristine. A session
/// locked elsewhere is in use and never idle.
fn is_idle(handle: &SessionHandle) -> bool {
    if Arc::strong_count(handle) > 1 {
        return false;
    }
    match handle.try_lock() {
        Ok(session) => !session.executing && session.is_pristine(),
        Err(TryLockError::Poisoned(poisoned)) => {
            let session = poisoned.into_inner();
            !session.executing && session.is_pristine()
        }
        Err(TryLockError::WouldBlock) => false,
    }
}

/// Lock a session, recovering from a panic in another holder
pub fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
