use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::UserId;

/// Where a user is in the age → resting HR dialogue.
///
/// Idle is not a variant: it is the absence of a session in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogueState {
    AwaitingAge,
    /// Carries the already validated age, so this state cannot exist without one.
    AwaitingRestingHr { age: u32 },
}

impl DialogueState {
    pub fn age(&self) -> Option<u32> {
        match self {
            DialogueState::AwaitingAge => None,
            DialogueState::AwaitingRestingHr { age } => Some(*age),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationSession {
    pub user_id: UserId,
    pub state: DialogueState,
    pub updated_at: Instant,
}

impl ConversationSession {
    pub fn new(user_id: UserId, state: DialogueState) -> Self {
        Self::new_at(user_id, state, Instant::now())
    }

    pub fn new_at(user_id: UserId, state: DialogueState, now: Instant) -> Self {
        Self {
            user_id,
            state,
            updated_at: now,
        }
    }

    pub fn age(&self) -> Option<u32> {
        self.state.age()
    }
}

/// Per-user session storage.
///
/// Implementations must be safe to share between tasks. They do not serialize
/// a user's read-modify-write on their own; the engine holds a `UserLocks`
/// guard around each event.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Option<ConversationSession>;
    async fn put(&self, session: ConversationSession);
    async fn remove(&self, user_id: UserId);
}

/// Ephemeral in-process store with optional idle expiry.
///
/// One map lock covers all users, but it is only held for a single map
/// operation and never across other awaits, so distinct users do not queue
/// behind each other's dialogue processing.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    ttl: Option<Duration>,
    sessions: Mutex<HashMap<UserId, ConversationSession>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn is_expired(&self, session: &ConversationSession, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(session.updated_at) >= ttl,
            None => false,
        }
    }

    pub async fn get_at(&self, user_id: UserId, now: Instant) -> Option<ConversationSession> {
        let mut map = self.sessions.lock().await;
        let session = map.get(&user_id)?;
        if self.is_expired(session, now) {
            map.remove(&user_id);
            return None;
        }
        Some(session.clone())
    }

    /// Drop every expired session. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now()).await
    }

    pub async fn purge_expired_at(&self, now: Instant) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let mut map = self.sessions.lock().await;
        let before = map.len();
        map.retain(|_, s| !self.is_expired(s, now));
        before - map.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: UserId) -> Option<ConversationSession> {
        self.get_at(user_id, Instant::now()).await
    }

    async fn put(&self, session: ConversationSession) {
        let mut map = self.sessions.lock().await;
        map.insert(session.user_id, session);
    }

    async fn remove(&self, user_id: UserId) {
        self.sessions.lock().await.remove(&user_id);
    }
}

/// One async mutex per user.
///
/// The outer map lock is only held long enough to fetch the user's mutex, so
/// different users never wait on each other's events.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn lock_user(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Release `guard` and drop the user's entry if nobody else holds or waits on it.
    ///
    /// Every holder and waiter owns a clone of the user's `Arc`, so a strong count
    /// of one (the map's) means the entry is unused.
    pub async fn unlock_user(&self, user_id: UserId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut map = self.inner.lock().await;
        if map
            .get(&user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&user_id);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Forget locks nobody holds or waits on.
    pub async fn prune(&self) -> usize {
        let mut map = self.inner.lock().await;
        let before = map.len();
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - map.len()
    }
}
