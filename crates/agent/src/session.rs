//! Session storage.
//!
//! Each session lives behind its own `tokio::sync::Mutex`, so turns on the same
//! id are serialized (in arrival order, the tokio mutex is fair) while turns on
//! different ids proceed in parallel. The map lock is only held for lookups.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use tracechat_core::{Session, SessionId};

pub type SessionHandle = Arc<Mutex<Session>>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the session for `id`, creating it lazily. A missing id mints a new one.
    async fn get_or_create(&self, id: Option<&str>) -> SessionHandle;

    /// Point-in-time copy of a stored session.
    async fn get(&self, id: &SessionId) -> Option<Session>;

    /// Replaces the stored state for `session.id`.
    async fn put(&self, session: Session);

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Eviction limits. A zero value disables the corresponding rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub idle_ttl_secs: u64,
    pub max_sessions: usize,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self { idle_ttl_secs: 86_400, max_sessions: 10_000 }
    }
}

impl EvictionPolicy {
    pub fn unbounded() -> Self {
        Self { idle_ttl_secs: 0, max_sessions: 0 }
    }
}

struct SessionSlot {
    session: SessionHandle,
    last_seen: DateTime<Utc>,
}

impl SessionSlot {
    fn new(session: Session) -> Self {
        Self { session: Arc::new(Mutex::new(session)), last_seen: Utc::now() }
    }

    /// Only the map holds the handle, so no turn is running on it.
    fn is_idle(&self) -> bool {
        Arc::strong_count(&self.session) == 1
    }
}

pub struct InMemorySessionStore {
    slots: RwLock<HashMap<String, SessionSlot>>,
    policy: EvictionPolicy,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(EvictionPolicy::default())
    }
}

impl InMemorySessionStore {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self { slots: RwLock::new(HashMap::new()), policy }
    }

    /// Drops idle sessions whose last activity is older than the TTL, measured from `now`.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut slots = self.slots.write().await;
        Self::evict_expired_locked(&mut slots, self.policy, now)
    }

    fn evict_expired_locked(
        slots: &mut HashMap<String, SessionSlot>,
        policy: EvictionPolicy,
        now: DateTime<Utc>,
    ) -> usize {
        if policy.idle_ttl_secs == 0 {
            return 0;
        }
        let ttl = Duration::seconds(i64::try_from(policy.idle_ttl_secs).unwrap_or(i64::MAX));
        let before = slots.len();
        slots.retain(|_, slot| !slot.is_idle() || now - slot.last_seen <= ttl);
        let evicted = before - slots.len();
        if evicted > 0 {
            info!(event_name = "chat.session.evicted", reason = "idle_ttl", evicted, "evicted idle sessions");
        }
        evicted
    }

    fn enforce_capacity_locked(slots: &mut HashMap<String, SessionSlot>, policy: EvictionPolicy) {
        if policy.max_sessions == 0 || slots.len() <= policy.max_sessions {
            return;
        }
        let overflow = slots.len() - policy.max_sessions;
        let mut idle: Vec<(String, DateTime<Utc>)> = slots
            .iter()
            .filter(|(_, slot)| slot.is_idle())
            .map(|(id, slot)| (id.clone(), slot.last_seen))
            .collect();
        idle.sort_by_key(|(_, last_seen)| *last_seen);

        let evicted = idle.into_iter().take(overflow).map(|(id, _)| slots.remove(&id)).count();
        if evicted > 0 {
            info!(event_name = "chat.session.evicted", reason = "capacity", evicted, "evicted least recent sessions");
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, id: Option<&str>) -> SessionHandle {
        let id = match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => SessionId(id.to_string()),
            None => SessionId::generate(),
        };

        let mut slots = self.slots.write().await;
        Self::evict_expired_locked(&mut slots, self.policy, Utc::now());

        if let Some(slot) = slots.get_mut(id.as_str()) {
            slot.last_seen = Utc::now();
            return slot.session.clone();
        }

        debug!(event_name = "chat.session.created", session_id = %id, "created session");
        let slot = SessionSlot::new(Session::new(id.clone()));
        let handle = slot.session.clone();
        slots.insert(id.0, slot);
        Self::enforce_capacity_locked(&mut slots, self.policy);
        handle
    }

    async fn get(&self, id: &SessionId) -> Option<Session> {
        let handle = {
            let slots = self.slots.read().await;
            slots.get(id.as_str()).map(|slot| slot.session.clone())
        }?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    async fn put(&self, session: Session) {
        let mut slots = self.slots.write().await;
        match slots.get_mut(session.id.as_str()) {
            Some(slot) => {
                slot.last_seen = Utc::now();
                let handle = slot.session.clone();
                drop(slots);
                *handle.lock().await = session;
            }
            None => {
                slots.insert(session.id.0.clone(), SessionSlot::new(session));
                Self::enforce_capacity_locked(&mut slots, self.policy);
            }
        }
    }

    async fn len(&self) -> usize {
        self.slots.read().await.len()
    }
}
