//! Cookie sessions that carry the anti-forgery token.
//!
//! Sessions live in process memory and the store never holds more than a
//! fixed number of them, so anonymous token requests cannot grow it.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tower_sessions::cookie::time::{Duration, OffsetDateTime};
use tower_sessions::cookie::SameSite;
use tower_sessions::session::{Id, Record};
use tower_sessions::{session_store, Expiry, SessionManagerLayer, SessionStore};

use crate::assistant::core::config::{NonceConfig, MAX_NONCE_TTL_SECS};

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "shop_assistant_session";

/// In-memory session store holding at most `capacity` sessions.
#[derive(Clone, Debug)]
pub struct BoundedSessionStore {
    records: Arc<DashMap<Id, Record>>,
    capacity: usize,
}

impl BoundedSessionStore {
    /// Create an empty store; a zero capacity is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of sessions currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no sessions are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop expired sessions, then evict the ones closest to expiry until
    /// one more session fits.
    fn make_room(&self) {
        let now = OffsetDateTime::now_utc();
        self.records.retain(|_, record| record.expiry_date > now);

        while self.records.len() >= self.capacity {
            let oldest = self
                .records
                .iter()
                .min_by_key(|entry| entry.value().expiry_date)
                .map(|entry| *entry.key());
            let Some(id) = oldest else {
                break;
            };
            self.records.remove(&id);
            tracing::debug!("session store full, evicted oldest session");
        }
    }
}

#[async_trait]
impl SessionStore for BoundedSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        while self.records.contains_key(&record.id) {
            record.id = Id::default();
        }
        self.make_room();
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        if !self.records.contains_key(&record.id) {
            self.make_room();
        }
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .records
            .get(session_id)
            .filter(|record| record.expiry_date > now)
            .map(|record| record.value().clone()))
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.records.remove(session_id);
        Ok(())
    }
}

/// Build the session layer: `HttpOnly`, `SameSite=Strict`, expiring after
/// `ttl_seconds` of inactivity.
#[must_use]
pub fn session_layer(
    store: BoundedSessionStore,
    config: &NonceConfig,
    secure: bool,
) -> SessionManagerLayer<BoundedSessionStore> {
    let ttl = i64::try_from(config.ttl_seconds.min(MAX_NONCE_TTL_SECS)).unwrap_or(i64::MAX);

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(ttl)))
        .with_secure(secure)
        .with_same_site(SameSite::Strict)
        .with_http_only(true)
        .with_path("/")
}
