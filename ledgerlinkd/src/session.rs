use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ledgerlink_core::{AccessTokenExchange, SyncCursor};
use rand::Rng;
use tokio::sync::RwLock;

/// Opaque handle a client presents in the `x-session-id` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let bits: u128 = rand::thread_rng().r#gen();
        Self(format!("{bits:032x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the proxy remembers about one linked item.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionState {
    pub access_token: String,
    pub item_id: String,
    pub transactions_cursor: SyncCursor,
    pub asset_report_token: Option<String>,
}

impl SessionState {
    pub fn from_exchange(exchange: &AccessTokenExchange) -> Self {
        Self {
            access_token: exchange.access_token.clone(),
            item_id: exchange.item_id.clone(),
            transactions_cursor: SyncCursor::Start,
            asset_report_token: None,
        }
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("access_token", &"<redacted>")
            .field("item_id", &self.item_id)
            .field("transactions_cursor", &self.transactions_cursor)
            .field("asset_report_token", &self.asset_report_token.is_some())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionId, SessionState>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, state: SessionState) -> SessionId {
        let mut sessions = self.inner.write().await;
        let mut id = SessionId::generate();
        while sessions.contains_key(&id) {
            id = SessionId::generate();
        }
        sessions.insert(id.clone(), state);
        id
    }

    pub async fn get(&self, id: &SessionId) -> Option<SessionState> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &SessionId) -> Option<SessionState> {
        self.inner.write().await.remove(id)
    }

    pub async fn set_asset_report_token(&self, id: &SessionId, token: String) -> bool {
        match self.inner.write().await.get_mut(id) {
            Some(state) => {
                state.asset_report_token = Some(token);
                true
            }
            None => false,
        }
    }

    /// Moves the session's transactions cursor to `next` only if it still
    /// equals `expected`. Returns whether the cursor was written.
    pub async fn advance_cursor(
        &self,
        id: &SessionId,
        expected: &SyncCursor,
        next: SyncCursor,
    ) -> bool {
        let mut sessions = self.inner.write().await;
        match sessions.get_mut(id) {
            Some(state) if state.transactions_cursor == *expected => {
                state.transactions_cursor = next;
                true
            }
            _ => false,
        }
    }
}
