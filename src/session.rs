//! Session-authentication gate over an injected key/value store.
//!
//! The core never owns session storage. Callers hand in anything that
//! implements [`SessionStore`] — a cookie-encoded map, an external cache, or
//! the bundled [`MemorySessionStore`] — and every gate operation takes the
//! store explicitly.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::client::Client;
use crate::error::SessionError;
use crate::token::TokenSet;

/// Boxed error for store implementations.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// One authenticated session: the validated token set plus cached user-info
/// claims. Written only after a fully validated exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct AuthSession {
    pub tokens: TokenSet,
    pub user_info: serde_json::Map<String, Value>,
}

impl AuthSession {
    #[must_use]
    pub fn new(tokens: TokenSet, user_info: serde_json::Map<String, Value>) -> Self {
        Self { tokens, user_info }
    }

    /// The user's claims: cached userinfo when present, otherwise the ID
    /// token's claims.
    #[must_use]
    pub fn claims(&self) -> serde_json::Map<String, Value> {
        if self.user_info.is_empty() {
            self.tokens.claims.to_map()
        } else {
            self.user_info.clone()
        }
    }
}

/// Consumer-provided session persistence.
///
/// At most one [`AuthSession`] exists per session key. The crate places no
/// constraint on the backing implementation.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for MyRedisStore {
///     async fn get(&self, key: &str) -> Result<Option<AuthSession>, StoreError> {
///         let raw: Option<Vec<u8>> = self.conn.get(key).await?;
///         raw.map(|b| serde_json::from_slice(&b)).transpose().map_err(Into::into)
///     }
///     // set / delete analogous
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Look up the session for `key`.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<AuthSession>, StoreError>> + Send;

    /// Write (or replace) the session for `key`.
    fn set(
        &self,
        key: &str,
        session: AuthSession,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove the session for `key`, if any.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

// Shared handles delegate, so one store can back several routers.
impl<T: SessionStore> SessionStore for Arc<T> {
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<AuthSession>, StoreError>> + Send {
        T::get(self, key)
    }

    fn set(
        &self,
        key: &str,
        session: AuthSession,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        T::set(self, key, session)
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send {
        T::delete(self, key)
    }
}

/// In-memory [`SessionStore`] for tests, examples and single-process apps.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, AuthSession>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<AuthSession>, StoreError> {
        Ok(self.sessions.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, session: AuthSession) -> Result<(), StoreError> {
        self.sessions.write().await.insert(key.to_owned(), session);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(key);
        Ok(())
    }
}

/// Whether `key` maps to a present, non-expired session. No network calls;
/// an expired-but-refreshable session still reports `false` here — use
/// [`Client::resolve_session`] for the refresh path.
pub async fn is_authenticated<S: SessionStore>(store: &S, key: &str) -> bool {
    match store.get(key).await {
        Ok(Some(session)) => !session.tokens.is_expired(),
        Ok(None) => false,
        Err(e) => {
            tracing::debug!(error = %e, "session lookup failed");
            false
        }
    }
}

/// The authenticated user's claims.
///
/// # Errors
///
/// Returns [`SessionError::NotAuthenticated`] for a missing or expired
/// session, [`SessionError::Store`] when the store itself fails.
pub async fn current_user<S: SessionStore>(
    store: &S,
    key: &str,
) -> Result<serde_json::Map<String, Value>, SessionError> {
    let session = store
        .get(key)
        .await
        .map_err(|e| SessionError::Store(e.to_string()))?
        .ok_or(SessionError::NotAuthenticated)?;
    if session.tokens.is_expired() {
        return Err(SessionError::NotAuthenticated);
    }
    Ok(session.claims())
}

impl Client {
    /// Resolve a session for a protected request, with one refresh attempt.
    ///
    /// A fresh session passes straight through. An expired session with a
    /// refresh token gets exactly one refresh-grant attempt: success writes
    /// the new tokens back, failure deletes the record. Either way the
    /// outcome is unambiguous — `Some` means authenticated, `None` means the
    /// session is gone.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] only for store failures; provider
    /// refresh failures degrade to `Ok(None)`.
    pub async fn resolve_session<S: SessionStore>(
        &self,
        store: &S,
        key: &str,
    ) -> Result<Option<AuthSession>, SessionError> {
        let Some(mut session) = store
            .get(key)
            .await
            .map_err(|e| SessionError::Store(e.to_string()))?
        else {
            return Ok(None);
        };

        if !session.tokens.is_expired() {
            return Ok(Some(session));
        }
        if session.tokens.refresh_token.is_none() {
            let _ = store.delete(key).await;
            return Ok(None);
        }

        match self.refresh(&session.tokens).await {
            Ok(tokens) => {
                session.tokens = tokens;
                store
                    .set(key, session.clone())
                    .await
                    .map_err(|e| SessionError::Store(e.to_string()))?;
                tracing::debug!("session tokens refreshed");
                Ok(Some(session))
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed, dropping session");
                let _ = store.delete(key).await;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Audience, IdClaims};
    use serde_json::json;
    use time::{Duration, OffsetDateTime};

    fn token_set(expires_in: Option<Duration>, refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: "at-1".into(),
            token_type: "Bearer".into(),
            expires_at: expires_in.map(|d| OffsetDateTime::now_utc() + d),
            refresh_token: refresh.map(str::to_owned),
            id_token: "id-token".into(),
            claims: IdClaims {
                iss: "https://id.example.com".into(),
                sub: "user-1".into(),
                aud: Audience::One("test-client".into()),
                exp: (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp(),
                iat: OffsetDateTime::now_utc().unix_timestamp(),
                nonce: None,
                extra: serde_json::Map::new(),
            },
        }
    }

    fn object(value: serde_json::Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn empty_store_is_unauthenticated() {
        let store = MemorySessionStore::new();
        assert!(!is_authenticated(&store, "nobody").await);
        assert!(matches!(
            current_user(&store, "nobody").await,
            Err(SessionError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn fresh_session_is_authenticated() {
        let store = MemorySessionStore::new();
        let session = AuthSession::new(
            token_set(Some(Duration::hours(1)), None),
            serde_json::Map::new(),
        );
        store.set("sess-1", session).await.unwrap();

        assert!(is_authenticated(&store, "sess-1").await);
    }

    #[tokio::test]
    async fn expired_session_is_unauthenticated() {
        let store = MemorySessionStore::new();
        let session = AuthSession::new(
            token_set(Some(Duration::seconds(-5)), None),
            serde_json::Map::new(),
        );
        store.set("sess-1", session).await.unwrap();

        assert!(!is_authenticated(&store, "sess-1").await);
        assert!(matches!(
            current_user(&store, "sess-1").await,
            Err(SessionError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn current_user_prefers_cached_userinfo() {
        let store = MemorySessionStore::new();
        let session = AuthSession::new(
            token_set(Some(Duration::hours(1)), None),
            object(json!({ "sub": "user-1", "name": "Kim" })),
        );
        store.set("sess-1", session).await.unwrap();

        let claims = current_user(&store, "sess-1").await.unwrap();
        assert_eq!(claims.get("name").and_then(Value::as_str), Some("Kim"));
    }

    #[tokio::test]
    async fn current_user_falls_back_to_id_claims() {
        let store = MemorySessionStore::new();
        let session = AuthSession::new(
            token_set(Some(Duration::hours(1)), None),
            serde_json::Map::new(),
        );
        store.set("sess-1", session).await.unwrap();

        let claims = current_user(&store, "sess-1").await.unwrap();
        assert_eq!(claims.get("sub").and_then(Value::as_str), Some("user-1"));
    }

    #[tokio::test]
    async fn sessions_without_expiry_stay_valid() {
        let store = MemorySessionStore::new();
        let session = AuthSession::new(token_set(None, None), serde_json::Map::new());
        store.set("sess-1", session).await.unwrap();

        assert!(is_authenticated(&store, "sess-1").await);
    }

    #[tokio::test]
    async fn memory_store_delete_removes() {
        let store = MemorySessionStore::new();
        let session = AuthSession::new(
            token_set(Some(Duration::hours(1)), None),
            serde_json::Map::new(),
        );
        store.set("sess-1", session).await.unwrap();
        assert_eq!(store.len().await, 1);

        store.delete("sess-1").await.unwrap();
        assert!(store.is_empty().await);
        assert!(!is_authenticated(&store, "sess-1").await);
    }
}
