//! In-flight redirect flows: CSRF `state` and replay `nonce` management.
//!
//! One [`FlowState`] exists per outstanding redirect to the provider. The
//! callback must consume it exactly once; anything else fails closed.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use crate::error::StateError;

/// Which provider UI the redirect should land on.
///
/// The three intents share one authorization endpoint and one code-exchange
/// mechanism; they differ only in the hint parameter appended to the
/// authorization URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Login,
    Register,
    Profile,
}

impl Intent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::Profile => "profile",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generates a cryptographically random URL-safe token.
///
/// Returns a 22-character string (16 random bytes → base64url, 128 bits of
/// entropy).
#[must_use]
pub fn random_token() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// State held for one in-flight redirect.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct FlowState {
    /// Opaque CSRF token round-tripped through the redirect.
    pub state: String,
    /// Replay token bound into the ID token's claims by the provider.
    pub nonce: String,
    pub intent: Intent,
    /// Where the user originally wanted to go.
    pub return_to: String,
    pub created_at: OffsetDateTime,
}

/// Pending-flow store keyed by state token.
///
/// `consume` is an atomic remove-and-return, so two callbacks racing the same
/// state token cannot both succeed. Consumed tokens leave a tombstone for one
/// TTL window so a replay is reported as [`StateError::AlreadyConsumed`]
/// rather than [`StateError::Unknown`].
pub struct FlowStore {
    ttl: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    pending: HashMap<String, FlowState>,
    consumed: HashMap<String, OffsetDateTime>,
}

impl FlowStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                consumed: HashMap::new(),
            }),
        }
    }

    /// Create and register a new flow for the given intent.
    pub async fn issue(&self, intent: Intent, return_to: impl Into<String>) -> FlowState {
        let flow = FlowState {
            state: random_token(),
            nonce: random_token(),
            intent,
            return_to: return_to.into(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.insert(flow.clone()).await;
        flow
    }

    pub(crate) async fn insert(&self, flow: FlowState) {
        let mut inner = self.inner.lock().await;
        purge(&mut inner, self.ttl);
        inner.pending.insert(flow.state.clone(), flow);
    }

    /// Atomically remove and return the flow for `state`.
    ///
    /// # Errors
    ///
    /// - [`StateError::Unknown`] if no such flow was issued here
    /// - [`StateError::AlreadyConsumed`] on a second consume of the same token
    /// - [`StateError::Expired`] if the flow outlived the TTL, even unused
    pub async fn consume(&self, state: &str) -> Result<FlowState, StateError> {
        let now = OffsetDateTime::now_utc();
        let mut inner = self.inner.lock().await;
        match inner.pending.remove(state) {
            Some(flow) => {
                inner.consumed.insert(state.to_owned(), now);
                if now - flow.created_at > self.ttl {
                    Err(StateError::Expired)
                } else {
                    Ok(flow)
                }
            }
            None if inner.consumed.contains_key(state) => Err(StateError::AlreadyConsumed),
            None => Err(StateError::Unknown),
        }
    }

    /// Number of flows currently awaiting a callback.
    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }
}

fn purge(inner: &mut Inner, ttl: Duration) {
    let now = OffsetDateTime::now_utc();
    inner.pending.retain(|_, flow| now - flow.created_at <= ttl);
    inner.consumed.retain(|_, at| now - *at <= ttl);
}
