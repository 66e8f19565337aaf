//! Provider metadata discovery and caching.
//!
//! Fetches the OIDC discovery document and the signing-key set it points at,
//! then serves both from memory. A fetch gate guarantees at most one outbound
//! fetch is in flight per cache instance, however many requests land on a
//! cold cache at once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::error::DiscoveryError;

/// Provider metadata from the `.well-known/openid-configuration` document.
///
/// All endpoint fields are required; a document missing any of them is
/// rejected as malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub userinfo_endpoint: Url,
    pub end_session_endpoint: Url,
    pub jwks_uri: Url,
}

/// JSON Web Key Set published at the provider's `jwks_uri`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Find a key by its key ID.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

/// A single published signing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(rename = "use", default)]
    pub use_: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    /// RSA modulus, base64url.
    #[serde(default)]
    pub n: String,
    /// RSA public exponent, base64url.
    #[serde(default)]
    pub e: String,
}

#[derive(Clone)]
struct CachedProvider {
    metadata: Arc<ProviderMetadata>,
    keys: Arc<JwkSet>,
    fetched_at: OffsetDateTime,
}

/// Caching fetcher for provider metadata and signing keys.
pub struct DiscoveryCache {
    http: reqwest::Client,
    discovery_url: Url,
    freshness: Option<Duration>,
    cached: RwLock<Option<CachedProvider>>,
    fetch_gate: Mutex<()>,
}

const RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_millis(250);

impl DiscoveryCache {
    /// `freshness: None` caches indefinitely (until [`invalidate`] or a key
    /// refresh); `Some(window)` re-fetches once cached data is older than the
    /// window.
    ///
    /// [`invalidate`]: DiscoveryCache::invalidate
    #[must_use]
    pub fn new(http: reqwest::Client, discovery_url: Url, freshness: Option<Duration>) -> Self {
        Self {
            http,
            discovery_url,
            freshness,
            cached: RwLock::new(None),
            fetch_gate: Mutex::new(()),
        }
    }

    /// Provider metadata, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if the metadata document is unreachable,
    /// malformed, or missing required endpoint fields.
    pub async fn metadata(&self) -> Result<Arc<ProviderMetadata>, DiscoveryError> {
        Ok(self.provider().await?.metadata)
    }

    /// The provider's current signing keys, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`metadata`](DiscoveryCache::metadata).
    pub async fn keys(&self) -> Result<Arc<JwkSet>, DiscoveryError> {
        Ok(self.provider().await?.keys)
    }

    /// Force-refresh after observing a stale key set (key rotation).
    ///
    /// Re-fetches at most once per key-set generation: if another caller
    /// already replaced `observed`, the replacement is returned without a
    /// second fetch.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if the re-fetch fails.
    pub async fn refresh_keys(&self, observed: &Arc<JwkSet>) -> Result<Arc<JwkSet>, DiscoveryError> {
        let _gate = self.fetch_gate.lock().await;
        if let Some(current) = self.cached.read().await.clone() {
            if !Arc::ptr_eq(&current.keys, observed) {
                return Ok(current.keys);
            }
        }
        tracing::debug!("refreshing provider signing keys");
        let fetched = self.fetch_with_retry().await?;
        let keys = fetched.keys.clone();
        *self.cached.write().await = Some(fetched);
        Ok(keys)
    }

    /// Drop the cached document; the next call re-fetches.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn provider(&self) -> Result<CachedProvider, DiscoveryError> {
        if let Some(cached) = self.fresh().await {
            return Ok(cached);
        }
        // Single-flight: first caller through fetches, the rest block here
        // and find the cache populated on re-check.
        let _gate = self.fetch_gate.lock().await;
        if let Some(cached) = self.fresh().await {
            return Ok(cached);
        }
        let fetched = self.fetch_with_retry().await?;
        *self.cached.write().await = Some(fetched.clone());
        Ok(fetched)
    }

    async fn fresh(&self) -> Option<CachedProvider> {
        let guard = self.cached.read().await;
        let cached = guard.as_ref()?;
        match self.freshness {
            Some(window) if OffsetDateTime::now_utc() - cached.fetched_at > window => None,
            _ => Some(cached.clone()),
        }
    }

    async fn fetch_with_retry(&self) -> Result<CachedProvider, DiscoveryError> {
        match self.fetch().await {
            Err(e) if is_transient(&e) => {
                tracing::warn!(error = %e, "discovery fetch failed, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.fetch().await
            }
            other => other,
        }
    }

    async fn fetch(&self) -> Result<CachedProvider, DiscoveryError> {
        let response = self.http.get(self.discovery_url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Status {
                status: response.status().as_u16(),
            });
        }
        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Malformed(e.to_string()))?;
        validate_metadata(&metadata)?;

        let response = self.http.get(metadata.jwks_uri.clone()).send().await?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Status {
                status: response.status().as_u16(),
            });
        }
        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Malformed(e.to_string()))?;

        tracing::debug!(issuer = %metadata.issuer, keys = keys.keys.len(), "provider metadata fetched");

        Ok(CachedProvider {
            metadata: Arc::new(metadata),
            keys: Arc::new(keys),
            fetched_at: OffsetDateTime::now_utc(),
        })
    }
}

fn validate_metadata(metadata: &ProviderMetadata) -> Result<(), DiscoveryError> {
    let endpoints = [
        ("authorization_endpoint", &metadata.authorization_endpoint),
        ("token_endpoint", &metadata.token_endpoint),
        ("userinfo_endpoint", &metadata.userinfo_endpoint),
        ("end_session_endpoint", &metadata.end_session_endpoint),
        ("jwks_uri", &metadata.jwks_uri),
    ];
    for (name, url) in endpoints {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DiscoveryError::Malformed(format!(
                "{name} is not an http(s) URL: {url}"
            )));
        }
    }
    if metadata.issuer.is_empty() {
        return Err(DiscoveryError::Malformed("issuer is empty".into()));
    }
    Ok(())
}

fn is_transient(error: &DiscoveryError) -> bool {
    match error {
        DiscoveryError::Fetch(e) => e.is_timeout() || e.is_connect(),
        DiscoveryError::Status { status } => *status >= 500,
        DiscoveryError::Malformed(_) => false,
    }
}
