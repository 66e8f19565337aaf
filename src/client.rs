//! The relying-party client: authorization URLs, the code-for-tokens
//! exchange, the refresh grant, and userinfo.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::config::Config;
use crate::discovery::{DiscoveryCache, JwkSet};
use crate::error::{ConfigError, DiscoveryError, TokenError, UserInfoError, ValidationFailure};
use crate::flow::{FlowStore, Intent};
use crate::token::{IdClaims, TokenResponse, TokenSet, verify_id_token};

/// Authorization redirect target plus the flow tokens bound to it.
///
/// The flow state is tracked internally; callers only need `url`. The `state`
/// and `nonce` are exposed for logging and tests.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
    pub nonce: String,
}

/// Result of a completed code exchange: validated tokens plus the routing
/// context of the flow that initiated it.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CompletedFlow {
    pub tokens: TokenSet,
    pub intent: Intent,
    pub return_to: String,
}

/// OIDC Authorization Code flow client for a single provider.
pub struct Client {
    config: Config,
    http: reqwest::Client,
    discovery: DiscoveryCache,
    flows: FlowStore,
}

impl Client {
    /// Build a client from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;
        let discovery = DiscoveryCache::new(
            http.clone(),
            config.discovery_url.clone(),
            config.discovery_ttl,
        );
        let flows = FlowStore::new(config.flow_ttl);
        Ok(Self {
            config,
            http,
            discovery,
            flows,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared metadata cache, for explicit invalidation.
    #[must_use]
    pub fn discovery(&self) -> &DiscoveryCache {
        &self.discovery
    }

    /// Build an authorization redirect for the given intent, registering a
    /// single-use flow for its callback.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if provider metadata is unavailable; no
    /// partial URL is ever returned.
    pub async fn authorization_url(
        &self,
        intent: Intent,
        return_to: impl Into<String>,
    ) -> Result<AuthorizationRequest, DiscoveryError> {
        let metadata = self.discovery.metadata().await?;
        let flow = self.flows.issue(intent, return_to).await;
        let scope = self.config.scopes.join(" ");

        let mut url = metadata.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("state", &flow.state)
            .append_pair("nonce", &flow.nonce)
            .append_pair(&self.config.intent_param, self.config.intent_value(intent));

        tracing::debug!(%intent, state = %flow.state, "authorization redirect issued");

        Ok(AuthorizationRequest {
            url,
            state: flow.state,
            nonce: flow.nonce,
        })
    }

    /// Build the provider's end-session redirect. No flow is issued: logout
    /// returns no code.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if provider metadata is unavailable.
    pub async fn logout_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect: Option<&Url>,
    ) -> Result<Url, DiscoveryError> {
        let metadata = self.discovery.metadata().await?;
        let mut url = metadata.end_session_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
            if let Some(target) = post_logout_redirect {
                query.append_pair("post_logout_redirect_uri", target.as_str());
            }
        }
        Ok(url)
    }

    /// Exchange an authorization code for validated tokens.
    ///
    /// Consumes the flow for `state` first; a replayed, expired or unknown
    /// state fails before any network traffic. On any validation failure no
    /// tokens are returned.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] — see its variants for the failure classes.
    pub async fn exchange(&self, code: &str, state: &str) -> Result<CompletedFlow, TokenError> {
        let flow = self
            .flows
            .consume(state)
            .await
            .map_err(TokenError::InvalidState)?;

        let metadata = self.discovery.metadata().await?;
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(metadata.token_endpoint.clone())
            .form(&params)
            .send()
            .await?;
        let wire = Self::read_token_response(response).await?;

        let id_token = wire
            .id_token
            .as_deref()
            .ok_or_else(|| TokenError::MalformedResponse("response has no id_token".into()))?;
        let claims = self
            .verify_with_rotation(id_token, Some(&flow.nonce))
            .await?;

        tracing::info!(sub = %claims.sub, intent = %flow.intent, "token exchange completed");

        Ok(CompletedFlow {
            tokens: Self::assemble(&wire, claims),
            intent: flow.intent,
            return_to: flow.return_to,
        })
    }

    /// One refresh-grant attempt for an expired token set.
    ///
    /// A returned ID token is validated (without nonce binding — there is no
    /// flow); if the provider omits one, the current claims carry over.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::MissingParameter`] when `current` holds no
    /// refresh token, otherwise the exchange failure classes.
    pub async fn refresh(&self, current: &TokenSet) -> Result<TokenSet, TokenError> {
        let refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or(TokenError::MissingParameter("refresh_token"))?;

        let metadata = self.discovery.metadata().await?;
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(metadata.token_endpoint.clone())
            .form(&params)
            .send()
            .await?;
        let wire = Self::read_token_response(response).await?;

        let (id_token, claims) = match wire.id_token.as_deref() {
            Some(id_token) => {
                let claims = self.verify_with_rotation(id_token, None).await?;
                (id_token.to_owned(), claims)
            }
            None => (current.id_token.clone(), current.claims.clone()),
        };

        let mut tokens = Self::assemble(&wire, claims);
        tokens.id_token = id_token;
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = current.refresh_token.clone();
        }
        Ok(tokens)
    }

    /// Fetch claims from the userinfo endpoint with a bearer credential.
    ///
    /// # Errors
    ///
    /// Returns [`UserInfoError`] on non-success responses or payloads that
    /// are not a JSON object.
    pub async fn userinfo(
        &self,
        access_token: &str,
    ) -> Result<serde_json::Map<String, Value>, UserInfoError> {
        let metadata = self.discovery.metadata().await?;
        let response = self
            .http
            .get(metadata.userinfo_endpoint.clone())
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(UserInfoError::Status { status, detail });
        }
        response
            .json()
            .await
            .map_err(|e| UserInfoError::Malformed(e.to_string()))
    }

    /// Validate an ID token, re-fetching the key set once when the token
    /// names a key we do not hold (key rotation).
    async fn verify_with_rotation(
        &self,
        id_token: &str,
        expected_nonce: Option<&str>,
    ) -> Result<IdClaims, TokenError> {
        let metadata = self.discovery.metadata().await?;
        let keys = self.discovery.keys().await?;
        match self.verify(id_token, &keys, &metadata.issuer, expected_nonce) {
            Err(ValidationFailure::UnknownKey(kid)) => {
                tracing::debug!(kid = %kid, "ID token names an unknown signing key, refreshing keys");
                let keys = self.discovery.refresh_keys(&keys).await?;
                self.verify(id_token, &keys, &metadata.issuer, expected_nonce)
                    .map_err(TokenError::InvalidToken)
            }
            other => other.map_err(TokenError::InvalidToken),
        }
    }

    fn verify(
        &self,
        id_token: &str,
        keys: &Arc<JwkSet>,
        issuer: &str,
        expected_nonce: Option<&str>,
    ) -> Result<IdClaims, ValidationFailure> {
        verify_id_token(
            id_token,
            keys,
            issuer,
            &self.config.client_id,
            &self.config.client_secret,
            expected_nonce,
            self.config.clock_skew,
        )
    }

    async fn read_token_response(response: reqwest::Response) -> Result<TokenResponse, TokenError> {
        if !response.status().is_success() {
            return Err(Self::exchange_error(response).await);
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| TokenError::MalformedResponse(e.to_string()))
    }

    /// Extracts the provider's OAuth error code/description when present.
    async fn exchange_error(response: reqwest::Response) -> TokenError {
        #[derive(Deserialize, Default)]
        struct ErrorBody {
            error: Option<String>,
            error_description: Option<String>,
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let description = parsed
            .error_description
            .or_else(|| (!body.is_empty()).then_some(body));
        TokenError::ExchangeFailed {
            status,
            code: parsed.error,
            description,
        }
    }

    fn assemble(wire: &TokenResponse, claims: IdClaims) -> TokenSet {
        TokenSet {
            access_token: wire.access_token.clone(),
            token_type: wire.token_type.clone(),
            expires_at: wire
                .expires_in
                .map(|secs| OffsetDateTime::now_utc() + Duration::seconds(secs as i64)),
            refresh_token: wire.refresh_token.clone(),
            id_token: wire.id_token.clone().unwrap_or_default(),
            claims,
        }
    }
}
