use time::Duration;
use url::Url;

use crate::error::ConfigError;
use crate::flow::Intent;

/// Relying-party configuration.
///
/// Required fields are constructor parameters; everything else has a sensible
/// default and a `with_*` override. Validation happens once, here — the rest
/// of the crate can assume a well-formed configuration.
///
/// ```rust,ignore
/// use oidc_flow::Config;
///
/// let config = Config::new(
///     "my-client-id",
///     "my-client-secret",
///     "https://my-app.com/auth/callback".parse()?,
///     "https://id.example.com/.well-known/openid-configuration".parse()?,
/// )?
/// .with_scopes(vec!["openid".into(), "email".into()])
/// .with_intent_param("screen");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) redirect_uri: Url,
    pub(crate) discovery_url: Url,
    pub(crate) scopes: Vec<String>,
    pub(crate) intent_param: String,
    pub(crate) intent_login: String,
    pub(crate) intent_register: String,
    pub(crate) intent_profile: String,
    pub(crate) clock_skew: Duration,
    pub(crate) flow_ttl: Duration,
    pub(crate) discovery_ttl: Option<Duration>,
    pub(crate) http_timeout: std::time::Duration,
}

impl Config {
    /// Create a configuration for a confidential client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `client_id` or `client_secret` is empty, or
    /// if either URL is not plain http(s).
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
        discovery_url: Url,
    ) -> Result<Self, ConfigError> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.is_empty() {
            return Err(ConfigError::Missing("client_id"));
        }
        if client_secret.is_empty() {
            return Err(ConfigError::Missing("client_secret"));
        }
        require_http("redirect_uri", &redirect_uri)?;
        require_http("discovery_url", &discovery_url)?;

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            discovery_url,
            scopes: vec!["openid".into(), "profile".into(), "email".into()],
            intent_param: "intent".into(),
            intent_login: "login".into(),
            intent_register: "register".into(),
            intent_profile: "profile".into(),
            clock_skew: Duration::seconds(60),
            flow_ttl: Duration::minutes(10),
            discovery_ttl: None,
            http_timeout: std::time::Duration::from_secs(5),
        })
    }

    /// Create a configuration from environment variables.
    ///
    /// # Required env vars
    /// - `OIDC_CLIENT_ID`
    /// - `OIDC_CLIENT_SECRET`
    /// - `OIDC_REDIRECT_URI` (must be a valid URL)
    /// - `OIDC_DISCOVERY_URL` (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `OIDC_SCOPES`: comma-separated scope list
    /// - `OIDC_INTENT_PARAM`: name of the intent hint query parameter
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if required variables are missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_id = std::env::var("OIDC_CLIENT_ID")
            .map_err(|_| ConfigError::Missing("OIDC_CLIENT_ID"))?;
        let client_secret = std::env::var("OIDC_CLIENT_SECRET")
            .map_err(|_| ConfigError::Missing("OIDC_CLIENT_SECRET"))?;
        let redirect_uri = parse_env_url("OIDC_REDIRECT_URI")?;
        let discovery_url = parse_env_url("OIDC_DISCOVERY_URL")?;

        let mut config = Self::new(client_id, client_secret, redirect_uri, discovery_url)?;

        if let Ok(scopes) = std::env::var("OIDC_SCOPES") {
            config = config.with_scopes(scopes.split(',').map(|s| s.trim().to_string()).collect());
        }
        if let Ok(param) = std::env::var("OIDC_INTENT_PARAM") {
            config = config.with_intent_param(param);
        }

        Ok(config)
    }

    /// Override the requested scopes (default: `["openid", "profile", "email"]`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Override the name of the provider's intent hint query parameter
    /// (default `"intent"`). The parameter is provider-defined, not a
    /// protocol standard.
    #[must_use]
    pub fn with_intent_param(mut self, name: impl Into<String>) -> Self {
        self.intent_param = name.into();
        self
    }

    /// Override the per-intent hint values (defaults: `login`, `register`,
    /// `profile`).
    #[must_use]
    pub fn with_intent_values(
        mut self,
        login: impl Into<String>,
        register: impl Into<String>,
        profile: impl Into<String>,
    ) -> Self {
        self.intent_login = login.into();
        self.intent_register = register.into();
        self.intent_profile = profile.into();
        self
    }

    /// Override the clock-skew allowance for token expiry checks
    /// (default 60 seconds).
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Override how long an in-flight redirect stays redeemable
    /// (default 10 minutes).
    #[must_use]
    pub fn with_flow_ttl(mut self, ttl: Duration) -> Self {
        self.flow_ttl = ttl;
        self
    }

    /// Set a freshness window for cached provider metadata. `None` (the
    /// default) caches indefinitely; the cache can still be refreshed
    /// explicitly or by key rotation.
    #[must_use]
    pub fn with_discovery_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.discovery_ttl = ttl;
        self
    }

    /// Override the timeout applied to every provider HTTP call
    /// (default 5 seconds).
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// OAuth2 redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Provider metadata URL.
    #[must_use]
    pub fn discovery_url(&self) -> &Url {
        &self.discovery_url
    }

    /// Requested scopes.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Name of the intent hint query parameter.
    #[must_use]
    pub fn intent_param(&self) -> &str {
        &self.intent_param
    }

    /// Hint value sent for the given intent.
    #[must_use]
    pub fn intent_value(&self, intent: Intent) -> &str {
        match intent {
            Intent::Login => &self.intent_login,
            Intent::Register => &self.intent_register,
            Intent::Profile => &self.intent_profile,
        }
    }

    /// Clock-skew allowance for expiry validation.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// TTL for in-flight redirect flows.
    #[must_use]
    pub fn flow_ttl(&self) -> Duration {
        self.flow_ttl
    }
}

fn require_http(field: &'static str, url: &Url) -> Result<(), ConfigError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid {
            field,
            message: format!("expected an http(s) URL, got scheme '{other}'"),
        }),
    }
}

fn parse_env_url(var: &'static str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).map_err(|_| ConfigError::Missing(var))?;
    raw.parse().map_err(|e| ConfigError::Invalid {
        field: var,
        message: format!("{e}"),
    })
}
