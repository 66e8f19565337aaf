use axum_extra::extract::cookie::Key;
use url::Url;

use super::error::AuthError;
use crate::client::Client;
use crate::config::Config;

/// Shared auth settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct AuthSettings {
    pub(crate) cookie_key: Key,
    pub(crate) session_cookie_name: String,
    pub(crate) session_ttl_days: i64,
    pub(crate) secure_cookies: bool,
    pub(crate) auth_path: String,
    pub(crate) error_redirect: String,
    pub(crate) logout_redirect: String,
    pub(crate) post_logout_redirect: Option<Url>,
}

impl AuthSettings {
    fn defaults() -> Self {
        Self {
            cookie_key: Key::generate(),
            session_cookie_name: "__oidc_session".into(),
            session_ttl_days: 30,
            secure_cookies: true,
            auth_path: "/auth".into(),
            error_redirect: "/login".into(),
            logout_redirect: "/".into(),
            post_logout_redirect: None,
        }
    }
}

/// Middleware configuration: a flow [`Client`] plus cookie and redirect
/// settings.
///
/// Use [`from_env()`](AuthConfig::from_env) for convention-based setup, or
/// [`new()`](AuthConfig::new) with `with_*` methods for full control.
pub struct AuthConfig {
    pub(super) client: Client,
    pub(super) settings: AuthSettings,
}

impl AuthConfig {
    /// Create config with the required flow client.
    ///
    /// All optional fields use sensible defaults. Override with `with_*`
    /// methods.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            settings: AuthSettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// Reads the core variables via [`Config::from_env`], plus:
    /// - `COOKIE_KEY`: session cookie encryption key bytes (at least 64);
    ///   an ephemeral key is generated when unset.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if required variables are missing or
    /// malformed.
    pub fn from_env() -> Result<Self, AuthError> {
        let client = Client::new(Config::from_env()?)?;

        let cookie_key = match std::env::var("COOKIE_KEY") {
            Ok(k) => Key::try_from(k.as_bytes()).map_err(|_| {
                AuthError::Config(
                    "COOKIE_KEY is set but invalid (must be at least 64 bytes). \
                     Remove the env var to use an ephemeral key, or provide a valid key."
                        .into(),
                )
            })?,
            Err(_) => Key::generate(),
        };

        Ok(Self::new(client).with_cookie_key(cookie_key))
    }

    #[must_use]
    pub fn with_cookie_key(mut self, key: Key) -> Self {
        self.settings.cookie_key = key;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_session_ttl_days(mut self, days: i64) -> Self {
        self.settings.session_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    /// Path prefix the auth routes are mounted under (default `/auth`).
    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    /// Local path users land on when a flow fails (default `/login`).
    #[must_use]
    pub fn with_error_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.error_redirect = path.into();
        self
    }

    /// Local fallback path after logout when the provider redirect cannot be
    /// built (default `/`).
    #[must_use]
    pub fn with_logout_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.logout_redirect = path.into();
        self
    }

    /// Absolute URL the provider sends users back to after logout
    /// (`post_logout_redirect_uri`). Omitted from the logout redirect when
    /// unset.
    #[must_use]
    pub fn with_post_logout_redirect(mut self, url: Url) -> Self {
        self.settings.post_logout_redirect = Some(url);
        self
    }
}
