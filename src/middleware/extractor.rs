use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::PrivateCookieJar;
use serde_json::Value;

use super::error::AuthError;
use super::state::AuthState;
use crate::session::SessionStore;

/// Authenticated user extracted from the session cookie.
///
/// Use as an Axum extractor in route handlers — this is the "require
/// authentication" guard. Requests without a valid session are rejected with
/// `401 Unauthorized` before the handler runs. An expired session with a
/// refresh token gets one refresh attempt during extraction.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected(user: AuthUser) -> impl IntoResponse {
///     format!("Hello, {}", user.subject)
/// }
///
/// // Optional: accessible to both authenticated and anonymous users
/// async fn public(user: Option<AuthUser>) -> impl IntoResponse {
///     match user {
///         Some(u) => format!("Hello, {}", u.subject),
///         None => "Hello, guest".to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Session key (from the cookie).
    pub session_key: String,
    /// The ID token's `sub` claim.
    pub subject: String,
    /// Cached userinfo claims, falling back to the ID token's claims.
    pub claims: serde_json::Map<String, Value>,
}

impl<S: SessionStore> FromRequestParts<AuthState<S>> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AuthState<S>,
    ) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar = PrivateCookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthError::Unauthenticated)?;

        let session_key = jar
            .get(&state.settings.session_cookie_name)
            .map(|c| c.value().to_string())
            .ok_or(AuthError::Unauthenticated)?;

        let session = state
            .client
            .resolve_session(state.sessions.as_ref(), &session_key)
            .await?
            .ok_or(AuthError::SessionExpired)?;

        Ok(Self {
            subject: session.tokens.claims.sub.clone(),
            claims: session.claims(),
            session_key,
        })
    }
}
