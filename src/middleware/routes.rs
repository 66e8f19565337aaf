use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum_extra::extract::PrivateCookieJar;
use serde::Deserialize;

use super::config::AuthConfig;
use super::cookies;
use super::state::AuthState;
use crate::flow::{Intent, random_token};
use crate::session::{AuthSession, SessionStore};

/// Create the authentication router.
///
/// Routes are mounted under the configured auth path (default `/auth`):
/// `login`, `register` and `profile` redirect to the provider with the
/// matching intent, `callback` completes the flow, `logout` clears the
/// session and hands off to the provider's end-session endpoint.
pub fn auth_routes<S: SessionStore>(config: AuthConfig, sessions: S) -> Router {
    let auth_path = config.settings.auth_path.clone();

    let state = AuthState {
        client: Arc::new(config.client),
        sessions: Arc::new(sessions),
        settings: config.settings,
    };

    Router::new()
        .route(&format!("{auth_path}/login"), get(login::<S>))
        .route(&format!("{auth_path}/register"), get(register::<S>))
        .route(&format!("{auth_path}/profile"), get(profile::<S>))
        .route(&format!("{auth_path}/callback"), get(callback::<S>))
        .route(
            &format!("{auth_path}/logout"),
            get(logout::<S>).post(logout::<S>),
        )
        .with_state(state)
}

// ── Redirects to the provider ──────────────────────────────────────

#[derive(Deserialize)]
struct RedirectParams {
    return_to: Option<String>,
}

async fn login<S: SessionStore>(
    state: State<AuthState<S>>,
    query: Query<RedirectParams>,
) -> Result<Redirect, Response> {
    begin(state, query, Intent::Login).await
}

async fn register<S: SessionStore>(
    state: State<AuthState<S>>,
    query: Query<RedirectParams>,
) -> Result<Redirect, Response> {
    begin(state, query, Intent::Register).await
}

async fn profile<S: SessionStore>(
    state: State<AuthState<S>>,
    query: Query<RedirectParams>,
) -> Result<Redirect, Response> {
    begin(state, query, Intent::Profile).await
}

async fn begin<S: SessionStore>(
    State(state): State<AuthState<S>>,
    Query(params): Query<RedirectParams>,
    intent: Intent,
) -> Result<Redirect, Response> {
    let return_to = sanitize_return_to(params.return_to);

    let auth_req = state
        .client
        .authorization_url(intent, return_to)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, %intent, "failed to build authorization URL");
            flow_error(&state.settings.error_redirect, "provider_unavailable")
        })?;

    Ok(Redirect::to(auth_req.url.as_str()))
}

/// Only same-site paths survive; everything else falls back to `/` so the
/// provider round trip cannot become an open redirect.
fn sanitize_return_to(raw: Option<String>) -> String {
    match raw {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/".to_string(),
    }
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback<S: SessionStore>(
    State(state): State<AuthState<S>>,
    jar: PrivateCookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(PrivateCookieJar, Redirect), Response> {
    let error_redirect = &state.settings.error_redirect;

    if let Some(error) = &params.error {
        let desc = params.error_description.as_deref().unwrap_or("Unknown error");
        tracing::warn!(error = %error, description = %desc, "provider returned an error");
        return Err(flow_error(error_redirect, error));
    }

    let code = params
        .code
        .ok_or_else(|| flow_error(error_redirect, "missing_code"))?;
    let flow_state = params
        .state
        .ok_or_else(|| flow_error(error_redirect, "missing_state"))?;

    let outcome = state
        .client
        .exchange(&code, &flow_state)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "token exchange failed");
            flow_error(error_redirect, "exchange_failed")
        })?;

    // Userinfo is best-effort: the ID token's claims already authenticate
    // the user.
    let user_info = match state.client.userinfo(&outcome.tokens.access_token).await {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(error = %e, "userinfo request failed, using ID token claims");
            serde_json::Map::new()
        }
    };

    let session_key = random_token();
    let session = AuthSession::new(outcome.tokens, user_info);
    state
        .sessions
        .set(&session_key, session)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "session write failed");
            flow_error(error_redirect, "session_failed")
        })?;

    let session_cookie = cookies::session_cookie(
        &state.settings.session_cookie_name,
        &session_key,
        state.settings.session_ttl_days,
        state.settings.secure_cookies,
    );

    tracing::info!(intent = %outcome.intent, "login flow completed");

    Ok((jar.add(session_cookie), Redirect::to(&outcome.return_to)))
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<S: SessionStore>(
    State(state): State<AuthState<S>>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Redirect) {
    let mut id_token_hint = None;

    if let Some(cookie) = jar.get(&state.settings.session_cookie_name) {
        let session_key = cookie.value().to_string();
        match state.sessions.get(&session_key).await {
            Ok(Some(session)) => id_token_hint = Some(session.tokens.id_token),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "session lookup failed during logout"),
        }
        if let Err(e) = state.sessions.delete(&session_key).await {
            tracing::warn!(error = %e, "session deletion failed during logout");
        }
    }

    let target = match state
        .client
        .logout_url(
            id_token_hint.as_deref(),
            state.settings.post_logout_redirect.as_ref(),
        )
        .await
    {
        Ok(url) => url.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "end-session endpoint unavailable, staying local");
            state.settings.logout_redirect.clone()
        }
    };

    let clear_cookie = cookies::clear_session_cookie(&state.settings.session_cookie_name);
    (jar.remove(clear_cookie), Redirect::to(&target))
}

// ── Helpers ────────────────────────────────────────────────────────

fn flow_error(error_redirect: &str, code: &str) -> Response {
    let encoded = urlencoding::encode(code);
    Redirect::to(&format!("{error_redirect}?error={encoded}")).into_response()
}
