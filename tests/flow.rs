//! Full-flow tests against a mocked provider: login round trip, replay and
//! validation failures, refresh-on-expiry, and discovery behavior under
//! concurrency.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::json;
use time::OffsetDateTime;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oidc_flow::{
    AuthSession, Client, Config, Intent, MemorySessionStore, SessionStore, StateError, TokenError,
    ValidationFailure, current_user, is_authenticated,
};

const CLIENT_ID: &str = "test-client";
const CLIENT_SECRET: &str = "test-secret";

async fn provider() -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": base,
            "authorization_endpoint": format!("{base}/authorize"),
            "token_endpoint": format!("{base}/token"),
            "userinfo_endpoint": format!("{base}/userinfo"),
            "end_session_endpoint": format!("{base}/end-session"),
            "jwks_uri": format!("{base}/jwks"),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [] })))
        .mount(&server)
        .await;
    server
}

fn client_for(server: &MockServer) -> Client {
    let config = Config::new(
        CLIENT_ID,
        CLIENT_SECRET,
        "https://app.example.com/auth/callback".parse().unwrap(),
        format!("{}/.well-known/openid-configuration", server.uri())
            .parse()
            .unwrap(),
    )
    .unwrap();
    Client::new(config).unwrap()
}

fn sign_id_token(issuer: &str, aud: &str, nonce: &str) -> String {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    encode(
        &Header::new(Algorithm::HS256),
        &json!({
            "iss": issuer,
            "sub": "user-1",
            "aud": aud,
            "exp": now + 3600,
            "iat": now,
            "nonce": nonce,
            "email": "user@example.com",
        }),
        &EncodingKey::from_secret(CLIENT_SECRET.as_bytes()),
    )
    .unwrap()
}

async fn mount_token_endpoint(server: &MockServer, id_token: &str, expires_in: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "token_type": "Bearer",
            "expires_in": expires_in,
            "refresh_token": "refresh-1",
            "id_token": id_token,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_round_trip_authenticates_the_session() {
    let server = provider().await;
    let client = client_for(&server);
    let sessions = MemorySessionStore::new();

    // Outbound redirect
    let auth = client
        .authorization_url(Intent::Login, "/dashboard")
        .await
        .unwrap();
    assert!(auth.url.as_str().contains("state="));

    // The provider will bind the flow's nonce into the ID token.
    mount_token_endpoint(&server, &sign_id_token(&server.uri(), CLIENT_ID, &auth.nonce), 3600)
        .await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "user-1",
            "name": "Kim",
        })))
        .mount(&server)
        .await;

    // Simulated callback
    let outcome = client.exchange("abc123", &auth.state).await.unwrap();
    assert_eq!(outcome.return_to, "/dashboard");
    assert_eq!(outcome.intent, Intent::Login);
    assert_eq!(outcome.tokens.claims.sub, "user-1");
    assert!(outcome.tokens.expires_at.unwrap() > OffsetDateTime::now_utc());

    let user_info = client
        .userinfo(&outcome.tokens.access_token)
        .await
        .unwrap();
    sessions
        .set("sess-1", AuthSession::new(outcome.tokens, user_info))
        .await
        .unwrap();

    assert!(is_authenticated(&sessions, "sess-1").await);
    let claims = current_user(&sessions, "sess-1").await.unwrap();
    assert_eq!(claims.get("name").and_then(|v| v.as_str()), Some("Kim"));
}

#[tokio::test]
async fn replayed_state_fails_closed() {
    let server = provider().await;
    let client = client_for(&server);

    let auth = client.authorization_url(Intent::Login, "/").await.unwrap();
    mount_token_endpoint(&server, &sign_id_token(&server.uri(), CLIENT_ID, &auth.nonce), 3600)
        .await;

    client.exchange("abc123", &auth.state).await.unwrap();
    let replay = client.exchange("abc123", &auth.state).await;
    assert!(matches!(
        replay,
        Err(TokenError::InvalidState(StateError::AlreadyConsumed))
    ));
}

#[tokio::test]
async fn nonce_mismatch_returns_no_tokens() {
    let server = provider().await;
    let client = client_for(&server);
    let sessions = MemorySessionStore::new();

    let auth = client.authorization_url(Intent::Login, "/").await.unwrap();
    mount_token_endpoint(
        &server,
        &sign_id_token(&server.uri(), CLIENT_ID, "replayed-nonce"),
        3600,
    )
    .await;

    let result = client.exchange("abc123", &auth.state).await;
    match result {
        Err(TokenError::InvalidToken(reason)) => {
            assert_eq!(reason, ValidationFailure::NonceMismatch);
        }
        other => panic!("expected InvalidToken, got {other:?}"),
    }
    assert!(sessions.is_empty().await);
    assert!(!is_authenticated(&sessions, "sess-1").await);
}

#[tokio::test]
async fn wrong_audience_rejected_matching_audience_accepted() {
    let server = provider().await;
    let client = client_for(&server);

    let auth = client.authorization_url(Intent::Login, "/").await.unwrap();
    mount_token_endpoint(
        &server,
        &sign_id_token(&server.uri(), "another-client", &auth.nonce),
        3600,
    )
    .await;
    let result = client.exchange("abc123", &auth.state).await;
    assert!(matches!(
        result,
        Err(TokenError::InvalidToken(
            ValidationFailure::AudienceMismatch
        ))
    ));

    // Same flow shape with the right audience succeeds.
    server.reset().await;
    let server2 = provider().await;
    let client = client_for(&server2);
    let auth = client.authorization_url(Intent::Login, "/").await.unwrap();
    mount_token_endpoint(
        &server2,
        &sign_id_token(&server2.uri(), CLIENT_ID, &auth.nonce),
        3600,
    )
    .await;
    let outcome = client.exchange("abc123", &auth.state).await.unwrap();
    assert!(outcome.tokens.expires_at.unwrap() > OffsetDateTime::now_utc());
}

#[tokio::test]
async fn unreachable_provider_fails_every_intent() {
    let config = Config::new(
        CLIENT_ID,
        CLIENT_SECRET,
        "https://app.example.com/auth/callback".parse().unwrap(),
        // Nothing listens here; discovery must fail, not degrade.
        "http://127.0.0.1:9/.well-known/openid-configuration"
            .parse()
            .unwrap(),
    )
    .unwrap();
    let client = Client::new(config).unwrap();

    for intent in [Intent::Login, Intent::Register, Intent::Profile] {
        assert!(client.authorization_url(intent, "/").await.is_err());
    }
    assert!(client.logout_url(None, None).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cold_cache_discovery_is_single_flight() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": base,
            "authorization_endpoint": format!("{base}/authorize"),
            "token_endpoint": format!("{base}/token"),
            "userinfo_endpoint": format!("{base}/userinfo"),
            "end_session_endpoint": format!("{base}/end-session"),
            "jwks_uri": format!("{base}/jwks"),
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(client_for(&server));

    let mut handles = Vec::new();
    for i in 0..50 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .authorization_url(Intent::Login, format!("/page-{i}"))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    // MockServer verifies expect(1) on drop.
}

#[tokio::test]
async fn expired_session_refreshes_once_and_recovers() {
    let server = provider().await;
    let client = client_for(&server);
    let sessions = MemorySessionStore::new();

    let auth = client.authorization_url(Intent::Login, "/").await.unwrap();
    // expires_in 0: the access token is already stale when stored.
    mount_token_endpoint(&server, &sign_id_token(&server.uri(), CLIENT_ID, &auth.nonce), 0).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    let outcome = client.exchange("abc123", &auth.state).await.unwrap();
    sessions
        .set(
            "sess-1",
            AuthSession::new(outcome.tokens, serde_json::Map::new()),
        )
        .await
        .unwrap();
    assert!(!is_authenticated(&sessions, "sess-1").await);

    let resolved = client
        .resolve_session(&sessions, "sess-1")
        .await
        .unwrap()
        .expect("session should survive via refresh");
    assert_eq!(resolved.tokens.access_token, "access-2");
    // The provider sent no rotated refresh token; the old one carries over.
    assert_eq!(resolved.tokens.refresh_token.as_deref(), Some("refresh-1"));
    assert!(is_authenticated(&sessions, "sess-1").await);
}

#[tokio::test]
async fn failed_refresh_drops_the_session() {
    let server = provider().await;
    let client = client_for(&server);
    let sessions = MemorySessionStore::new();

    let auth = client.authorization_url(Intent::Login, "/").await.unwrap();
    mount_token_endpoint(&server, &sign_id_token(&server.uri(), CLIENT_ID, &auth.nonce), 0).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
        })))
        .mount(&server)
        .await;

    let outcome = client.exchange("abc123", &auth.state).await.unwrap();
    sessions
        .set(
            "sess-1",
            AuthSession::new(outcome.tokens, serde_json::Map::new()),
        )
        .await
        .unwrap();

    let resolved = client.resolve_session(&sessions, "sess-1").await.unwrap();
    assert!(resolved.is_none());
    assert!(sessions.is_empty().await);
    assert!(!is_authenticated(&sessions, "sess-1").await);
}

#[tokio::test]
async fn expired_session_without_refresh_token_stays_logged_out() {
    let server = provider().await;
    let client = client_for(&server);
    let sessions = MemorySessionStore::new();

    let auth = client.authorization_url(Intent::Login, "/").await.unwrap();
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "token_type": "Bearer",
            "expires_in": 0,
            "id_token": sign_id_token(&server.uri(), CLIENT_ID, &auth.nonce),
        })))
        .mount(&server)
        .await;

    let outcome = client.exchange("abc123", &auth.state).await.unwrap();
    assert!(outcome.tokens.refresh_token.is_none());
    sessions
        .set(
            "sess-1",
            AuthSession::new(outcome.tokens, serde_json::Map::new()),
        )
        .await
        .unwrap();

    let resolved = client.resolve_session(&sessions, "sess-1").await.unwrap();
    assert!(resolved.is_none());
    assert!(sessions.is_empty().await);
}
