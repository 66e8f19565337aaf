//! Token types and ID token validation.
//!
//! Signature verification supports RS256 against the provider's published
//! JWKS (looked up by `kid`) and HS256 keyed by the client secret. Issuer,
//! audience, expiry (with leeway) and the nonce binding are all enforced
//! before any claims are surfaced.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime};

use crate::discovery::JwkSet;
use crate::error::ValidationFailure;

/// Wire response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// The `aud` claim: a single audience or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    #[must_use]
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Self::One(aud) => aud == client_id,
            Self::Many(auds) => auds.iter().any(|a| a == client_id),
        }
    }
}

/// Validated claims from an ID token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct IdClaims {
    pub iss: String,
    pub sub: String,
    pub aud: Audience,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl IdClaims {
    /// All claims as a flat JSON map (standard claims plus extras).
    #[must_use]
    pub fn to_map(&self) -> serde_json::Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// Tokens from a completed, fully validated exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TokenSet {
    pub access_token: String,
    pub token_type: String,
    /// Access-token expiry, absent when the provider sent no `expires_in`.
    #[serde(default, with = "time::serde::timestamp::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// The raw ID token, kept for `id_token_hint` at logout.
    pub id_token: String,
    pub claims: IdClaims,
}

impl TokenSet {
    /// Whether the access token's lifetime has elapsed. Tokens without an
    /// expiry never expire here.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if at <= OffsetDateTime::now_utc())
    }
}

/// Verify signature, issuer, audience, expiry and (when expected) the nonce
/// binding of an ID token.
pub(crate) fn verify_id_token(
    id_token: &str,
    keys: &JwkSet,
    issuer: &str,
    client_id: &str,
    client_secret: &str,
    expected_nonce: Option<&str>,
    leeway: Duration,
) -> Result<IdClaims, ValidationFailure> {
    let header = decode_header(id_token).map_err(|_| ValidationFailure::Malformed)?;

    let key = match header.alg {
        Algorithm::HS256 => DecodingKey::from_secret(client_secret.as_bytes()),
        Algorithm::RS256 => {
            let kid = header.kid.ok_or(ValidationFailure::MissingKeyId)?;
            let jwk = keys
                .find(&kid)
                .ok_or_else(|| ValidationFailure::UnknownKey(kid.clone()))?;
            DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
                .map_err(|_| ValidationFailure::Malformed)?
        }
        other => {
            return Err(ValidationFailure::UnsupportedAlgorithm(format!("{other:?}")));
        }
    };

    let mut validation = Validation::new(header.alg);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[client_id]);
    validation.set_required_spec_claims(&["exp", "iss", "aud"]);
    validation.leeway = leeway.whole_seconds().max(0) as u64;

    let data = decode::<IdClaims>(id_token, &key, &validation).map_err(|e| match e.kind() {
        ErrorKind::InvalidSignature => ValidationFailure::BadSignature,
        ErrorKind::InvalidIssuer => ValidationFailure::IssuerMismatch,
        ErrorKind::InvalidAudience => ValidationFailure::AudienceMismatch,
        ErrorKind::ExpiredSignature => ValidationFailure::Expired,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "aud" => ValidationFailure::AudienceMismatch,
            "iss" => ValidationFailure::IssuerMismatch,
            _ => ValidationFailure::Malformed,
        },
        _ => ValidationFailure::Malformed,
    })?;

    if let Some(expected) = expected_nonce {
        match data.claims.nonce.as_deref() {
            Some(nonce) if nonce == expected => {}
            Some(_) => return Err(ValidationFailure::NonceMismatch),
            None => return Err(ValidationFailure::MissingNonce),
        }
    }

    Ok(data.claims)
}
