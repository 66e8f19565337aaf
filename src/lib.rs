#![doc = include_str!("../README.md")]

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod flow;
#[cfg(feature = "axum")]
pub mod middleware;
pub mod session;
pub mod token;

// Re-exports for convenient access
pub use client::{AuthorizationRequest, Client, CompletedFlow};
pub use config::Config;
pub use discovery::{DiscoveryCache, Jwk, JwkSet, ProviderMetadata};
pub use error::{
    ConfigError, DiscoveryError, SessionError, StateError, TokenError, UserInfoError,
    ValidationFailure,
};
pub use flow::{FlowState, FlowStore, Intent};
pub use session::{AuthSession, MemorySessionStore, SessionStore, current_user, is_authenticated};
pub use token::{Audience, IdClaims, TokenSet};
