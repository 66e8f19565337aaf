//! Plug-and-play OIDC authentication middleware for Axum.
//!
//! Mounts the whole Authorization Code flow — login, registration,
//! profile-edit and logout redirects plus the callback — as a router, keyed
//! to the user by a private session cookie.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use oidc_flow::middleware::{AuthConfig, AuthUser, auth_routes};
//! use oidc_flow::session::MemorySessionStore;
//!
//! // 1. Configure from environment
//! let config = AuthConfig::from_env()?;
//!
//! // 2. Mount auth routes
//! let app = axum::Router::new()
//!     .merge(auth_routes(config, MemorySessionStore::default()));
//!
//! // 3. Use the AuthUser extractor as the guard on protected handlers
//! async fn account(user: AuthUser) -> String {
//!     format!("signed in as {}", user.subject)
//! }
//! ```

mod config;
mod cookies;
mod error;
mod extractor;
mod routes;
mod state;

pub use config::AuthConfig;
pub use error::AuthError;
pub use extractor::AuthUser;
pub use routes::auth_routes;

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;
