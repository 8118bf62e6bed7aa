//! # Casting Agency Authorization
//!
//! JWT bearer-token authorization for the casting agency API.
//!
//! This crate provides:
//! - **Header extraction**: `Authorization: Bearer <token>` parsing
//! - **Key resolution**: JWKS fetching with an optional TTL cache
//! - **Token verification**: RS256 signature, expiry, audience and issuer checks
//! - **Permission checks**: role-scoped `permissions` claims
//!
//! ## Features
//!
//! - Only RS256 is accepted; `none` and symmetric algorithms are explicitly rejected
//! - Rotated keys (unknown key ids) always trigger a fresh key set fetch
//! - Every failure maps to an HTTP status, a machine code and a description
//!
//! ## Example
//!
//! ```no_run
//! use casting_agency_authn::{Authorizer, AuthorizerConfig, permissions::GET_MOVIES};
//!
//! # async fn example(header: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthorizerConfig::builder()
//!     .issuer_domain("dev-c.eu.auth0.com")
//!     .audience("casting-agency")
//!     .build()?;
//! let authorizer = Authorizer::new(config)?;
//!
//! match authorizer.authorize(header, GET_MOVIES).await {
//!     Ok(claims) => println!("Authorized: {}", claims.sub),
//!     Err(err) => println!("{}: {}", err.status_code(), err.description()),
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Request authorization and the route guard.
pub mod authorizer;
/// Token claims.
pub mod claims;
/// Authorizer configuration.
pub mod config;
/// Authorization error types.
pub mod error;
/// `Authorization` header parsing.
pub mod header;
/// JSON Web Key Sets and key set providers.
pub mod jwks;
/// Token decoding and verification.
pub mod jwt;
/// Key id to decoding key resolution.
pub mod key_resolver;
/// Permission catalog and checks.
pub mod permissions;
/// Algorithm validation.
pub mod validation;

/// Test helpers (fixed RSA keys, token signing).
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// Re-export key types for convenience
pub use authorizer::{Authorizer, RequiresAuth};
pub use claims::{Audience, TokenClaims};
pub use config::{AuthorizerConfig, ConfigError};
pub use error::{AuthError, ErrorBody, Result};
pub use jwks::{HttpKeySetProvider, Jwk, JwkSet, KeySetProvider, StaticKeySetProvider};
pub use key_resolver::{DEFAULT_CACHE_CAPACITY, KeyResolver};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
