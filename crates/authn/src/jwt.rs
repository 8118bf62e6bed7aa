//! Token decoding and verification.
//!
//! [`verify_token`] runs the verification state machine. Each step
//! short-circuits on failure:
//!
//! 1. Decode the unverified header and read its key id
//! 2. Resolve the key id against the issuer's key set
//! 3. Check the header algorithm against the accepted list
//! 4. Verify the RS256 signature, then `exp`, `iss` and `aud`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use casting_agency_authn::{
//!     jwks::{HttpKeySetProvider, jwks_url, DEFAULT_JWKS_TIMEOUT},
//!     jwt::{build_validation, verify_token},
//!     key_resolver::KeyResolver,
//! };
//! use jsonwebtoken::Algorithm;
//!
//! # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let provider = HttpKeySetProvider::new(jwks_url("dev-c.eu.auth0.com"), DEFAULT_JWKS_TIMEOUT)?;
//! let resolver = KeyResolver::uncached(Arc::new(provider));
//! let validation = build_validation(
//!     &[Algorithm::RS256],
//!     "casting-agency",
//!     "https://dev-c.eu.auth0.com/",
//!     0,
//! );
//!
//! let claims = verify_token(token, &resolver, &validation).await?;
//! println!("Subject: {}", claims.sub);
//! # Ok(())
//! # }
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::{
    claims::TokenClaims, error::AuthError, key_resolver::KeyResolver,
    validation::validate_algorithm,
};

/// Registered claims every token must carry.
pub const REQUIRED_CLAIMS: &[&str] = &["exp", "aud", "iss"];

/// The token header, decoded without verifying the signature.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UnverifiedHeader {
    /// Declared signing algorithm.
    #[serde(default)]
    pub alg: Option<String>,
    /// Key ID.
    #[serde(default)]
    pub kid: Option<String>,
}

/// Decode the token header without verification.
///
/// The algorithm is kept as an optional string so that tokens declaring
/// algorithms the JWT library does not model (such as `none`), or none at
/// all, still reach the `kid` and algorithm checks and are rejected there.
///
/// # Errors
///
/// Returns [`AuthError::TokenUnparseable`] if the token does not have three
/// dot-separated segments or its header is not base64url-encoded JSON.
pub fn decode_unverified_header(token: &str) -> Result<UnverifiedHeader, AuthError> {
    let mut parts = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::token_unparseable("JWT must have 3 parts separated by dots"));
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|e| AuthError::token_unparseable_with_source("failed to decode JWT header", e))?;

    serde_json::from_slice(&header_bytes)
        .map_err(|e| AuthError::token_unparseable_with_source("failed to parse JWT header", e))
}

/// Builds the [`Validation`] for tokens from a trusted issuer.
///
/// Only `algorithms` are accepted, `exp`, `aud` and `iss` are required, and
/// `leeway_secs` is the allowed clock skew for `exp`.
#[must_use]
pub fn build_validation(
    algorithms: &[Algorithm],
    audience: &str,
    issuer: &str,
    leeway_secs: u64,
) -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.algorithms = algorithms.to_vec();
    validation.leeway = leeway_secs;
    validation.validate_exp = true;
    validation.validate_nbf = false;
    validation.set_audience(&[audience]);
    validation.set_issuer(&[issuer]);
    validation.set_required_spec_claims(REQUIRED_CLAIMS);
    validation
}

/// Verify the token signature and registered claims with a known key.
///
/// # Errors
///
/// - [`AuthError::TokenExpired`] if `exp` is in the past
/// - [`AuthError::InvalidClaims`] if `aud` or `iss` is missing or does not match
/// - [`AuthError::TokenUnparseable`] for any other failure (signature, algorithm, payload)
pub fn verify_signature(
    token: &str,
    key: &DecodingKey,
    validation: &Validation,
) -> Result<TokenClaims, AuthError> {
    // Decode into a generic map first so that claim validation runs before
    // the payload is shaped into `TokenClaims`.
    let token_data = decode::<serde_json::Map<String, serde_json::Value>>(token, key, validation)?;

    serde_json::from_value(serde_json::Value::Object(token_data.claims))
        .map_err(|e| AuthError::token_unparseable_with_source("failed to parse JWT claims", e))
}

/// Verify a bearer token against the issuer's signing keys.
///
/// # Errors
///
/// - [`AuthError::TokenUnparseable`] if the header cannot be decoded
/// - [`AuthError::InvalidHeader`] if the header has no `kid`
/// - [`AuthError::KeyFetch`] if the key set cannot be retrieved
/// - [`AuthError::KeyNotFound`] if no key matches the `kid`
/// - [`AuthError::TokenUnparseable`] if the algorithm is missing or not accepted, or the signature is invalid
/// - [`AuthError::TokenExpired`] if the token has expired
/// - [`AuthError::InvalidClaims`] if audience or issuer do not match
#[tracing::instrument(skip(token, resolver, validation))]
pub async fn verify_token(
    token: &str,
    resolver: &KeyResolver,
    validation: &Validation,
) -> Result<TokenClaims, AuthError> {
    let header = decode_unverified_header(token)?;

    let kid = header.kid.as_deref().ok_or(AuthError::InvalidHeader)?;

    let decoding_key = resolver.resolve(kid).await?;

    let alg = header
        .alg
        .as_deref()
        .ok_or_else(|| AuthError::token_unparseable("JWT header has no algorithm"))?;
    validate_algorithm(alg)?;

    let claims = verify_signature(token, &decoding_key, validation)?;

    tracing::debug!(kid, sub = %claims.sub, "JWT verified");

    Ok(claims)
}
