//! JWT algorithm validation.
//!
//! Only RS256 is accepted: the issuer signs with RSA keys published in its
//! JWKS, and the verifier never negotiates the algorithm from the token.
//!
//! # Security
//!
//! - Symmetric algorithms are rejected, preventing the algorithm confusion attack where a token is
//!   HMAC-signed with the issuer's public key as the secret
//! - The `none` algorithm is always rejected

use jsonwebtoken::Algorithm;

use crate::error::AuthError;

/// Forbidden JWT algorithms that are never accepted.
///
/// - `none`: no signature at all
/// - `HS256`, `HS384`, `HS512`: symmetric, so the verification key is also a signing key
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted JWT algorithms.
pub const ACCEPTED_ALGORITHMS: &[&str] = &["RS256"];

/// Validate a JWT algorithm name against the security policy.
///
/// # Errors
///
/// Returns [`AuthError::TokenUnparseable`] if the algorithm is forbidden or
/// not in [`ACCEPTED_ALGORITHMS`].
///
/// # Examples
///
/// ```
/// use casting_agency_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("RS256").is_ok());
/// assert!(validate_algorithm("HS256").is_err());
/// assert!(validate_algorithm("none").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.iter().any(|forbidden| forbidden.eq_ignore_ascii_case(alg)) {
        return Err(AuthError::token_unparseable(format!(
            "algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::token_unparseable(format!(
            "algorithm '{alg}' is not in accepted list (only RS256 is supported)"
        )));
    }

    Ok(())
}

/// Parses an accepted algorithm name into a [`jsonwebtoken::Algorithm`].
///
/// # Errors
///
/// Returns [`AuthError::TokenUnparseable`] if [`validate_algorithm`] rejects
/// the name.
pub fn parse_algorithm(alg: &str) -> Result<Algorithm, AuthError> {
    validate_algorithm(alg)?;
    alg.parse::<Algorithm>()
        .map_err(|e| AuthError::token_unparseable_with_source(format!("unknown algorithm '{alg}'"), e))
}
