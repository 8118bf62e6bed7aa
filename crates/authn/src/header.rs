//! `Authorization` header parsing.

use crate::error::AuthError;

/// Authentication scheme accepted in the `Authorization` header.
pub const BEARER_SCHEME: &str = "Bearer";

/// Extracts the bearer token from a raw `Authorization` header value.
///
/// The header is split on single spaces and must yield exactly two non-empty
/// parts without other whitespace, the first of which is `Bearer`
/// (case-insensitive). Repeated, leading or trailing spaces and tabs
/// therefore make the header malformed.
/// The second part is returned unchanged; its shape is validated later,
/// during verification.
///
/// # Errors
///
/// - [`AuthError::MissingHeader`] if the header is absent or empty
/// - [`AuthError::MalformedHeader`] if the part count is wrong or the scheme is not `Bearer`
///
/// # Examples
///
/// ```
/// use casting_agency_authn::header::extract_bearer_token;
///
/// assert_eq!(extract_bearer_token(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
/// assert!(extract_bearer_token(Some("Token abc.def.ghi")).is_err());
/// assert!(extract_bearer_token(None).is_err());
/// ```
pub fn extract_bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = match header {
        Some(value) if !value.is_empty() => value,
        _ => return Err(AuthError::MissingHeader),
    };

    let mut parts = header.split(' ');
    let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AuthError::malformed_header("Authorization header is not in right format."));
    };
    if [scheme, token].iter().any(|part| part.is_empty() || part.contains(char::is_whitespace)) {
        return Err(AuthError::malformed_header("Authorization header is not in right format."));
    }

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(AuthError::malformed_header(
            "Authorization header must start with \"Bearer\".",
        ));
    }

    Ok(token)
}
