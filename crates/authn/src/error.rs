//! Authorization error types.
//!
//! Every failure of the authorization pipeline is classified at the point of
//! detection into one [`AuthError`] variant. Each variant carries a fixed HTTP
//! status, a machine-readable status label and a human description, so the
//! HTTP layer can render a response without re-inspecting the token.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Authentication and authorization errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No `Authorization` header, or an empty one.
    #[error("Authorization header is expected.")]
    MissingHeader,

    /// The header is not `Bearer <token>`.
    #[error("{reason}")]
    MalformedHeader {
        /// Which part of the header format was violated.
        reason: &'static str,
    },

    /// The token header carries no key id.
    #[error("Authorization malformed.")]
    InvalidHeader,

    /// No key in the issuer's key set matches the token's key id.
    #[error("Unable to find the appropriate key.")]
    KeyNotFound {
        /// Key ID from the token header.
        kid: String,
    },

    /// The `exp` claim is in the past.
    #[error("Token expired.")]
    TokenExpired,

    /// Audience or issuer do not match the configured values.
    #[error("Incorrect claims. Please, check the audience and issuer.")]
    InvalidClaims {
        /// Which claim failed.
        claim: &'static str,
    },

    /// Any other decode or signature failure.
    #[error("Unable to parse authentication token.")]
    TokenUnparseable {
        /// Diagnostic detail, never shown to clients.
        detail: String,
        /// The underlying library error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// The verified claims carry no `permissions` field.
    #[error("Permissions not included in JWT")]
    PermissionsClaimMissing,

    /// The `permissions` claim lacks the required permission.
    #[error("No Permission")]
    PermissionDenied {
        /// The permission the route required.
        permission: String,
    },

    /// The signing key set could not be retrieved or parsed.
    #[error("Unable to retrieve signing keys: {message}")]
    KeyFetch {
        /// Description of the fetch failure.
        message: String,
        /// The underlying transport or decode error.
        #[source]
        source: Option<BoxError>,
    },
}

impl AuthError {
    /// Creates a [`AuthError::MalformedHeader`] error.
    #[must_use]
    pub fn malformed_header(reason: &'static str) -> Self {
        Self::MalformedHeader { reason }
    }

    /// Creates a [`AuthError::KeyNotFound`] error.
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    /// Creates a [`AuthError::InvalidClaims`] error.
    #[must_use]
    pub fn invalid_claims(claim: &'static str) -> Self {
        Self::InvalidClaims { claim }
    }

    /// Creates a [`AuthError::TokenUnparseable`] error without a source.
    #[must_use]
    pub fn token_unparseable(detail: impl Into<String>) -> Self {
        Self::TokenUnparseable { detail: detail.into(), source: None }
    }

    /// Creates a [`AuthError::TokenUnparseable`] error preserving its cause.
    #[must_use]
    pub fn token_unparseable_with_source(
        detail: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::TokenUnparseable { detail: detail.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a [`AuthError::PermissionDenied`] error.
    #[must_use]
    pub fn permission_denied(permission: impl Into<String>) -> Self {
        Self::PermissionDenied { permission: permission.into() }
    }

    /// Creates a [`AuthError::KeyFetch`] error without a source.
    #[must_use]
    pub fn key_fetch(message: impl Into<String>) -> Self {
        Self::KeyFetch { message: message.into(), source: None }
    }

    /// Creates a [`AuthError::KeyFetch`] error preserving its cause.
    #[must_use]
    pub fn key_fetch_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::KeyFetch { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// HTTP status code for this failure.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingHeader
            | Self::MalformedHeader { .. }
            | Self::InvalidHeader
            | Self::TokenExpired
            | Self::InvalidClaims { .. } => 401,
            Self::KeyNotFound { .. }
            | Self::TokenUnparseable { .. }
            | Self::PermissionsClaimMissing => 400,
            Self::PermissionDenied { .. } => 403,
            Self::KeyFetch { .. } => 503,
        }
    }

    /// Machine-readable status label for the response body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingHeader => "authorization_header_missing",
            Self::MalformedHeader { .. }
            | Self::InvalidHeader
            | Self::KeyNotFound { .. }
            | Self::TokenUnparseable { .. } => "invalid_header",
            Self::TokenExpired => "token_expired",
            Self::InvalidClaims { .. } | Self::PermissionsClaimMissing => "invalid_claims",
            Self::PermissionDenied { .. } => "unauthorized",
            Self::KeyFetch { .. } => "key_fetch_failed",
        }
    }

    /// Client-facing description.
    ///
    /// Unlike [`Display`](std::fmt::Display), this never includes transport
    /// details from a key fetch failure.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::KeyFetch { .. } => "Unable to retrieve signing keys.".to_owned(),
            other => other.to_string(),
        }
    }

    /// Whether the caller may retry the request.
    ///
    /// Only key fetch failures are transient; every other variant is a
    /// security judgment about the presented token.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::KeyFetch { .. })
    }

    /// Renders the JSON error body returned to clients.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            status: self.status_code(),
            code: self.code(),
            description: self.description(),
        }
    }
}

/// JSON body of an authorization failure response.
///
/// ```json
/// { "success": false, "status": 403, "code": "unauthorized", "description": "No Permission" }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// Numeric status, also used as the HTTP status code.
    pub status: u16,
    /// Machine-readable label.
    pub code: &'static str,
    /// Human description.
    pub description: String,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        let classified = match err.kind() {
            ErrorKind::ExpiredSignature => Some(AuthError::TokenExpired),
            ErrorKind::InvalidAudience => Some(AuthError::invalid_claims("aud")),
            ErrorKind::InvalidIssuer => Some(AuthError::invalid_claims("iss")),
            ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => {
                Some(AuthError::invalid_claims("aud"))
            },
            ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => {
                Some(AuthError::invalid_claims("iss"))
            },
            _ => None,
        };
        if let Some(classified) = classified {
            return classified;
        }

        let detail = match err.kind() {
            ErrorKind::InvalidSignature => "signature verification failed".to_owned(),
            ErrorKind::InvalidAlgorithm => "algorithm not accepted".to_owned(),
            _ => format!("JWT error: {err}"),
        };
        AuthError::token_unparseable_with_source(detail, err)
    }
}

/// Result type alias for authorization operations.
pub type Result<T> = std::result::Result<T, AuthError>;
