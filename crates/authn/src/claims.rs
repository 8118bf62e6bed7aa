//! Verified token claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The `aud` claim, which Auth0 issues either as one string or as an array
/// (when the token also targets the `/userinfo` endpoint).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// A single audience.
    Single(String),
    /// Several audiences.
    Multiple(Vec<String>),
}

impl Audience {
    /// Whether `audience` is one of the token's audiences.
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::Single(aud) => aud == audience,
            Self::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// Claims of a verified access token.
///
/// Auth0 access tokens for the casting agency API look like:
///
/// ```json
/// {
///   "iss": "https://dev-c.eu.auth0.com/",
///   "sub": "auth0|5f1c...",
///   "aud": ["casting-agency", "https://dev-c.eu.auth0.com/userinfo"],
///   "iat": 1595000000,
///   "exp": 1595086400,
///   "azp": "x0BX...",
///   "scope": "openid profile email",
///   "permissions": ["get:actors", "get:movies"]
/// }
/// ```
///
/// `permissions` is optional so that a token without the claim can be told
/// apart from one with an empty list. An explicit `"permissions": null` is
/// treated as absent and kept in [`extra`](Self::extra). Claims not modelled
/// here are kept in `extra` as well, so the claims handed to route handlers
/// are the decoded payload unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTokenClaims")]
pub struct TokenClaims {
    /// Issuer (`https://{issuer_domain}/`).
    pub iss: String,
    /// Subject - the Auth0 user or client id.
    #[serde(default)]
    pub sub: String,
    /// Audience(s).
    pub aud: Audience,
    /// Expiration time (seconds since epoch).
    pub exp: u64,
    /// Issued at (seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    /// Authorized party (client id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
    /// Space-separated OAuth scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Granted permissions, e.g. `["get:actors", "post:movies"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    /// Every other claim in the payload.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Wire shape of [`TokenClaims`], which tells a `null` permissions claim
/// apart from a missing one.
#[derive(Deserialize)]
struct RawTokenClaims {
    iss: String,
    #[serde(default)]
    sub: String,
    aud: Audience,
    exp: u64,
    #[serde(default)]
    iat: Option<u64>,
    #[serde(default)]
    azp: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default, deserialize_with = "present")]
    permissions: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl TryFrom<RawTokenClaims> for TokenClaims {
    type Error = serde_json::Error;

    fn try_from(raw: RawTokenClaims) -> Result<Self, Self::Error> {
        let mut extra = raw.extra;
        let permissions = match raw.permissions {
            None => None,
            Some(Value::Null) => {
                extra.insert("permissions".to_string(), Value::Null);
                None
            },
            Some(value) => Some(serde_json::from_value(value)?),
        };

        Ok(Self {
            iss: raw.iss,
            sub: raw.sub,
            aud: raw.aud,
            exp: raw.exp,
            iat: raw.iat,
            azp: raw.azp,
            scope: raw.scope,
            permissions,
            extra,
        })
    }
}

impl TokenClaims {
    /// Expiry as a timestamp, if representable.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.exp).ok().and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// Parse scopes from the space-separated `scope` claim.
    #[must_use]
    pub fn parse_scopes(&self) -> Vec<&str> {
        self.scope.as_deref().map(|s| s.split_whitespace().collect()).unwrap_or_default()
    }

    /// Whether the `permissions` claim contains `permission` (exact match).
    ///
    /// Returns `false` when the claim is absent.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.as_ref().is_some_and(|granted| granted.iter().any(|p| p == permission))
    }
}
