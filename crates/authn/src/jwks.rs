//! JSON Web Key Sets and the providers that fetch them.
//!
//! The issuer publishes its public signing keys at
//! `https://{issuer_domain}/.well-known/jwks.json`:
//!
//! ```json
//! {
//!   "keys": [
//!     { "kid": "NkJCQz...", "kty": "RSA", "use": "sig", "alg": "RS256", "n": "yJRom8...", "e": "AQAB" }
//!   ]
//! }
//! ```
//!
//! [`KeySetProvider`] abstracts where the set comes from:
//! [`HttpKeySetProvider`] fetches it over HTTPS, [`StaticKeySetProvider`]
//! serves a fixed set for fake issuers in tests.

use std::time::Duration;

use async_trait::async_trait;
use fail::fail_point;
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};

use crate::{config::ConfigError, error::AuthError};

/// Path of the key set document relative to the issuer.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Default timeout for the key set request (5 seconds).
pub const DEFAULT_JWKS_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the key set URL for an issuer domain such as `dev-c.eu.auth0.com`.
#[must_use]
pub fn jwks_url(issuer_domain: &str) -> String {
    format!("https://{issuer_domain}{JWKS_PATH}")
}

/// A single JSON Web Key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key ID.
    pub kid: String,
    /// Key type (`RSA` for RS256 keys).
    pub kty: String,
    /// Intended use (`sig`).
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// Algorithm the key is meant for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// RSA modulus, base64url.
    #[serde(default)]
    pub n: String,
    /// RSA exponent, base64url.
    #[serde(default)]
    pub e: String,
}

impl Jwk {
    /// Converts the key into an RSA [`DecodingKey`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenUnparseable`] if the key is not an RSA key,
    /// is published for an algorithm other than RS256, or its
    /// modulus/exponent cannot be decoded.
    pub fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        if self.kty != "RSA" {
            return Err(AuthError::token_unparseable(format!(
                "key '{}' has type '{}', expected RSA",
                self.kid, self.kty
            )));
        }
        // `alg` is optional in a JWK; only an explicit mismatch is rejected
        if let Some(alg) = self.alg.as_deref().filter(|alg| *alg != "RS256") {
            return Err(AuthError::token_unparseable(format!(
                "key '{}' is published for '{alg}', expected RS256",
                self.kid
            )));
        }

        DecodingKey::from_rsa_components(&self.n, &self.e).map_err(|e| {
            AuthError::token_unparseable_with_source(format!("key '{}' is not a valid RSA key", self.kid), e)
        })
    }
}

/// A JSON Web Key Set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// Published keys.
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Finds the key with the given key ID.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid == kid)
    }
}

/// Source of the issuer's signing key set.
#[async_trait]
pub trait KeySetProvider: Send + Sync {
    /// Fetches the current key set.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyFetch`] if the set cannot be retrieved or parsed.
    async fn fetch_key_set(&self) -> Result<JwkSet, AuthError>;
}

/// Fetches the key set from the issuer's well-known endpoint.
#[derive(Clone, Debug)]
pub struct HttpKeySetProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySetProvider {
    /// Creates a provider for `url` with a bounded request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(ConfigError::HttpClient)?;
        Ok(Self::with_client(client, url))
    }

    /// Creates a provider reusing an existing HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }

    /// Returns the key set URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeySetProvider for HttpKeySetProvider {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch_key_set(&self) -> Result<JwkSet, AuthError> {
        fail_point!("jwks-before-fetch", |_| {
            Err(AuthError::key_fetch("injected failure before JWKS fetch"))
        });

        let response = self.client.get(&self.url).send().await.map_err(|e| {
            tracing::warn!(error = %e, "JWKS request failed");
            AuthError::key_fetch_with_source(format!("GET {} failed", self.url), e)
        })?;

        let response = response.error_for_status().map_err(|e| {
            tracing::warn!(error = %e, "JWKS endpoint returned an error status");
            AuthError::key_fetch_with_source(format!("GET {} returned an error status", self.url), e)
        })?;

        let key_set = response.json::<JwkSet>().await.map_err(|e| {
            tracing::warn!(error = %e, "JWKS response is not a key set");
            AuthError::key_fetch_with_source("response is not a valid JWKS document", e)
        })?;

        tracing::debug!(keys = key_set.keys.len(), "fetched JWKS");
        Ok(key_set)
    }
}

/// Serves a fixed key set.
#[derive(Clone, Debug, Default)]
pub struct StaticKeySetProvider {
    key_set: JwkSet,
}

impl StaticKeySetProvider {
    /// Creates a provider that always returns `key_set`.
    #[must_use]
    pub fn new(key_set: JwkSet) -> Self {
        Self { key_set }
    }
}

#[async_trait]
impl KeySetProvider for StaticKeySetProvider {
    async fn fetch_key_set(&self) -> Result<JwkSet, AuthError> {
        Ok(self.key_set.clone())
    }
}
