//! Authorizer configuration.
//!
//! [`AuthorizerConfig`] is fixed at startup and passed to
//! [`Authorizer`](crate::Authorizer) explicitly, so tests can point the
//! authorizer at a fake issuer.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use casting_agency_authn::AuthorizerConfig;
//!
//! let config = AuthorizerConfig::builder()
//!     .issuer_domain("dev-c.eu.auth0.com")
//!     .audience("casting-agency")
//!     .key_cache_ttl(Duration::from_secs(300))  // Optional
//!     .build()?;
//!
//! assert_eq!(config.issuer_url(), "https://dev-c.eu.auth0.com/");
//! assert_eq!(config.jwks_url(), "https://dev-c.eu.auth0.com/.well-known/jwks.json");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The same configuration can be embedded in a service config file:
//!
//! ```toml
//! [auth]
//! issuer_domain = "dev-c.eu.auth0.com"
//! audience = "casting-agency"
//! jwks_timeout = "5s"
//! key_cache_ttl = "10m"
//! ```

use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    jwks::{DEFAULT_JWKS_TIMEOUT, jwks_url},
    key_resolver::DEFAULT_CACHE_CAPACITY,
    validation::{parse_algorithm, validate_algorithm},
};

/// Configuration errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("invalid {field}: {message}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The HTTP client for key set requests could not be built.
    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid { field, message: message.into() }
    }
}

/// Configuration for [`Authorizer`](crate::Authorizer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizerConfig {
    /// Trusted issuer domain, e.g. `dev-c.eu.auth0.com`.
    pub(crate) issuer_domain: String,

    /// Expected `aud` (the API identifier).
    pub(crate) audience: String,

    /// Accepted signing algorithms.
    #[serde(default = "default_algorithms")]
    pub(crate) algorithms: Vec<String>,

    /// Key set URL override; defaults to the issuer's well-known endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) jwks_url: Option<String>,

    /// Key set request timeout.
    #[serde(with = "humantime_serde", default = "default_jwks_timeout")]
    pub(crate) jwks_timeout: Duration,

    /// Allowed clock skew when checking `exp`.
    #[serde(with = "humantime_serde", default)]
    pub(crate) leeway: Duration,

    /// How long fetched keys are cached. `None` fetches the key set on every
    /// authorization.
    #[serde(with = "humantime_serde", default, skip_serializing_if = "Option::is_none")]
    pub(crate) key_cache_ttl: Option<Duration>,

    /// Maximum number of cached keys.
    #[serde(default = "default_key_cache_capacity")]
    pub(crate) key_cache_capacity: u64,
}

fn default_algorithms() -> Vec<String> {
    vec!["RS256".to_owned()]
}

fn default_jwks_timeout() -> Duration {
    DEFAULT_JWKS_TIMEOUT
}

fn default_key_cache_capacity() -> u64 {
    DEFAULT_CACHE_CAPACITY
}

#[bon::bon]
impl AuthorizerConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Arguments
    ///
    /// * `issuer_domain` - Trusted issuer domain (no scheme, no path).
    /// * `audience` - Expected audience (API identifier).
    ///
    /// # Optional Fields
    ///
    /// * `algorithms` - Accepted algorithms (default: `RS256`).
    /// * `jwks_url` - Key set URL override.
    /// * `jwks_timeout` - Key set request timeout (default: 5 seconds).
    /// * `leeway` - Clock skew tolerance for `exp` (default: none).
    /// * `key_cache_ttl` - Enables key caching with this TTL.
    /// * `key_cache_capacity` - Maximum cached keys (default: 1 000).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if any field fails [`validate`](Self::validate).
    #[builder]
    pub fn new(
        #[builder(into)] issuer_domain: String,
        #[builder(into)] audience: String,
        #[builder(default = default_algorithms())] algorithms: Vec<String>,
        #[builder(into)] jwks_url: Option<String>,
        #[builder(default = DEFAULT_JWKS_TIMEOUT)] jwks_timeout: Duration,
        #[builder(default)] leeway: Duration,
        key_cache_ttl: Option<Duration>,
        #[builder(default = DEFAULT_CACHE_CAPACITY)] key_cache_capacity: u64,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            issuer_domain,
            audience,
            algorithms,
            jwks_url,
            jwks_timeout,
            leeway,
            key_cache_ttl,
            key_cache_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Deserialized configurations are validated when the
    /// [`Authorizer`](crate::Authorizer) is constructed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if:
    /// - `issuer_domain` is empty or contains a scheme or path
    /// - `audience` is empty
    /// - `algorithms` is empty or contains an algorithm other than RS256
    /// - `jwks_timeout` is zero
    /// - caching is enabled with a zero TTL or zero capacity
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer_domain.is_empty() {
            return Err(ConfigError::invalid("issuer_domain", "cannot be empty"));
        }
        if self.issuer_domain.contains("://") || self.issuer_domain.contains('/') {
            return Err(ConfigError::invalid(
                "issuer_domain",
                format!("'{}' must be a bare domain without scheme or path", self.issuer_domain),
            ));
        }

        if self.audience.is_empty() {
            return Err(ConfigError::invalid("audience", "cannot be empty"));
        }

        if self.algorithms.is_empty() {
            return Err(ConfigError::invalid("algorithms", "at least one algorithm is required"));
        }
        for alg in &self.algorithms {
            validate_algorithm(alg).map_err(|e| {
                ConfigError::invalid("algorithms", match e {
                    crate::AuthError::TokenUnparseable { detail, .. } => detail,
                    other => other.to_string(),
                })
            })?;
        }

        if self.jwks_timeout.is_zero() {
            return Err(ConfigError::invalid("jwks_timeout", "must be greater than zero"));
        }

        if let Some(ttl) = self.key_cache_ttl {
            if ttl.is_zero() {
                return Err(ConfigError::invalid("key_cache_ttl", "must be greater than zero"));
            }
            if self.key_cache_capacity == 0 {
                return Err(ConfigError::invalid("key_cache_capacity", "must be greater than zero"));
            }
        }

        Ok(())
    }

    /// Returns the trusted issuer domain.
    #[must_use]
    pub fn issuer_domain(&self) -> &str {
        &self.issuer_domain
    }

    /// Returns the expected `iss` claim: `https://{issuer_domain}/`.
    #[must_use]
    pub fn issuer_url(&self) -> String {
        format!("https://{}/", self.issuer_domain)
    }

    /// Returns the expected audience.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Returns the accepted algorithms.
    ///
    /// Names that fail to parse are skipped; [`validate`](Self::validate)
    /// rejects them up front.
    #[must_use]
    pub fn algorithms(&self) -> Vec<Algorithm> {
        self.algorithms.iter().filter_map(|alg| parse_algorithm(alg).ok()).collect()
    }

    /// Returns the key set URL.
    #[must_use]
    pub fn jwks_url(&self) -> String {
        self.jwks_url.clone().unwrap_or_else(|| jwks_url(&self.issuer_domain))
    }

    /// Returns the key set request timeout.
    #[must_use]
    pub fn jwks_timeout(&self) -> Duration {
        self.jwks_timeout
    }

    /// Returns the clock skew tolerance.
    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// Returns the key cache TTL, if caching is enabled.
    #[must_use]
    pub fn key_cache_ttl(&self) -> Option<Duration> {
        self.key_cache_ttl
    }

    /// Returns the key cache capacity.
    #[must_use]
    pub fn key_cache_capacity(&self) -> u64 {
        self.key_cache_capacity
    }
}
