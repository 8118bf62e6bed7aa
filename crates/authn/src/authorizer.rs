//! Request authorization.
//!
//! [`Authorizer`] composes the pipeline for one protected request:
//!
//! 1. Extract the bearer token from the `Authorization` header
//! 2. Resolve the signing key and verify the token
//! 3. Check the required permission against the `permissions` claim
//!
//! [`RequiresAuth`] binds an authorizer to a single permission and runs a
//! route handler only after authorization succeeds.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use casting_agency_authn::{Authorizer, AuthorizerConfig, RequiresAuth, permissions::GET_ACTORS};
//!
//! # async fn example(header: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthorizerConfig::builder()
//!     .issuer_domain("dev-c.eu.auth0.com")
//!     .audience("casting-agency")
//!     .build()?;
//! let authorizer = Arc::new(Authorizer::new(config)?);
//!
//! let list_actors = RequiresAuth::new(Arc::clone(&authorizer), GET_ACTORS);
//! let body = list_actors.run(header, |claims| async move { format!("hello {}", claims.sub) }).await;
//! match body {
//!     Ok(body) => println!("{body}"),
//!     Err(err) => println!("{} {}", err.status_code(), serde_json::to_string(&err.to_body())?),
//! }
//! # Ok(())
//! # }
//! ```

use std::{future::Future, sync::Arc};

use jsonwebtoken::Validation;

use crate::{
    claims::TokenClaims,
    config::{AuthorizerConfig, ConfigError},
    error::AuthError,
    header::extract_bearer_token,
    jwks::{HttpKeySetProvider, KeySetProvider},
    jwt::{build_validation, verify_token},
    key_resolver::KeyResolver,
    permissions::check_permissions,
};

/// Authorizes requests against a trusted issuer.
///
/// Holds no per-request state: claims are never cached across calls, so
/// repeated calls with the same inputs yield the same outcome as long as
/// the issuer's key set and the clock do not change.
#[derive(Debug)]
pub struct Authorizer {
    config: AuthorizerConfig,
    resolver: KeyResolver,
    validation: Validation,
}

impl Authorizer {
    /// Creates an authorizer fetching keys from the configured JWKS URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: AuthorizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let provider = HttpKeySetProvider::new(config.jwks_url(), config.jwks_timeout())?;
        Self::with_provider(config, Arc::new(provider))
    }

    /// Creates an authorizer with a custom key set provider.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the configuration is invalid.
    pub fn with_provider(
        config: AuthorizerConfig,
        provider: Arc<dyn KeySetProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let resolver = match config.key_cache_ttl() {
            Some(ttl) => KeyResolver::with_capacity(provider, ttl, config.key_cache_capacity()),
            None => KeyResolver::uncached(provider),
        };

        let validation = build_validation(
            &config.algorithms(),
            config.audience(),
            &config.issuer_url(),
            config.leeway().as_secs(),
        );

        Ok(Self { config, resolver, validation })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &AuthorizerConfig {
        &self.config
    }

    /// Returns the key resolver.
    #[must_use]
    pub fn key_resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    /// Authorizes a request.
    ///
    /// `header` is the raw `Authorization` header value, if any.
    /// An empty `required_permission` only requires that the token carries
    /// a `permissions` claim.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's [`AuthError`]; see
    /// [`extract_bearer_token`], [`verify_token`] and [`check_permissions`].
    #[tracing::instrument(skip(self, header))]
    pub async fn authorize(
        &self,
        header: Option<&str>,
        required_permission: &str,
    ) -> Result<TokenClaims, AuthError> {
        let result = self.authorize_inner(header, required_permission).await;

        match &result {
            Ok(claims) => tracing::debug!(sub = %claims.sub, "request authorized"),
            Err(err) if err.is_retryable() => {
                tracing::warn!(error = %err, "authorization unavailable")
            },
            Err(err) => {
                tracing::warn!(status = err.status_code(), code = err.code(), "request rejected")
            },
        }

        result
    }

    async fn authorize_inner(
        &self,
        header: Option<&str>,
        required_permission: &str,
    ) -> Result<TokenClaims, AuthError> {
        let token = extract_bearer_token(header)?;
        let claims = verify_token(token, &self.resolver, &self.validation).await?;
        check_permissions(&claims, required_permission)?;
        Ok(claims)
    }
}

/// Guards a handler behind one required permission.
#[derive(Clone, Debug)]
pub struct RequiresAuth {
    authorizer: Arc<Authorizer>,
    permission: String,
}

impl RequiresAuth {
    /// Binds `authorizer` to `permission`.
    #[must_use]
    pub fn new(authorizer: Arc<Authorizer>, permission: impl Into<String>) -> Self {
        Self { authorizer, permission: permission.into() }
    }

    /// Returns the required permission.
    #[must_use]
    pub fn permission(&self) -> &str {
        &self.permission
    }

    /// Authorizes the request without running a handler.
    ///
    /// # Errors
    ///
    /// See [`Authorizer::authorize`].
    pub async fn check(&self, header: Option<&str>) -> Result<TokenClaims, AuthError> {
        self.authorizer.authorize(header, &self.permission).await
    }

    /// Runs `handler` with the verified claims.
    ///
    /// The handler is not invoked when authorization fails.
    ///
    /// # Errors
    ///
    /// See [`Authorizer::authorize`].
    pub async fn run<F, Fut, T>(&self, header: Option<&str>, handler: F) -> Result<T, AuthError>
    where
        F: FnOnce(TokenClaims) -> Fut,
        Fut: Future<Output = T>,
    {
        let claims = self.check(header).await?;
        Ok(handler(claims).await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::{
        assert_auth_error,
        jwks::{JwkSet, StaticKeySetProvider},
        permissions::{DELETE_MOVIES, GET_ACTORS, POST_ACTORS, Role},
        testutil::{
            PRIMARY_KID, TEST_AUDIENCE, TEST_DOMAIN, bearer, now_secs, sign_with_primary,
            test_authorizer, test_config, test_key_set, valid_payload,
        },
    };

    struct CountingProvider {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl KeySetProvider for CountingProvider {
        async fn fetch_key_set(&self) -> Result<JwkSet, AuthError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(test_key_set())
        }
    }

    struct UnreachableProvider;

    #[async_trait]
    impl KeySetProvider for UnreachableProvider {
        async fn fetch_key_set(&self) -> Result<JwkSet, AuthError> {
            Err(AuthError::key_fetch("connection refused"))
        }
    }

    fn token_with(permissions: &[&str]) -> String {
        bearer(&sign_with_primary(PRIMARY_KID, &valid_payload(permissions)))
    }

    #[tokio::test]
    async fn test_authorize_grants_matching_permission() {
        let authorizer = test_authorizer();
        let header = token_with(&[GET_ACTORS]);

        let claims = authorizer.authorize(Some(&header), GET_ACTORS).await.unwrap();

        assert!(claims.aud.contains(TEST_AUDIENCE));
        assert!(claims.has_permission(GET_ACTORS));
    }

    #[tokio::test]
    async fn test_authorize_missing_header() {
        let result = test_authorizer().authorize(None, GET_ACTORS).await;
        assert_auth_error!(result, AuthError::MissingHeader);
    }

    #[rstest]
    #[case("Token abc")]
    #[case("Bearer")]
    #[case("Bearer a b")]
    #[tokio::test]
    async fn test_authorize_malformed_header(#[case] header: &str) {
        let result = test_authorizer().authorize(Some(header), GET_ACTORS).await;
        assert_auth_error!(result, AuthError::MalformedHeader { .. });
    }

    #[tokio::test]
    async fn test_authorize_unknown_kid() {
        let header = bearer(&sign_with_primary("retired-key", &valid_payload(&[GET_ACTORS])));
        let result = test_authorizer().authorize(Some(&header), GET_ACTORS).await;

        let err = result.unwrap_err();
        assert!(matches!(err, AuthError::KeyNotFound { .. }));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_authorize_expired_token() {
        let mut payload = valid_payload(&[GET_ACTORS]);
        payload["exp"] = json!(now_secs() - 60);
        let header = bearer(&sign_with_primary(PRIMARY_KID, &payload));

        let result = test_authorizer().authorize(Some(&header), GET_ACTORS).await;
        assert_auth_error!(result, AuthError::TokenExpired);
    }

    #[tokio::test]
    async fn test_authorize_wrong_audience() {
        let mut payload = valid_payload(&[GET_ACTORS]);
        payload["aud"] = json!("another-api");
        let header = bearer(&sign_with_primary(PRIMARY_KID, &payload));

        let result = test_authorizer().authorize(Some(&header), GET_ACTORS).await;
        assert_auth_error!(result, AuthError::InvalidClaims { claim: "aud" });
    }

    #[tokio::test]
    async fn test_authorize_missing_permissions_claim() {
        let mut payload = valid_payload(&[]);
        payload.as_object_mut().unwrap().remove("permissions");
        let header = bearer(&sign_with_primary(PRIMARY_KID, &payload));

        let result = test_authorizer().authorize(Some(&header), GET_ACTORS).await;
        assert_auth_error!(result, AuthError::PermissionsClaimMissing);
    }

    #[tokio::test]
    async fn test_authorize_permission_denied() {
        let header = token_with(&[GET_ACTORS]);
        let result = test_authorizer().authorize(Some(&header), POST_ACTORS).await;

        let err = result.unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied { .. }));
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_authorize_empty_permission_only_needs_claim() {
        let header = token_with(&[]);
        assert!(test_authorizer().authorize(Some(&header), "").await.is_ok());
    }

    #[tokio::test]
    async fn test_authorize_is_idempotent() {
        let authorizer = test_authorizer();
        let granted = token_with(&[GET_ACTORS]);

        let first = authorizer.authorize(Some(&granted), GET_ACTORS).await.unwrap();
        let second = authorizer.authorize(Some(&granted), GET_ACTORS).await.unwrap();
        assert_eq!(first, second);

        let first = authorizer.authorize(Some(&granted), DELETE_MOVIES).await.unwrap_err();
        let second = authorizer.authorize(Some(&granted), DELETE_MOVIES).await.unwrap_err();
        assert_eq!(first.to_body(), second.to_body());
    }

    #[tokio::test]
    async fn test_authorize_roles() {
        let authorizer = test_authorizer();

        for role in Role::ALL {
            let header = token_with(role.permissions());
            for permission in Role::ExecutiveProducer.permissions() {
                let result = authorizer.authorize(Some(&header), permission).await;
                assert_eq!(result.is_ok(), role.grants(permission), "{role:?} {permission}");
            }
        }
    }

    #[tokio::test]
    async fn test_uncached_authorizer_fetches_every_call() {
        let provider = Arc::new(CountingProvider { fetches: AtomicUsize::new(0) });
        let authorizer = Authorizer::with_provider(test_config(), provider.clone()).unwrap();
        let header = token_with(&[GET_ACTORS]);

        for _ in 0..3 {
            authorizer.authorize(Some(&header), GET_ACTORS).await.unwrap();
        }

        assert!(!authorizer.key_resolver().is_cached());
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cached_authorizer_fetches_once() {
        let config = AuthorizerConfig::builder()
            .issuer_domain(TEST_DOMAIN)
            .audience(TEST_AUDIENCE)
            .key_cache_ttl(Duration::from_secs(60))
            .build()
            .unwrap();
        let provider = Arc::new(CountingProvider { fetches: AtomicUsize::new(0) });
        let authorizer = Authorizer::with_provider(config, provider.clone()).unwrap();
        let header = token_with(&[GET_ACTORS]);

        for _ in 0..3 {
            authorizer.authorize(Some(&header), GET_ACTORS).await.unwrap();
        }

        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_key_fetch_failure_is_retryable() {
        let authorizer = Authorizer::with_provider(test_config(), Arc::new(UnreachableProvider)).unwrap();
        let header = token_with(&[GET_ACTORS]);

        let err = authorizer.authorize(Some(&header), GET_ACTORS).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 503);
        assert!(!err.to_body().description.contains("connection refused"));
    }

    #[test]
    fn test_with_provider_validates_config() {
        let mut config = test_config();
        config.audience = String::new();

        let result = Authorizer::with_provider(config, Arc::new(StaticKeySetProvider::default()));
        assert!(matches!(result, Err(ConfigError::Invalid { field: "audience", .. })));
    }

    #[tokio::test]
    async fn test_requires_auth_runs_handler_on_success() {
        let guard = RequiresAuth::new(Arc::new(test_authorizer()), GET_ACTORS);
        let header = token_with(&[GET_ACTORS]);

        let sub = guard.run(Some(&header), |claims| async move { claims.sub }).await.unwrap();

        assert_eq!(sub, "auth0|casting-test-user");
        assert_eq!(guard.permission(), GET_ACTORS);
    }

    #[tokio::test]
    async fn test_requires_auth_skips_handler_on_failure() {
        let guard = RequiresAuth::new(Arc::new(test_authorizer()), POST_ACTORS);
        let header = token_with(&[GET_ACTORS]);
        let invoked = AtomicBool::new(false);

        let result = guard
            .run(Some(&header), |_claims| async {
                invoked.store(true, Ordering::SeqCst);
            })
            .await;

        assert_auth_error!(result, AuthError::PermissionDenied { .. });
        assert!(!invoked.load(Ordering::SeqCst));
    }
}
